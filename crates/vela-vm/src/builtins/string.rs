//! `str`, its iterator, and `bytes`.
//!
//! Strings are indexed by character; the iterator walks byte offsets.

use vela_common_core::{Magic, TypeId};
use vela_runtime::{hash_str, IterMode, ObjectData, StackRef, Value};

use super::{arg_str, check_argc_range, extend_list, repr_str, return_str};
use crate::error::PyResult;
use crate::vm::Vm;

pub(super) fn install(vm: &mut Vm) {
    let t = TypeId::STR;
    vm.bind_magic(t, Magic::New, str_new);
    vm.bind_magic(t, Magic::Add, str_add);
    vm.bind_magic(t, Magic::Mul, str_mul);
    vm.bind_magic(t, Magic::Rmul, str_mul);
    vm.bind_magic(t, Magic::Mod, str_mod);
    vm.bind_magic(t, Magic::Len, str_len);
    vm.bind_magic(t, Magic::Eq, str_eq);
    vm.bind_magic(t, Magic::Ne, str_ne);
    vm.bind_magic(t, Magic::Lt, str_lt);
    vm.bind_magic(t, Magic::Le, str_le);
    vm.bind_magic(t, Magic::Gt, str_gt);
    vm.bind_magic(t, Magic::Ge, str_ge);
    vm.bind_magic(t, Magic::Hash, str_hash);
    vm.bind_magic(t, Magic::Repr, str_repr);
    vm.bind_magic(t, Magic::Str, str_str);
    vm.bind_magic(t, Magic::Contains, str_contains);
    vm.bind_magic(t, Magic::Getitem, str_getitem);
    vm.bind_magic(t, Magic::Iter, str_iter);
    vm.bind_method(t, "upper", str_upper);
    vm.bind_method(t, "lower", str_lower);
    vm.bind_method(t, "strip", str_strip);
    vm.bind_method(t, "startswith", str_startswith);
    vm.bind_method(t, "endswith", str_endswith);
    vm.bind_method(t, "find", str_find);
    vm.bind_method(t, "replace", str_replace);
    vm.bind_method(t, "split", str_split);
    vm.bind_method(t, "join", str_join);
    vm.bind_method(t, "encode", str_encode);

    vm.bind_magic(TypeId::STR_ITERATOR, Magic::Iter, iter_self);
    vm.bind_magic(TypeId::STR_ITERATOR, Magic::Next, str_iterator_next);

    let b = TypeId::BYTES;
    vm.bind_magic(b, Magic::New, bytes_new);
    vm.bind_magic(b, Magic::Len, bytes_len);
    vm.bind_magic(b, Magic::Getitem, bytes_getitem);
    vm.bind_magic(b, Magic::Eq, bytes_eq);
    vm.bind_magic(b, Magic::Ne, bytes_ne);
    vm.bind_magic(b, Magic::Add, bytes_add);
    vm.bind_magic(b, Magic::Hash, bytes_hash);
    vm.bind_magic(b, Magic::Repr, bytes_repr);
    vm.bind_method(b, "decode", bytes_decode);
}

pub(super) fn iter_self(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    vm.set_retval(vm.arg(argv, 0));
    Ok(())
}

/// Text of a str operand, or `None` when it is not a str.
fn str_operand(vm: &Vm, v: Value) -> Option<String> {
    match vm.payload_of(v) {
        Some(ObjectData::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

fn self_str(vm: &Vm, argv: StackRef) -> String {
    vm.to_str(vm.arg(argv, 0)).to_owned()
}

// =========================================================================
// str magic
// =========================================================================

/// `str(x='')`.
fn str_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "str", argc, 1, 2)?;
    if argc == 1 {
        return return_str(vm, String::new());
    }
    let s = vm.str(vm.arg(argv, 1))?;
    vm.set_retval(s);
    Ok(())
}

fn str_add(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let Some(rhs) = str_operand(vm, vm.arg(argv, 1)) else {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    };
    let s = self_str(vm, argv) + &rhs;
    return_str(vm, s)
}

fn str_mul(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let Some(n) = vm.arg(argv, 1).as_int() else {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    };
    let s = self_str(vm, argv).repeat(n.max(0) as usize);
    return_str(vm, s)
}

/// `fmt % args` with `%s`, `%r`, `%d` and `%%`. A non-tuple right operand
/// is a single argument.
fn str_mod(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let fmt = self_str(vm, argv);
    let rhs = vm.arg(argv, 1);
    let args: Vec<Value> = if vm.is_type(rhs, TypeId::TUPLE) { vm.tuple_data(rhs).to_vec() } else { vec![rhs] };
    let mut args = args.into_iter();
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let spec = chars.next();
        if spec == Some('%') {
            out.push('%');
            continue;
        }
        let Some(arg) = args.next() else {
            return Err(vm.type_error("not enough arguments for format string"));
        };
        match spec {
            Some('s') => out.push_str(&vm.str_string(arg)?),
            Some('r') => out.push_str(&vm.repr_string(arg)?),
            Some('d') => out.push_str(&vm.cast_int(arg)?.to_string()),
            _ => return Err(vm.value_error("unsupported format character")),
        }
    }
    if args.next().is_some() {
        return Err(vm.type_error("not all arguments converted during string formatting"));
    }
    return_str(vm, out)
}

fn str_len(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let n = vm.to_str(vm.arg(argv, 0)).chars().count();
    vm.set_retval(Value::Int(n as i64));
    Ok(())
}

fn str_compare(vm: &mut Vm, argc: usize, argv: StackRef, m: Magic) -> PyResult {
    vm.check_argc(argc, 2)?;
    let Some(rhs) = str_operand(vm, vm.arg(argv, 1)) else {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    };
    let lhs = vm.to_str(vm.arg(argv, 0));
    let r = match m {
        Magic::Eq => lhs == rhs,
        Magic::Ne => lhs != rhs,
        Magic::Lt => lhs < rhs.as_str(),
        Magic::Le => lhs <= rhs.as_str(),
        Magic::Gt => lhs > rhs.as_str(),
        Magic::Ge => lhs >= rhs.as_str(),
        other => unreachable!("{other:?} is not a comparison"),
    };
    vm.set_retval(Value::Bool(r));
    Ok(())
}

fn str_eq(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    str_compare(vm, argc, argv, Magic::Eq)
}

fn str_ne(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    str_compare(vm, argc, argv, Magic::Ne)
}

fn str_lt(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    str_compare(vm, argc, argv, Magic::Lt)
}

fn str_le(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    str_compare(vm, argc, argv, Magic::Le)
}

fn str_gt(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    str_compare(vm, argc, argv, Magic::Gt)
}

fn str_ge(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    str_compare(vm, argc, argv, Magic::Ge)
}

fn str_hash(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let h = hash_str(vm.to_str(vm.arg(argv, 0)));
    vm.set_retval(Value::Int(h));
    Ok(())
}

fn str_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let s = repr_str(vm.to_str(vm.arg(argv, 0)));
    return_str(vm, s)
}

fn str_str(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    vm.set_retval(vm.arg(argv, 0));
    Ok(())
}

fn str_contains(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let Some(needle) = str_operand(vm, vm.arg(argv, 1)) else {
        let msg = format!(
            "'in <string>' requires string as left operand, not {}",
            vm.type_name_of(vm.arg(argv, 1))
        );
        return Err(vm.type_error(msg));
    };
    let found = vm.to_str(vm.arg(argv, 0)).contains(needle.as_str());
    vm.set_retval(Value::Bool(found));
    Ok(())
}

fn str_getitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let s = self_str(vm, argv);
    let key = vm.arg(argv, 1);
    if vm.is_type(key, TypeId::SLICE) {
        let chars: Vec<char> = s.chars().collect();
        let picked: String = super::sequence::slice_indices(vm, key, chars.len())?
            .map(|i| chars[i])
            .collect();
        return return_str(vm, picked);
    }
    let i = vm.cast_int(key)?;
    let n = s.chars().count();
    let i = vm.normalize_index(i, n, "string")?;
    let c = s.chars().nth(i).expect("index is in range");
    return_str(vm, c.to_string())
}

fn str_iter(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let it = vm.alloc_iter(TypeId::STR_ITERATOR, vm.arg(argv, 0), IterMode::Items);
    vm.set_retval(it);
    Ok(())
}

fn str_iterator_next(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let r = vm.arg(argv, 0).as_object().expect("iterator is a heap object");
    let (target, index) = match &vm.object(r).data {
        ObjectData::Iter(it) => (it.target, it.index),
        _ => panic!("expected str_iterator"),
    };
    let Some(c) = vm.to_str(target)[index..].chars().next() else {
        return Err(vm.stop_iteration());
    };
    if let ObjectData::Iter(it) = &mut vm.object_mut(r).data {
        it.index += c.len_utf8();
    }
    return_str(vm, c.to_string())
}

// =========================================================================
// str methods
// =========================================================================

fn str_upper(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let s = vm.to_str(vm.arg(argv, 0)).to_uppercase();
    return_str(vm, s)
}

fn str_lower(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let s = vm.to_str(vm.arg(argv, 0)).to_lowercase();
    return_str(vm, s)
}

fn str_strip(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "strip", argc, 1, 2)?;
    let s = self_str(vm, argv);
    let out = if argc == 2 && !vm.arg(argv, 1).is_none() {
        let set = arg_str(vm, argv, 1)?;
        s.trim_matches(|c| set.contains(c)).to_owned()
    } else {
        s.trim().to_owned()
    };
    return_str(vm, out)
}

fn str_startswith(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let prefix = arg_str(vm, argv, 1)?;
    let r = vm.to_str(vm.arg(argv, 0)).starts_with(prefix.as_str());
    vm.set_retval(Value::Bool(r));
    Ok(())
}

fn str_endswith(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let suffix = arg_str(vm, argv, 1)?;
    let r = vm.to_str(vm.arg(argv, 0)).ends_with(suffix.as_str());
    vm.set_retval(Value::Bool(r));
    Ok(())
}

/// Character index of the first occurrence, or -1.
fn str_find(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let needle = arg_str(vm, argv, 1)?;
    let s = vm.to_str(vm.arg(argv, 0));
    let i = match s.find(needle.as_str()) {
        Some(byte) => s[..byte].chars().count() as i64,
        None => -1,
    };
    vm.set_retval(Value::Int(i));
    Ok(())
}

fn str_replace(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 3)?;
    let from = arg_str(vm, argv, 1)?;
    let to = arg_str(vm, argv, 2)?;
    let s = vm.to_str(vm.arg(argv, 0)).replace(from.as_str(), &to);
    return_str(vm, s)
}

/// `split(sep=None)`: whitespace runs when `sep` is omitted.
fn str_split(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "split", argc, 1, 2)?;
    let s = self_str(vm, argv);
    let parts: Vec<String> = if argc == 2 && !vm.arg(argv, 1).is_none() {
        let sep = arg_str(vm, argv, 1)?;
        if sep.is_empty() {
            return Err(vm.value_error("empty separator"));
        }
        s.split(sep.as_str()).map(str::to_owned).collect()
    } else {
        s.split_whitespace().map(str::to_owned).collect()
    };
    vm.with_gc_paused(|vm| {
        let items = parts.into_iter().map(|p| vm.alloc_string(p)).collect();
        let list = vm.alloc_list(items);
        vm.set_retval(list);
    });
    Ok(())
}

fn str_join(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let sep = self_str(vm, argv);
    let src = vm.arg(argv, 1);
    let tmp = vm.push_tmp();
    let list = vm.alloc_list(Vec::new());
    vm.set(tmp, list);
    let res = extend_list(vm, list, src);
    let joined = res.and_then(|_| {
        let mut parts = Vec::with_capacity(vm.list_len(list));
        for (i, v) in vm.list_data(list).to_vec().into_iter().enumerate() {
            match str_operand(vm, v) {
                Some(s) => parts.push(s),
                None => {
                    let msg = format!("sequence item {i}: expected str instance, {} found", vm.type_name_of(v));
                    return Err(vm.type_error(msg));
                }
            }
        }
        Ok(parts.join(&sep))
    });
    vm.pop();
    return_str(vm, joined?)
}

fn str_encode(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let bytes = vm.to_str(vm.arg(argv, 0)).as_bytes().to_vec();
    let v = vm.alloc_bytes(bytes);
    vm.set_retval(v);
    Ok(())
}

// =========================================================================
// bytes
// =========================================================================

/// `bytes(n)` zero-filled, or `bytes(iterable_of_ints)`.
fn bytes_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "bytes", argc, 1, 2)?;
    if argc == 1 {
        let v = vm.alloc_bytes(Vec::new());
        vm.set_retval(v);
        return Ok(());
    }
    let src = vm.arg(argv, 1);
    if let Some(n) = src.as_int() {
        if n < 0 {
            return Err(vm.value_error("negative count"));
        }
        let v = vm.alloc_bytes(vec![0; n as usize]);
        vm.set_retval(v);
        return Ok(());
    }
    let tmp = vm.push_tmp();
    let list = vm.alloc_list(Vec::new());
    vm.set(tmp, list);
    let res = extend_list(vm, list, src);
    let items = vm.list_data(list).to_vec();
    vm.pop();
    res?;
    let mut out = Vec::with_capacity(items.len());
    for v in items {
        match v.as_int() {
            Some(b @ 0..=255) => out.push(b as u8),
            _ => return Err(vm.value_error("bytes must be in range(0, 256)")),
        }
    }
    let v = vm.alloc_bytes(out);
    vm.set_retval(v);
    Ok(())
}

fn bytes_len(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let n = vm.to_bytes(vm.arg(argv, 0)).len();
    vm.set_retval(Value::Int(n as i64));
    Ok(())
}

fn bytes_getitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let i = vm.cast_int(vm.arg(argv, 1))?;
    let n = vm.to_bytes(vm.arg(argv, 0)).len();
    let i = vm.normalize_index(i, n, "index")?;
    let b = vm.to_bytes(vm.arg(argv, 0))[i];
    vm.set_retval(Value::Int(b as i64));
    Ok(())
}

fn bytes_operand(vm: &Vm, v: Value) -> Option<Vec<u8>> {
    match vm.payload_of(v) {
        Some(ObjectData::Bytes(b)) => Some(b.clone()),
        _ => None,
    }
}

fn bytes_eq(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let r = match bytes_operand(vm, vm.arg(argv, 1)) {
        Some(rhs) => Value::Bool(vm.to_bytes(vm.arg(argv, 0)) == rhs.as_slice()),
        None => Value::NotImplemented,
    };
    vm.set_retval(r);
    Ok(())
}

fn bytes_ne(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let r = match bytes_operand(vm, vm.arg(argv, 1)) {
        Some(rhs) => Value::Bool(vm.to_bytes(vm.arg(argv, 0)) != rhs.as_slice()),
        None => Value::NotImplemented,
    };
    vm.set_retval(r);
    Ok(())
}

fn bytes_add(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let Some(rhs) = bytes_operand(vm, vm.arg(argv, 1)) else {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    };
    let mut out = vm.to_bytes(vm.arg(argv, 0)).to_vec();
    out.extend_from_slice(&rhs);
    let v = vm.alloc_bytes(out);
    vm.set_retval(v);
    Ok(())
}

fn bytes_hash(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let h = vm
        .to_bytes(vm.arg(argv, 0))
        .iter()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, &b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3));
    vm.set_retval(Value::Int(h as i64));
    Ok(())
}

fn bytes_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let mut out = String::from("b'");
    for &b in vm.to_bytes(vm.arg(argv, 0)) {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
    return_str(vm, out)
}

fn bytes_decode(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let decoded = String::from_utf8(vm.to_bytes(vm.arg(argv, 0)).to_vec());
    match decoded {
        Ok(s) => return_str(vm, s),
        Err(e) => {
            let msg = format!("'utf-8' codec can't decode bytes: {e}");
            Err(vm.value_error(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(vm: &mut Vm, reg: u8, text: &str) -> Value {
        let r = vm.reg(reg);
        vm.new_str(r, text);
        vm.get(r)
    }

    #[test]
    fn test_concat_and_repeat() {
        let mut vm = Vm::new();
        let a = s(&mut vm, 0, "ab");
        let b = s(&mut vm, 1, "c");
        let r = vm.binary_add(a, b).unwrap();
        assert_eq!(vm.to_str(r), "abc");
        let r = vm.binary_mul(Value::Int(3), b).unwrap();
        assert_eq!(vm.to_str(r), "ccc");
    }

    #[test]
    fn test_char_indexing_and_iteration() {
        let mut vm = Vm::new();
        let text = s(&mut vm, 0, "héllo");
        assert_eq!(vm.len(text).unwrap(), 5);
        let c = vm.getitem(text, Value::Int(-4)).unwrap();
        assert_eq!(vm.to_str(c), "é");

        let it = vm.iter(text).unwrap();
        let r1 = vm.reg(1);
        vm.set(r1, it);
        let mut out = String::new();
        while vm.next(it).unwrap() {
            out.push_str(vm.to_str(vm.retval()));
        }
        assert_eq!(out, "héllo");
    }

    #[test]
    fn test_split_and_join() {
        let mut vm = Vm::new();
        let text = s(&mut vm, 0, "a b  c");
        let split = vm.intern("split");
        let parts = vm.call_method(text, split, &[]).unwrap();
        let r1 = vm.reg(1);
        vm.set(r1, parts);
        assert_eq!(vm.list_len(parts), 3);
        let sep = s(&mut vm, 2, "-");
        let join = vm.intern("join");
        let joined = vm.call_method(sep, join, &[parts]).unwrap();
        assert_eq!(vm.to_str(joined), "a-b-c");
    }

    #[test]
    fn test_percent_format() {
        let mut vm = Vm::new();
        let fmt = s(&mut vm, 0, "%s=%d (%r) 100%%");
        let name = s(&mut vm, 1, "x");
        let r2 = vm.reg(2);
        vm.new_tuple(r2, 3);
        let args = vm.get(r2);
        vm.tuple_setitem(args, 0, name);
        vm.tuple_setitem(args, 1, Value::Int(4));
        vm.tuple_setitem(args, 2, name);
        let out = vm.binary_mod(fmt, args).unwrap();
        assert_eq!(vm.to_str(out), "x=4 ('x') 100%");
    }

    #[test]
    fn test_contains_requires_str() {
        let mut vm = Vm::new();
        let text = s(&mut vm, 0, "abc");
        let needle = s(&mut vm, 1, "bc");
        assert!(vm.contains(text, needle).unwrap());
        assert!(vm.contains(text, Value::Int(1)).is_err());
        assert!(vm.match_exc(TypeId::TYPE_ERROR));
    }

    #[test]
    fn test_bytes_roundtrip_through_str() {
        let mut vm = Vm::new();
        let text = s(&mut vm, 0, "hi\n");
        let encode = vm.intern("encode");
        let b = vm.call_method(text, encode, &[]).unwrap();
        let r1 = vm.reg(1);
        vm.set(r1, b);
        assert_eq!(vm.to_bytes(b), b"hi\n");
        assert_eq!(vm.repr_string(b).unwrap(), "b'hi\\n'");
        let decode = vm.intern("decode");
        let back = vm.call_method(b, decode, &[]).unwrap();
        assert!(vm.equal(back, text).unwrap());
    }
}
