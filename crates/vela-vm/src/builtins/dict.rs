//! `dict` and the `namedict` proxy over a module's globals.

use vela_common_core::{Magic, Name, TypeId};
use vela_runtime::{IterMode, ObjectData, StackRef, Value};

use super::{check_argc_range, return_str};
use crate::error::PyResult;
use crate::vm::Vm;

pub(super) fn install(vm: &mut Vm) {
    let d = TypeId::DICT;
    vm.bind_magic(d, Magic::New, dict_new);
    vm.bind_magic(d, Magic::Len, dict_len);
    vm.bind_magic(d, Magic::Getitem, dict_getitem);
    vm.bind_magic(d, Magic::Setitem, dict_setitem);
    vm.bind_magic(d, Magic::Delitem, dict_delitem);
    vm.bind_magic(d, Magic::Contains, dict_contains);
    vm.bind_magic(d, Magic::Iter, dict_iter);
    vm.bind_magic(d, Magic::Eq, dict_eq);
    vm.bind_magic(d, Magic::Repr, dict_repr);
    vm.types.get_mut(d).magic[Magic::Hash.index()] = Value::None;
    vm.bind_method(d, "get", dict_get);
    vm.bind_method(d, "keys", dict_keys);
    vm.bind_method(d, "values", dict_values);
    vm.bind_method(d, "items", dict_items);
    vm.bind_method(d, "pop", dict_pop);
    vm.bind_method(d, "clear", dict_clear);
    vm.bind_method(d, "update", dict_update);

    let n = TypeId::NAMEDICT;
    vm.bind_magic(n, Magic::Getitem, namedict_getitem);
    vm.bind_magic(n, Magic::Setitem, namedict_setitem);
    vm.bind_magic(n, Magic::Delitem, namedict_delitem);
    vm.bind_magic(n, Magic::Contains, namedict_contains);
    vm.bind_magic(n, Magic::Repr, namedict_repr);
    vm.types.get_mut(n).magic[Magic::Hash.index()] = Value::None;
}

/// Copies every entry of `src` into `dst`.
fn update_from(vm: &mut Vm, dst: Value, src: Value) -> PyResult {
    if !vm.is_type(src, TypeId::DICT) {
        let msg = format!("'{}' object is not a mapping", vm.type_name_of(src));
        return Err(vm.type_error(msg));
    }
    vm.dict_apply(src, |vm, k, v| vm.dict_setitem(dst, k, v))
}

/// `dict(mapping=None)`.
fn dict_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "dict", argc, 1, 2)?;
    let src = vm.arg(argv, argc - 1);
    let tmp = vm.push_tmp();
    let d = vm.alloc_dict();
    vm.set(tmp, d);
    let res = if argc == 2 { update_from(vm, d, src) } else { Ok(()) };
    vm.pop();
    res?;
    vm.set_retval(d);
    Ok(())
}

fn dict_len(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let n = vm.dict_len(vm.arg(argv, 0));
    vm.set_retval(Value::Int(n as i64));
    Ok(())
}

fn dict_getitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (d, key) = (vm.arg(argv, 0), vm.arg(argv, 1));
    if let Some(v) = vm.dict_getitem(d, key)? {
        vm.set_retval(v);
        return Ok(());
    }
    let missing = vm.tp_find_magic(vm.type_of(d), Magic::Missing);
    match missing {
        Some(f) => {
            let v = vm.call(f, &[d, key])?;
            vm.set_retval(v);
            Ok(())
        }
        None => Err(vm.key_error(key)),
    }
}

fn dict_setitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 3)?;
    let (d, key, val) = (vm.arg(argv, 0), vm.arg(argv, 1), vm.arg(argv, 2));
    vm.dict_setitem(d, key, val)
}

fn dict_delitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (d, key) = (vm.arg(argv, 0), vm.arg(argv, 1));
    if !vm.dict_delitem(d, key)? {
        return Err(vm.key_error(key));
    }
    Ok(())
}

fn dict_contains(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (d, key) = (vm.arg(argv, 0), vm.arg(argv, 1));
    let found = vm.dict_getitem(d, key)?.is_some();
    vm.set_retval(Value::Bool(found));
    Ok(())
}

fn dict_iter(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let it = vm.alloc_iter(TypeId::ARRAY_ITERATOR, vm.arg(argv, 0), IterMode::Items);
    vm.set_retval(it);
    Ok(())
}

fn dict_eq(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (a, b) = (vm.arg(argv, 0), vm.arg(argv, 1));
    if !vm.is_type(b, TypeId::DICT) {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    }
    let mut same = vm.dict_len(a) == vm.dict_len(b);
    if same {
        vm.dict_apply(a, |vm, k, v| {
            if same {
                same = match vm.dict_getitem(b, k)? {
                    Some(w) => vm.equal(v, w)?,
                    None => false,
                };
            }
            Ok(())
        })?;
    }
    vm.set_retval(Value::Bool(same));
    Ok(())
}

fn dict_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let d = vm.arg(argv, 0);
    let mut parts = Vec::with_capacity(vm.dict_len(d));
    vm.dict_apply(d, |vm, k, v| {
        let k = vm.repr_string(k)?;
        let v = if vm.is_identical(v, d) { "{...}".to_owned() } else { vm.repr_string(v)? };
        parts.push(format!("{k}: {v}"));
        Ok(())
    })?;
    return_str(vm, format!("{{{}}}", parts.join(", ")))
}

/// `get(key, default=None)`.
fn dict_get(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "get", argc, 2, 3)?;
    let (d, key) = (vm.arg(argv, 0), vm.arg(argv, 1));
    let default = if argc == 3 { vm.arg(argv, 2) } else { Value::None };
    let v = vm.dict_getitem(d, key)?.unwrap_or(default);
    vm.set_retval(v);
    Ok(())
}

/// Snapshot of the entries as a list, keys or values or `(k, v)` tuples.
fn entries(vm: &mut Vm, d: Value, pick: fn(Value, Value) -> Option<Value>) -> PyResult {
    let tmp = vm.push_tmp();
    let list = vm.alloc_list(Vec::new());
    vm.set(tmp, list);
    let res = vm.dict_apply(d, |vm, k, v| {
        let item = match pick(k, v) {
            Some(x) => x,
            None => vm.alloc_tuple(&[k, v]),
        };
        vm.list_append(list, item);
        Ok(())
    });
    vm.pop();
    res?;
    vm.set_retval(list);
    Ok(())
}

fn dict_keys(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let d = vm.arg(argv, 0);
    entries(vm, d, |k, _| Some(k))
}

fn dict_values(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let d = vm.arg(argv, 0);
    entries(vm, d, |_, v| Some(v))
}

fn dict_items(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let d = vm.arg(argv, 0);
    entries(vm, d, |_, _| None)
}

/// `pop(key, default)`; KeyError without a default.
fn dict_pop(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "pop", argc, 2, 3)?;
    let (d, key) = (vm.arg(argv, 0), vm.arg(argv, 1));
    match vm.dict_getitem(d, key)? {
        Some(v) => {
            vm.set_retval(v);
            vm.dict_delitem(d, key)?;
            Ok(())
        }
        None if argc == 3 => {
            vm.set_retval(vm.arg(argv, 2));
            Ok(())
        }
        None => Err(vm.key_error(key)),
    }
}

fn dict_clear(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let r = vm.arg(argv, 0).as_object().expect("dict is a heap object");
    if let ObjectData::Dict(d) = &mut vm.object_mut(r).data {
        d.clear();
    }
    Ok(())
}

fn dict_update(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (d, src) = (vm.arg(argv, 0), vm.arg(argv, 1));
    update_from(vm, d, src)
}

// =========================================================================
// namedict
// =========================================================================

/// The module a namedict proxy reads through, and the key as a name.
fn namedict_key(vm: &mut Vm, argv: StackRef) -> PyResult<(Value, Name)> {
    let module = vm.getslot(vm.arg(argv, 0), 0);
    let key = vm.arg(argv, 1);
    if !vm.is_instance(key, TypeId::STR) {
        let msg = format!("namedict keys must be str, not '{}'", vm.type_name_of(key));
        return Err(vm.type_error(msg));
    }
    let text = vm.to_str(key).to_owned();
    Ok((module, vm.intern(&text)))
}

fn namedict_getitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (module, name) = namedict_key(vm, argv)?;
    match vm.getdict(module, name) {
        Some(v) => {
            vm.set_retval(v);
            Ok(())
        }
        None => Err(vm.key_error(vm.arg(argv, 1))),
    }
}

fn namedict_setitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 3)?;
    let (module, name) = namedict_key(vm, argv)?;
    vm.setdict(module, name, vm.arg(argv, 2));
    Ok(())
}

fn namedict_delitem(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (module, name) = namedict_key(vm, argv)?;
    if !vm.deldict(module, name) {
        return Err(vm.key_error(vm.arg(argv, 1)));
    }
    Ok(())
}

fn namedict_contains(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (module, name) = namedict_key(vm, argv)?;
    let found = vm.getdict(module, name).is_some();
    vm.set_retval(Value::Bool(found));
    Ok(())
}

fn namedict_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let module = vm.getslot(vm.arg(argv, 0), 0);
    let mut parts = Vec::new();
    vm.applydict(module, |vm, name, v| {
        let v = vm.repr_string(v)?;
        parts.push(format!("'{}': {v}", vm.name_to_str(name)));
        Ok(())
    })?;
    return_str(vm, format!("{{{}}}", parts.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dict_roundtrip_and_missing_key() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        vm.new_dict(r0);
        let d = vm.get(r0);
        let k = vm.alloc_string("a".to_owned());
        vm.dict_setitem(d, k, Value::Int(1)).unwrap();
        vm.dict_setitem(d, Value::Int(2), Value::Int(3)).unwrap();
        assert_eq!(vm.repr_string(d).unwrap(), "{'a': 1, 2: 3}");
        assert_eq!(vm.getitem(d, Value::Float(2.0)).unwrap(), Value::Int(3));
        assert!(vm.getitem(d, Value::Int(9)).is_err());
        assert_eq!(vm.format_exc().as_deref(), Some("KeyError: 9"));
    }

    #[test]
    fn test_dict_methods() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        let r1 = vm.reg(1);
        vm.new_dict(r0);
        let d = vm.get(r0);
        for i in 0..3 {
            vm.dict_setitem(d, Value::Int(i), Value::Int(i * 10)).unwrap();
        }
        let items = vm.intern("items");
        let pop = vm.intern("pop");
        let get = vm.intern("get");
        let list = vm.call_method(d, items, &[]).unwrap();
        vm.set(r1, list);
        assert_eq!(vm.repr_string(list).unwrap(), "[(0, 0), (1, 10), (2, 20)]");
        assert_eq!(vm.call_method(d, pop, &[Value::Int(1)]).unwrap(), Value::Int(10));
        assert_eq!(vm.call_method(d, get, &[Value::Int(1), Value::Int(-1)]).unwrap(), Value::Int(-1));
        assert_eq!(vm.len(d).unwrap(), 2);
    }

    #[test]
    fn test_dict_is_unhashable() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        vm.new_dict(r0);
        let d = vm.get(r0);
        assert!(vm.hash(d).is_err());
        assert!(vm.format_exc().unwrap().starts_with("TypeError: unhashable type"));
    }

    #[test]
    fn test_dict_iterates_keys_in_insertion_order() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        vm.new_dict(r0);
        let d = vm.get(r0);
        for i in [5, 1, 3] {
            vm.dict_setitem(d, Value::Int(i), Value::None).unwrap();
        }
        vm.dict_delitem(d, Value::Int(1)).unwrap();
        let it = vm.iter(d).unwrap();
        vm.push(it);
        let mut keys = Vec::new();
        while vm.next(it).unwrap() {
            keys.push(vm.to_int(vm.retval()));
        }
        assert_eq!(keys, vec![5, 3]);
    }
}
