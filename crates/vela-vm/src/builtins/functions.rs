//! Free functions of the `builtins` module.

use vela_common_core::{Magic, TypeId};
use vela_runtime::{StackRef, Value};

use super::{arg_str, check_argc_range, return_str};
use crate::error::PyResult;
use crate::vm::Vm;

pub(super) fn install(vm: &mut Vm, builtins: Value) {
    vm.bind(builtins, "print(*args, sep=' ', end='\\n')", print);
    vm.bind(builtins, "input(prompt='')", input);

    vm.bind_func(builtins, "len", len);
    vm.bind_func(builtins, "repr", repr);
    vm.bind_func(builtins, "hash", hash);
    vm.bind_func(builtins, "id", id);
    vm.bind_func(builtins, "abs", abs);
    vm.bind_func(builtins, "isinstance", isinstance);
    vm.bind_func(builtins, "issubclass", issubclass);
    vm.bind_func(builtins, "callable", callable);
    vm.bind_func(builtins, "iter", iter);
    vm.bind_func(builtins, "next", next);
    vm.bind_func(builtins, "getattr", getattr);
    vm.bind_func(builtins, "setattr", setattr);
    vm.bind_func(builtins, "hasattr", hasattr);
    vm.bind_func(builtins, "delattr", delattr);
}

/// `sep`/`end` text; None selects the default.
fn text_or(vm: &mut Vm, v: Value, default: &str) -> PyResult<String> {
    if v.is_none() {
        return Ok(default.to_owned());
    }
    if !vm.is_instance(v, TypeId::STR) {
        let msg = format!("sep and end must be None or a string, not {}", vm.type_name_of(v));
        return Err(vm.type_error(msg));
    }
    Ok(vm.to_str(v).to_owned())
}

/// Locals: `sep`, `end`, then the `*args` tuple.
fn print(vm: &mut Vm, _argc: usize, argv: StackRef) -> PyResult {
    let (sep, end, args) = (vm.arg(argv, 0), vm.arg(argv, 1), vm.arg(argv, 2));
    let sep = text_or(vm, sep, " ")?;
    let end = text_or(vm, end, "\n")?;
    let mut parts = Vec::new();
    for v in vm.tuple_data(args).to_vec() {
        parts.push(vm.str_string(v)?);
    }
    let mut out = parts.join(&sep);
    out.push_str(&end);
    (vm.callbacks_mut().print)(&out);
    Ok(())
}

/// Reads one line from `getchar`, without the newline.
fn input(vm: &mut Vm, _argc: usize, argv: StackRef) -> PyResult {
    let prompt = vm.arg(argv, 0);
    let prompt = vm.str_string(prompt)?;
    let callbacks = vm.callbacks_mut();
    if !prompt.is_empty() {
        (callbacks.print)(&prompt);
    }
    let mut line = Vec::new();
    while let Some(b) = (callbacks.getchar)() {
        if b == b'\n' {
            break;
        }
        line.push(b);
    }
    return_str(vm, String::from_utf8_lossy(&line).into_owned())
}

fn len(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let n = vm.len(vm.arg(argv, 0))?;
    vm.set_retval(Value::Int(n as i64));
    Ok(())
}

fn repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let s = vm.repr(vm.arg(argv, 0))?;
    vm.set_retval(s);
    Ok(())
}

fn hash(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let h = vm.hash(vm.arg(argv, 0))?;
    vm.set_retval(Value::Int(h));
    Ok(())
}

/// Heap slot index for objects; inline values have no identity.
fn id(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let v = match vm.arg(argv, 0) {
        Value::Object(r) => Value::Int(r.index() as i64),
        _ => Value::None,
    };
    vm.set_retval(v);
    Ok(())
}

fn abs(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let v = vm.unary_op(vm.arg(argv, 0), Magic::Abs)?;
    vm.set_retval(v);
    Ok(())
}

/// Type ids named by a type or a tuple of types.
fn type_targets(vm: &mut Vm, spec: Value, who: &str) -> PyResult<Vec<TypeId>> {
    let candidates = if vm.is_type(spec, TypeId::TUPLE) { vm.tuple_data(spec).to_vec() } else { vec![spec] };
    let mut out = Vec::with_capacity(candidates.len());
    for c in candidates {
        match c {
            Value::Type(t) => out.push(t),
            _ => {
                let msg = format!("{who}() arg 2 must be a type or tuple of types");
                return Err(vm.type_error(msg));
            }
        }
    }
    Ok(out)
}

fn isinstance(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (obj, spec) = (vm.arg(argv, 0), vm.arg(argv, 1));
    let found = type_targets(vm, spec, "isinstance")?.into_iter().any(|t| vm.is_instance(obj, t));
    vm.set_retval(Value::Bool(found));
    Ok(())
}

fn issubclass(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (derived, spec) = (vm.arg(argv, 0), vm.arg(argv, 1));
    let Value::Type(d) = derived else {
        return Err(vm.type_error("issubclass() arg 1 must be a class"));
    };
    let found = type_targets(vm, spec, "issubclass")?.into_iter().any(|t| vm.is_subclass(d, t));
    vm.set_retval(Value::Bool(found));
    Ok(())
}

fn callable(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let b = vm.callable(vm.arg(argv, 0));
    vm.set_retval(Value::Bool(b));
    Ok(())
}

fn iter(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let it = vm.iter(vm.arg(argv, 0))?;
    vm.set_retval(it);
    Ok(())
}

/// `next(it[, default])`.
fn next(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "next", argc, 1, 2)?;
    if vm.next(vm.arg(argv, 0))? {
        return Ok(());
    }
    if argc == 2 {
        vm.set_retval(vm.arg(argv, 1));
        return Ok(());
    }
    Err(vm.stop_iteration())
}

/// `getattr(obj, name[, default])`.
fn getattr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "getattr", argc, 2, 3)?;
    let obj = vm.arg(argv, 0);
    let name = arg_str(vm, argv, 1)?;
    let name = vm.intern(&name);
    let v = match vm.try_getattr(obj, name)? {
        Some(v) => v,
        None if argc == 3 => vm.arg(argv, 2),
        None => return Err(vm.attribute_error(obj, name)),
    };
    vm.set_retval(v);
    Ok(())
}

fn setattr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 3)?;
    let obj = vm.arg(argv, 0);
    let name = arg_str(vm, argv, 1)?;
    let name = vm.intern(&name);
    vm.setattr(obj, name, vm.arg(argv, 2))
}

fn hasattr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let obj = vm.arg(argv, 0);
    let name = arg_str(vm, argv, 1)?;
    let name = vm.intern(&name);
    let b = vm.hasattr(obj, name)?;
    vm.set_retval(Value::Bool(b));
    Ok(())
}

fn delattr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let obj = vm.arg(argv, 0);
    let name = arg_str(vm, argv, 1)?;
    let name = vm.intern(&name);
    vm.delattr(obj, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn capture(vm: &mut Vm) -> Rc<RefCell<String>> {
        let out = Rc::new(RefCell::new(String::new()));
        let sink = out.clone();
        vm.callbacks_mut().print = Box::new(move |s: &str| sink.borrow_mut().push_str(s));
        out
    }

    fn builtin(vm: &mut Vm, name: &str) -> Value {
        let n = vm.intern(name);
        vm.get_builtin(n).unwrap()
    }

    #[test]
    fn test_print_with_keywords() {
        let mut vm = Vm::new();
        let out = capture(&mut vm);
        let print = builtin(&mut vm, "print");
        let r0 = vm.reg(0);
        let s = vm.alloc_string("a".to_owned());
        vm.set(r0, s);
        vm.call(print, &[s, Value::Int(1), Value::Float(2.5)]).unwrap();

        let dash = vm.alloc_string("-".to_owned());
        vm.set(r0, dash);
        let sep = vm.intern("sep");
        vm.push(print);
        vm.push_nil();
        vm.push(Value::Int(1));
        vm.push(Value::Int(2));
        vm.push_name(sep);
        vm.push(dash);
        vm.vectorcall(2, 1).unwrap();
        assert_eq!(out.borrow().as_str(), "a 1 2.5\n1-2\n");
    }

    #[test]
    fn test_input_reads_a_line() {
        let mut vm = Vm::new();
        let out = capture(&mut vm);
        let mut bytes = b"hi there\nrest".to_vec().into_iter();
        vm.callbacks_mut().getchar = Box::new(move || bytes.next());
        let input = builtin(&mut vm, "input");
        let r0 = vm.reg(0);
        let prompt = vm.alloc_string("> ".to_owned());
        vm.set(r0, prompt);
        let line = vm.call(input, &[prompt]).unwrap();
        assert_eq!(vm.to_str(line), "hi there");
        assert_eq!(out.borrow().as_str(), "> ");
    }

    #[test]
    fn test_isinstance_with_tuple() {
        let mut vm = Vm::new();
        let f = builtin(&mut vm, "isinstance");
        let r0 = vm.reg(0);
        vm.new_tuple(r0, 2);
        let spec = vm.get(r0);
        vm.tuple_setitem(spec, 0, Value::Type(TypeId::STR));
        vm.tuple_setitem(spec, 1, Value::Type(TypeId::INT));
        assert_eq!(vm.call(f, &[Value::Bool(true), spec]).unwrap(), Value::Bool(true));
        assert_eq!(vm.call(f, &[Value::Float(1.0), spec]).unwrap(), Value::Bool(false));
        assert!(vm.call(f, &[Value::Int(1), Value::Int(2)]).is_err());
    }

    #[test]
    fn test_next_with_default() {
        let mut vm = Vm::new();
        let next = builtin(&mut vm, "next");
        let r0 = vm.reg(0);
        vm.new_list(r0);
        let l = vm.get(r0);
        vm.list_append(l, Value::Int(7));
        let it = vm.iter(l).unwrap();
        vm.set(r0, it);
        assert_eq!(vm.call(next, &[it]).unwrap(), Value::Int(7));
        assert_eq!(vm.call(next, &[it, Value::None]).unwrap(), Value::None);
        assert!(vm.call(next, &[it]).is_err());
        assert!(vm.match_exc(TypeId::STOP_ITERATION));
    }

    #[test]
    fn test_getattr_default() {
        let mut vm = Vm::new();
        let getattr = builtin(&mut vm, "getattr");
        let r0 = vm.reg(0);
        let name = vm.alloc_string("missing".to_owned());
        vm.set(r0, name);
        assert_eq!(vm.call(getattr, &[Value::Int(1), name, Value::Int(0)]).unwrap(), Value::Int(0));
        assert!(vm.call(getattr, &[Value::Int(1), name]).is_err());
        assert!(vm.match_exc(TypeId::ATTRIBUTE_ERROR));
    }
}
