//! `object`, `type`, the singleton types and callable wrappers.

use vela_common_core::{Magic, TypeId};
use vela_runtime::{ObjectData, StackRef, Value};

use super::{check_argc_range, return_str};
use crate::error::PyResult;
use crate::vm::Vm;

pub(super) fn install(vm: &mut Vm) {
    vm.bind_magic(TypeId::OBJECT, Magic::New, object_new);
    vm.bind_magic(TypeId::OBJECT, Magic::Init, object_init);
    vm.bind_magic(TypeId::OBJECT, Magic::Eq, object_eq);
    vm.bind_magic(TypeId::OBJECT, Magic::Ne, object_ne);
    vm.bind_magic(TypeId::OBJECT, Magic::Hash, object_hash);
    vm.bind_magic(TypeId::OBJECT, Magic::Repr, object_repr);
    vm.bind_magic(TypeId::OBJECT, Magic::Str, object_str);

    vm.bind_magic(TypeId::TYPE, Magic::New, type_new);
    vm.bind_magic(TypeId::TYPE, Magic::Repr, type_repr);

    vm.bind_magic(TypeId::NONE_TYPE, Magic::Repr, singleton_repr);
    vm.bind_magic(TypeId::NOT_IMPLEMENTED_TYPE, Magic::Repr, singleton_repr);
    vm.bind_magic(TypeId::ELLIPSIS, Magic::Repr, singleton_repr);

    vm.bind_magic(TypeId::FUNCTION, Magic::Repr, function_repr);
    vm.bind_magic(TypeId::NATIVEFUNC, Magic::Repr, nativefunc_repr);
    vm.bind_magic(TypeId::BOUNDMETHOD, Magic::Repr, boundmethod_repr);
    vm.bind_magic(TypeId::BOUNDMETHOD, Magic::Eq, boundmethod_eq);
    vm.bind_magic(TypeId::MODULE, Magic::Repr, module_repr);

    vm.bind_magic(TypeId::STATICMETHOD, Magic::New, wrapper_new);
    vm.bind_magic(TypeId::CLASSMETHOD, Magic::New, wrapper_new);
    vm.bind_magic(TypeId::PROPERTY, Magic::New, property_new);
}

fn object_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    if argc == 0 {
        return Err(vm.type_error("object.__new__(): not enough arguments"));
    }
    let cls = vm.arg(argv, 0);
    let Value::Type(t) = cls else {
        let msg = format!("object.__new__(X): X is not a type object ({})", vm.type_name_of(cls));
        return Err(vm.type_error(msg));
    };
    let v = vm.alloc_instance(t);
    vm.set_retval(v);
    Ok(())
}

fn object_init(_vm: &mut Vm, _argc: usize, _argv: StackRef) -> PyResult {
    Ok(())
}

fn object_eq(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let same = vm.is_identical(vm.arg(argv, 0), vm.arg(argv, 1));
    vm.set_retval(if same { Value::Bool(true) } else { Value::NotImplemented });
    Ok(())
}

fn object_ne(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let same = vm.is_identical(vm.arg(argv, 0), vm.arg(argv, 1));
    vm.set_retval(if same { Value::Bool(false) } else { Value::NotImplemented });
    Ok(())
}

/// Identity hash built from the heap slot and its generation.
fn object_hash(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let h = match vm.arg(argv, 0) {
        Value::Object(r) => ((r.index() as i64) << 20) ^ r.generation() as i64,
        other => vm.type_of(other).0 as i64,
    };
    vm.set_retval(Value::Int(h));
    Ok(())
}

fn object_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let v = vm.arg(argv, 0);
    let t = vm.type_of(v);
    let module = vm.types.get(t).module.map(|m| vm.module_path(m).to_owned());
    let name = vm.type_name(t).to_owned();
    let addr = v.as_object().map_or(0, |r| r.index());
    let s = match module {
        Some(m) if m != "__main__" => format!("<{m}.{name} object at {addr:#x}>"),
        _ => format!("<{name} object at {addr:#x}>"),
    };
    return_str(vm, s)
}

fn object_str(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let r = vm.repr(vm.arg(argv, 0))?;
    vm.set_retval(r);
    Ok(())
}

/// `type(x)` returns the type of `x`.
fn type_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    if argc != 2 {
        return Err(vm.type_error("type() takes 1 argument"));
    }
    let t = vm.type_of(vm.arg(argv, 1));
    vm.set_retval(Value::Type(t));
    Ok(())
}

fn type_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let t = vm.to_type(vm.arg(argv, 0));
    let module = vm.types.get(t).module.map(|m| vm.module_path(m).to_owned());
    let name = vm.type_name(t).to_owned();
    let s = match module {
        Some(m) if m != "__main__" => format!("<class '{m}.{name}'>"),
        _ => format!("<class '{name}'>"),
    };
    return_str(vm, s)
}

fn singleton_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let s = vm.display_value(vm.arg(argv, 0), true);
    return_str(vm, s)
}

fn function_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let v = vm.arg(argv, 0);
    let name = match vm.payload_of(v) {
        Some(ObjectData::Function(f)) => vm.name_to_str(f.decl.name).to_owned(),
        _ => "?".to_owned(),
    };
    return_str(vm, format!("<function {name}>"))
}

fn nativefunc_repr(vm: &mut Vm, argc: usize, _argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    return_str(vm, "<nativefunc object>".to_owned())
}

fn boundmethod_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let m = vm.arg(argv, 0);
    let (receiver, func) = (vm.getslot(m, 0), vm.getslot(m, 1));
    let owner = vm.type_name_of(receiver).to_owned();
    let name = match vm.payload_of(func) {
        Some(ObjectData::Function(f)) => vm.name_to_str(f.decl.name).to_owned(),
        _ => "?".to_owned(),
    };
    return_str(vm, format!("<bound method {owner}.{name}>"))
}

fn boundmethod_eq(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let (a, b) = (vm.arg(argv, 0), vm.arg(argv, 1));
    if !vm.is_type(b, TypeId::BOUNDMETHOD) {
        vm.set_retval(Value::NotImplemented);
        return Ok(());
    }
    let same = vm.is_identical(vm.getslot(a, 0), vm.getslot(b, 0))
        && vm.is_identical(vm.getslot(a, 1), vm.getslot(b, 1));
    vm.set_retval(Value::Bool(same));
    Ok(())
}

fn module_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let m = vm.arg(argv, 0).as_object().expect("module is a heap object");
    let path = vm.module_path(m).to_owned();
    return_str(vm, format!("<module '{path}'>"))
}

/// `staticmethod(f)` and `classmethod(f)`.
fn wrapper_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let t = vm.to_type(vm.arg(argv, 0));
    let f = vm.arg(argv, 1);
    let v = vm.alloc_with_slots(t, &[f]);
    vm.set_retval(v);
    Ok(())
}

/// `property(fget, fset=None)`.
fn property_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "property", argc, 2, 3)?;
    let getter = vm.arg(argv, 1);
    let setter = if argc == 3 { vm.arg(argv, 2) } else { Value::None };
    let v = vm.alloc_with_slots(TypeId::PROPERTY, &[getter, setter]);
    vm.set_retval(v);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_object_repr_and_str() {
        let mut vm = Vm::new();
        let t = vm.new_type("Thing", TypeId::OBJECT, None, None);
        let r = vm.reg(0);
        let obj = vm.tp_call(t, &[]).unwrap();
        vm.set(r, obj);
        let s = vm.str_string(obj).unwrap();
        assert!(s.starts_with("<Thing object at 0x"), "{s}");
        assert_eq!(vm.repr_string(Value::Type(TypeId::INT)).unwrap(), "<class 'int'>");
        assert_eq!(vm.repr_string(Value::None).unwrap(), "None");
    }

    #[test]
    fn test_type_of_value() {
        let mut vm = Vm::new();
        let t = vm.tp_call(TypeId::TYPE, &[Value::Float(1.0)]).unwrap();
        assert_eq!(t, Value::Type(TypeId::FLOAT));
    }

    #[test]
    fn test_identity_hash_is_stable() {
        let mut vm = Vm::new();
        let r = vm.reg(0);
        let obj = vm.tp_call(TypeId::OBJECT, &[]).unwrap();
        vm.set(r, obj);
        let a = vm.hash(obj).unwrap();
        vm.gc_collect();
        assert_eq!(vm.hash(obj).unwrap(), a);
    }

    #[test]
    fn test_object_takes_no_arguments() {
        let mut vm = Vm::new();
        assert!(vm.tp_call(TypeId::OBJECT, &[Value::Int(1)]).is_err());
        assert_eq!(vm.format_exc().as_deref(), Some("TypeError: object() takes no arguments"));
    }
}
