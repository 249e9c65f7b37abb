//! `BaseException` and its subclasses share one set of natives.

use vela_common_core::{Magic, TypeId};
use vela_runtime::{StackRef, Value};

use super::{check_argc_range, return_str};
use crate::error::PyResult;
use crate::vm::Vm;

pub(super) fn install(vm: &mut Vm) {
    let b = TypeId::BASE_EXCEPTION;
    vm.bind_magic(b, Magic::New, exception_new);
    vm.bind_magic(b, Magic::Init, exception_init);
    vm.bind_magic(b, Magic::Str, exception_str);
    vm.bind_magic(b, Magic::Repr, exception_repr);
}

/// `T(msg=None)`.
fn exception_new(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    let cls = vm.to_type(vm.arg(argv, 0));
    let msg = if argc > 1 { vm.arg(argv, 1) } else { Value::None };
    let exc = vm.alloc_exception(cls, msg);
    vm.set_retval(exc);
    Ok(())
}

fn exception_init(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    check_argc_range(vm, "BaseException.__init__", argc, 1, 2)?;
    let exc = vm.arg(argv, 0);
    let msg = if argc == 2 { vm.arg(argv, 1) } else { Value::None };
    if let Some(info) = vm.exc_info_mut(exc) {
        info.msg = msg;
    }
    Ok(())
}

fn exception_str(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let s = vm.exc_message(vm.arg(argv, 0));
    return_str(vm, s)
}

fn exception_repr(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 1)?;
    let exc = vm.arg(argv, 0);
    let name = vm.type_name_of(exc).to_owned();
    let msg = vm.exc_info(exc).map_or(Value::None, |i| i.msg);
    let s = match msg {
        Value::None | Value::Nil => format!("{name}()"),
        m => format!("{name}({})", vm.repr_string(m)?),
    };
    return_str(vm, s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_construct_and_raise_instance() {
        let mut vm = Vm::new();
        let r0 = vm.reg(0);
        let msg = vm.alloc_string("boom".to_owned());
        vm.set(r0, msg);
        let exc = vm.tp_call(TypeId::VALUE_ERROR, &[msg]).unwrap();
        vm.set(r0, exc);
        assert_eq!(vm.repr_string(exc).unwrap(), "ValueError('boom')");
        assert_eq!(vm.str_string(exc).unwrap(), "boom");
        let _ = vm.raise(exc);
        assert!(vm.match_exc(TypeId::EXCEPTION));
        assert_eq!(vm.format_exc().as_deref(), Some("ValueError: boom"));
    }

    #[test]
    fn test_user_exception_subclass() {
        let mut vm = Vm::new();
        let t = vm.new_type("MyError", TypeId::KEY_ERROR, None, None);
        let exc = vm.tp_call(t, &[]).unwrap();
        let r0 = vm.reg(0);
        vm.set(r0, exc);
        assert_eq!(vm.repr_string(exc).unwrap(), "MyError()");
        let _ = vm.raise(exc);
        assert!(vm.match_exc(TypeId::KEY_ERROR));
        assert!(!vm.match_exc(TypeId::INDEX_ERROR));
    }
}
