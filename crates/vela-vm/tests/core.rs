//! Integration tests: interning, vectorcall, dispatch, containers, exceptions.

use pretty_assertions::assert_eq;
use vela_vm::{PyResult, RefError, StackRef, TypeId, Value, Vm};

#[test]
fn test_interning_round_trips() {
    let mut vm = Vm::new();
    for s in ["x", "__init__", "a\0b", "", "naïve"] {
        let n = vm.intern(s);
        assert_eq!(vm.name_to_str(n), s);
        let again = vm.name_to_str(n).to_owned();
        assert_eq!(vm.intern(&again), n);
    }
    assert_ne!(vm.intern("a"), vm.intern("b"));
}

#[test]
fn test_length_carrying_str_keeps_nul() {
    let mut vm = Vm::new();
    let r0 = vm.reg(0);
    vm.new_strv(r0, b"ab\0cd");
    let s = vm.get(r0);
    assert_eq!(vm.to_str(s), "ab\0cd");
    assert_eq!(vm.len(s).unwrap(), 5);
}

#[test]
fn test_strn_respects_char_boundaries() {
    let mut vm = Vm::new();
    let r0 = vm.reg(0);
    vm.new_strn(r0, "naïve", 3);
    assert_eq!(vm.to_str(vm.get(r0)), "na");
    vm.new_strn(r0, "naïve", 4);
    assert_eq!(vm.to_str(vm.get(r0)), "naï");
    vm.new_strn(r0, "abc", 10);
    assert_eq!(vm.to_str(vm.get(r0)), "abc");
}

#[test]
fn test_vectorcall_consumes_the_window() {
    let mut vm = Vm::new();
    let len = vm.intern("len");
    let len = vm.get_builtin(len).unwrap();
    let r0 = vm.reg(0);
    vm.new_list(r0);
    let list = vm.get(r0);

    let before = vm.sp();
    vm.push(len);
    vm.push_nil();
    vm.push(list);
    vm.vectorcall(1, 0).unwrap();
    assert_eq!(vm.sp(), before);
    assert_eq!(vm.retval(), Value::Int(0));

    vm.push(len);
    vm.push_nil();
    vm.push(Value::Int(3));
    assert!(vm.vectorcall(1, 0).is_err());
    assert_eq!(vm.sp(), before);
    vm.clear_exc(None);
}

#[test]
fn test_vectorcall_with_keywords() {
    let mut vm = Vm::new();
    let len = vm.intern("len");
    let len = vm.get_builtin(len).unwrap();
    let print = vm.intern("print");
    let print = vm.get_builtin(print).unwrap();
    vm.callbacks_mut().print = Box::new(|_: &str| {});
    let sep = vm.intern("sep");
    let end = vm.intern("end");

    let before = vm.sp();
    vm.push(print);
    vm.push_nil();
    vm.push(Value::Int(1));
    vm.push_name(sep);
    vm.push_none();
    vm.push_name(end);
    vm.push_none();
    vm.vectorcall(1, 2).unwrap();
    assert_eq!(vm.sp(), before);

    // native argc functions reject keywords and still pop the window
    vm.push(len);
    vm.push_nil();
    vm.push_name(sep);
    vm.push_none();
    assert!(vm.vectorcall(0, 1).is_err());
    assert_eq!(vm.sp(), before);
    vm.clear_exc(None);
}

#[test]
fn test_binary_op_without_methods_is_a_type_error() {
    let mut vm = Vm::new();
    let t = vm.new_type("Opaque", TypeId::OBJECT, None, None);
    let r0 = vm.reg(0);
    let a = vm.tp_call(t, &[]).unwrap();
    vm.set(r0, a);
    assert!(vm.binary_add(a, Value::None).is_err());
    assert_eq!(
        vm.format_exc().as_deref(),
        Some("TypeError: unsupported operand type(s) for +: 'Opaque' and 'NoneType'")
    );
    vm.clear_exc(None);
    assert!(vm.less(a, a).is_err());
    vm.clear_exc(None);
    assert!(vm.equal(a, a).unwrap());
}

fn reflected_add(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    vm.check_argc(argc, 2)?;
    let other = vm.to_int(vm.arg(argv, 1));
    vm.set_retval(Value::Int(other + 100));
    Ok(())
}

#[test]
fn test_reflected_method_is_used() {
    let mut vm = Vm::new();
    let t = vm.new_type("Right", TypeId::OBJECT, None, None);
    vm.bind_magic(t, vela_vm::Magic::Radd, reflected_add);
    let r0 = vm.reg(0);
    let b = vm.tp_call(t, &[]).unwrap();
    vm.set(r0, b);
    assert_eq!(vm.binary_add(Value::Int(1), b).unwrap(), Value::Int(101));
}

#[test]
fn test_item_ref_invalidated_by_append() {
    let mut vm = Vm::new();
    let r0 = vm.reg(0);
    vm.new_list(r0);
    let list = vm.get(r0);
    vm.list_append(list, Value::Int(1));
    let item = vm.list_item_ref(list, 0);
    assert_eq!(vm.try_get(item), Ok(Value::Int(1)));
    vm.list_append(list, Value::Int(2));
    assert_eq!(vm.try_get(item), Err(RefError::InvalidatedItem));
}

fn list_of_three(vm: &mut Vm) -> Value {
    let r0 = vm.reg(0);
    vm.new_list(r0);
    let list = vm.get(r0);
    for i in 0..3 {
        vm.list_append(list, Value::Int(i));
    }
    list
}

#[test]
fn test_item_ref_invalidated_by_list_mutations() {
    let mut vm = Vm::new();
    let list = list_of_three(&mut vm);

    let item = vm.list_item_ref(list, 1);
    vm.list_insert(list, 0, Value::Int(-1));
    assert_eq!(vm.try_get(item), Err(RefError::InvalidatedItem));

    let item = vm.list_item_ref(list, 1);
    vm.list_delitem(list, 3);
    assert_eq!(vm.try_get(item), Err(RefError::InvalidatedItem));

    let item = vm.list_item_ref(list, 0);
    vm.list_clear(list);
    assert_eq!(vm.try_get(item), Err(RefError::InvalidatedItem));
}

#[test]
fn test_item_ref_survives_in_place_store() {
    let mut vm = Vm::new();
    let list = list_of_three(&mut vm);
    let item = vm.list_item_ref(list, 2);
    vm.list_setitem(list, 2, Value::Int(9));
    assert_eq!(vm.try_get(item), Ok(Value::Int(9)));
}

#[test]
fn test_dict_item_ref_invalidated_by_delete_and_reinsert() {
    let mut vm = Vm::new();
    let r0 = vm.reg(0);
    vm.new_dict(r0);
    let d = vm.get(r0);
    let item = vm.dict_emplace(d, Value::Int(1)).unwrap();
    vm.set(item, Value::Int(10));
    assert_eq!(vm.try_get(item), Ok(Value::Int(10)));

    assert!(vm.dict_delitem(d, Value::Int(1)).unwrap());
    assert_eq!(vm.try_get(item), Err(RefError::InvalidatedItem));
    vm.dict_setitem(d, Value::Int(1), Value::Int(11)).unwrap();
    assert_eq!(vm.try_get(item), Err(RefError::InvalidatedItem));

    let item = vm.dict_emplace(d, Value::Int(1)).unwrap();
    assert_eq!(vm.try_get(item), Ok(Value::Int(11)));
    vm.dict_setitem(d, Value::Int(2), Value::None).unwrap();
    assert_eq!(vm.try_get(item), Err(RefError::InvalidatedItem));
}

#[test]
fn test_attr_item_ref_invalidated_by_delete() {
    let mut vm = Vm::new();
    let m = Value::Object(vm.new_module("refs"));
    let name = vm.intern("slot");
    let item = vm.emplacedict(m, name);
    vm.set(item, Value::Int(5));
    assert_eq!(vm.getdict(m, name), Some(Value::Int(5)));
    assert!(vm.deldict(m, name));
    assert_eq!(vm.try_get(item), Err(RefError::InvalidatedItem));
}

#[test]
fn test_stack_ref_after_pop_is_detected() {
    let mut vm = Vm::new();
    vm.push(Value::Int(1));
    let top = vm.peek(-1);
    vm.pop();
    assert!(matches!(vm.try_get(top), Err(RefError::StaleStack { .. })));
}

#[test]
fn test_thousand_appends_read_back_in_order() {
    let mut vm = Vm::new();
    let r0 = vm.reg(0);
    vm.new_list(r0);
    let list = vm.get(r0);
    for i in 0..1000 {
        vm.list_append(list, Value::Int(i));
    }
    assert_eq!(vm.list_len(list), 1000);
    for i in 0..1000 {
        assert_eq!(vm.list_getitem(list, i as usize), Value::Int(i));
    }
}

#[test]
fn test_str_key_paths_agree() {
    let mut vm = Vm::new();
    let r0 = vm.reg(0);
    let r1 = vm.reg(1);
    vm.new_dict(r0);
    let d = vm.get(r0);
    vm.dict_setitem_by_str(d, "name", Value::Int(7));
    vm.new_str(r1, "name");
    let key = vm.get(r1);
    assert_eq!(vm.dict_getitem(d, key).unwrap(), Some(Value::Int(7)));
    assert_eq!(vm.getitem(d, key).unwrap(), Value::Int(7));
    assert_eq!(vm.dict_getitem_by_str(d, "name"), Some(Value::Int(7)));
}

#[test]
fn test_user_exception_matches_derived_and_base() {
    let mut vm = Vm::new();
    let t = vm.new_type("AppError", TypeId::BASE_EXCEPTION, None, None);
    let _ = vm.exception(t, "broken");
    assert!(!vm.match_exc(TypeId::TYPE_ERROR));
    assert!(vm.match_exc(t));
    assert!(vm.match_exc(TypeId::BASE_EXCEPTION));
    assert_eq!(vm.format_exc().as_deref(), Some("AppError: broken"));
    vm.clear_exc(None);
    assert!(!vm.check_exc(false));
}

#[test]
fn test_exception_cause_chain_is_formatted() {
    let mut vm = Vm::new();
    let _ = vm.key_error(Value::Int(1));
    let _ = vm.value_error("while handling");
    let text = vm.format_exc().unwrap();
    assert_eq!(
        text,
        "KeyError: 1\nDuring handling of the above exception, another exception occurred:\n\nValueError: while handling"
    );
}

fn add(vm: &mut Vm, _argc: usize, argv: StackRef) -> PyResult {
    let (a, b) = (vm.arg(argv, 0), vm.arg(argv, 1));
    let v = vm.binary_add(a, b)?;
    vm.set_retval(v);
    Ok(())
}

#[test]
fn test_decl_binding_checks_arguments() {
    let mut vm = Vm::new();
    let m = vm.new_module("mathx");
    vm.bind(Value::Object(m), "add(a, b)", add);
    let name = vm.intern("add");
    let f = vm.getattr(Value::Object(m), name).unwrap();
    let r0 = vm.reg(0);
    vm.set(r0, f);

    assert_eq!(vm.call(f, &[Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
    assert!(vm.call(f, &[Value::Int(2)]).is_err());
    assert_eq!(vm.format_exc().as_deref(), Some("TypeError: add() missing required argument 'b'"));
    vm.clear_exc(None);
    assert!(vm.call(f, &[Value::Int(1), Value::Int(2), Value::Int(3)]).is_err());
    assert!(vm.match_exc(TypeId::TYPE_ERROR));
}

#[test]
fn test_recursion_limit() {
    fn recurse(vm: &mut Vm, _argc: usize, argv: StackRef) -> PyResult {
        let f = vm.arg(argv, 0);
        vm.call(f, &[f])?;
        Ok(())
    }
    let mut vm = Vm::with_config(vela_vm::VmConfig { max_recursion_depth: 50, ..Default::default() });
    let r0 = vm.reg(0);
    vm.new_native_func(r0, recurse);
    let f = vm.get(r0);
    let sp = vm.sp();
    assert!(vm.call(f, &[f]).is_err());
    assert!(vm.match_exc(TypeId::RECURSION_ERROR));
    assert_eq!(vm.sp(), sp);
}

fn deep(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
    let name = vm.intern("deep");
    let f = vm.get_global(name).unwrap();
    let args: Vec<Value> = (0..argc).map(|i| vm.arg(argv, i)).collect();
    vm.call(f, &args)?;
    Ok(())
}

#[test]
fn test_wide_recursion_raises_before_the_stack_fills() {
    // each level holds a ten slot window plus eight locals
    let worker = std::thread::Builder::new().stack_size(512 << 20).spawn(|| {
        let mut vm = Vm::new();
        let m = vm.new_module("deepmod");
        let name = vm.bind(Value::Object(m), "deep(a, b, c, d, e, f, g, h)", deep);
        let f = vm.getattr(Value::Object(m), name).unwrap();
        vm.set_global(name, f);

        let sp = vm.sp();
        let args: Vec<Value> = (0..8).map(Value::Int).collect();
        assert!(vm.call(f, &args).is_err());
        assert!(vm.match_exc(TypeId::RECURSION_ERROR));
        assert_eq!(vm.sp(), sp);
        vm.clear_exc(None);
    });
    worker.unwrap().join().unwrap();
}
