//! Integration tests: a line-based toy executor driving frames, tracebacks
//! and trace events.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use vela_vm::{Code, CompileMode, Executor, Frame, PyResult, TraceEvent, TypeId, Value, Vm};

/// Understands `set NAME INT`, `call NAME`, `raise MSG` and, in eval
/// mode, a bare integer.
struct Lines;

impl Executor for Lines {
    fn compile(&self, vm: &mut Vm, source: &str, filename: &str, _mode: CompileMode) -> PyResult<Code> {
        if source.contains('?') {
            return Err(vm.exception(TypeId::SYNTAX_ERROR, "invalid syntax"));
        }
        let lines: Vec<String> = source.lines().map(str::to_owned).collect();
        Ok(Code::new(filename, Rc::new(lines)))
    }

    fn run(&self, vm: &mut Vm, code: &Code) -> PyResult {
        let lines = code.inner.downcast_ref::<Vec<String>>().expect("compiled by Lines");
        for (i, line) in lines.iter().enumerate() {
            vm.trace_line(i as u32 + 1);
            let mut words = line.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some("set"), Some(name), Some(v)) => {
                    let name = vm.intern(name);
                    vm.set_global(name, Value::Int(v.parse().unwrap()));
                }
                (Some("call"), Some(name), None) => {
                    let name = vm.intern(name);
                    let f = vm.get_global(name).expect("callee is defined");
                    vm.call(f, &[])?;
                }
                (Some("raise"), Some(msg), None) => return Err(vm.value_error(msg)),
                (Some(n), None, None) => vm.set_retval(Value::Int(n.parse().unwrap())),
                _ => {}
            }
        }
        Ok(())
    }
}

fn capture_print(vm: &mut Vm) -> Rc<RefCell<String>> {
    let out = Rc::new(RefCell::new(String::new()));
    let sink = out.clone();
    vm.callbacks_mut().print = Box::new(move |s: &str| sink.borrow_mut().push_str(s));
    out
}

#[test]
fn test_exec_and_eval() {
    let mut vm = Vm::new();
    vm.set_executor(Lines);
    vm.exec("set x 5\nset y 6", "<test>", CompileMode::Exec, None).unwrap();
    let x = vm.intern("x");
    assert_eq!(vm.get_global(x), Some(Value::Int(5)));

    vm.eval("41", None).unwrap();
    assert_eq!(vm.retval(), Value::Int(41));

    let sp = vm.sp();
    vm.push_eval("7").unwrap();
    assert_eq!(vm.sp(), sp + 1);
    assert_eq!(vm.pop(), Value::Int(7));
}

#[test]
fn test_missing_executor_is_a_runtime_error() {
    let mut vm = Vm::new();
    assert!(vm.eval("1", None).is_err());
    assert!(vm.match_exc(TypeId::RUNTIME_ERROR));
}

#[test]
fn test_compile_failure_surfaces_as_syntax_error() {
    let mut vm = Vm::new();
    vm.set_executor(Lines);
    let out = capture_print(&mut vm);
    assert!(!vm.run_source("set x ?", "bad.vl"));
    assert_eq!(out.borrow().as_str(), "SyntaxError: invalid syntax\n");
    assert!(!vm.check_exc(false));
}

#[test]
fn test_uncaught_exception_prints_traceback() {
    let mut vm = Vm::new();
    vm.set_executor(Lines);
    let out = capture_print(&mut vm);

    let code = Code::new("lib.vl", Rc::new(vec!["raise inner".to_owned()]));
    let r0 = vm.reg(0);
    let name = vm.new_code_function(r0, "helper()", code, None);
    let helper = vm.get(r0);
    vm.set_global(name, helper);

    let sp = vm.sp();
    assert!(!vm.run_source("set a 1\ncall helper\nset b 2", "main.vl"));
    assert_eq!(
        out.borrow().as_str(),
        "Traceback (most recent call last):\n  File \"main.vl\", line 2, in <module>\n  File \"lib.vl\", line 1, in helper\nValueError: inner\n"
    );
    assert_eq!(vm.sp(), sp);
    assert_eq!(vm.frame_depth(), 0);
    let b = vm.intern("b");
    assert_eq!(vm.get_global(b), None);

    assert!(vm.run_source("set b 2", "main.vl"));
    assert_eq!(vm.get_global(b), Some(Value::Int(2)));
}

#[test]
fn test_trace_events() {
    let mut vm = Vm::new();
    vm.set_executor(Lines);
    capture_print(&mut vm);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    vm.set_trace(Some(Box::new(move |ev: TraceEvent, frame: &Frame| sink.borrow_mut().push((ev, frame.loc.line)))));

    vm.run_source("set a 1\nraise boom", "t.vl");
    assert_eq!(
        *events.borrow(),
        vec![
            (TraceEvent::Push, 0),
            (TraceEvent::Line, 1),
            (TraceEvent::Line, 2),
            (TraceEvent::Exception, 2),
            (TraceEvent::Pop, 2),
        ]
    );
}
