//! The vectorcall calling convention.
//!
//! A call window on the operand stack is laid out as
//!
//! ```text
//! p0: callable | self-or-nil | arg * argc | (name, value) * kwargc
//! ```
//!
//! `vectorcall` leaves the result in the return slot and always pops the
//! whole window, whether the call succeeded or raised.

use vela_common_core::{Magic, Name, SourceLoc, TypeId};
use vela_runtime::{Code, FuncBody, FuncDecl, Function, StackRef, Value};

use crate::error::PyResult;
use crate::frame::{Frame, TraceEvent};
use crate::native::NativeFn;
use crate::vm::Vm;

/// Free slots a callee is guaranteed on entry.
const CALL_HEADROOM: usize = 32;

impl Vm {
    /// Calls the window of `2 + argc + 2 * kwargc` slots on top of the stack.
    pub fn vectorcall(&mut self, argc: usize, kwargc: usize) -> PyResult {
        let total = 2 + argc + 2 * kwargc;
        assert!(total <= self.sp(), "call window of {total} slots exceeds the stack ({})", self.sp());
        let p0 = self.sp() - total;
        let res = if self.call_depth >= self.config.max_recursion_depth {
            Err(self.exception(TypeId::RECURSION_ERROR, "maximum recursion depth exceeded"))
        } else if let Err(e) = self.reserve_stack(CALL_HEADROOM) {
            Err(e)
        } else {
            self.call_depth += 1;
            let res = self.vectorcall_at(p0, argc, kwargc);
            self.call_depth -= 1;
            res
        };
        self.stack.truncate(p0);
        res
    }

    fn vectorcall_at(&mut self, p0: usize, argc: usize, kwargc: usize) -> PyResult {
        let callable = self.stack[p0];
        match callable {
            Value::NativeFunc(id) => {
                if kwargc > 0 {
                    return Err(self.type_error("native function takes no keyword arguments"));
                }
                let (argv, argc) = if self.stack[p0 + 1].is_nil() { (p0 + 2, argc) } else { (p0 + 1, argc + 1) };
                let f = self.natives.get(id);
                self.retval = Value::None;
                f(self, argc, StackRef::new(argv))
            }
            Value::Type(t) => self.construct(t, p0, argc, kwargc),
            Value::Object(r) => {
                let ty = self.object(r).ty;
                if ty == TypeId::FUNCTION {
                    return self.call_function(p0, argc, kwargc);
                }
                if ty == TypeId::BOUNDMETHOD {
                    let slots = &self.object(r).slots;
                    let (receiver, func) = (slots[0], slots[1]);
                    let argc = self.rebind_window(p0, func, receiver, argc);
                    return self.vectorcall_at(p0, argc, kwargc);
                }
                match self.types.find_magic(ty, Magic::Call) {
                    Some(call) => {
                        let argc = self.rebind_window(p0, call, callable, argc);
                        self.vectorcall_at(p0, argc, kwargc)
                    }
                    None => Err(self.not_callable(callable)),
                }
            }
            Value::Nil => panic!("attempt to call nil"),
            _ => Err(self.not_callable(callable)),
        }
    }

    fn not_callable(&mut self, v: Value) -> crate::error::Raised {
        let msg = format!("'{}' object is not callable", self.type_name_of(v));
        self.type_error(msg)
    }

    /// Replaces the callable at `p0` with `func` bound to `receiver`. A
    /// receiver already in the window becomes the first positional argument.
    fn rebind_window(&mut self, p0: usize, func: Value, receiver: Value, argc: usize) -> usize {
        let prev = self.stack[p0 + 1];
        self.stack[p0] = func;
        self.stack[p0 + 1] = receiver;
        if prev.is_nil() {
            argc
        } else {
            self.stack.insert(p0 + 2, prev);
            argc + 1
        }
    }

    /// Folds a non-nil receiver into the positional arguments.
    fn receiver_as_arg(&mut self, p0: usize, argc: usize) -> usize {
        let prev = self.stack[p0 + 1];
        if prev.is_nil() {
            return argc;
        }
        self.stack[p0 + 1] = Value::Nil;
        self.stack.insert(p0 + 2, prev);
        argc + 1
    }

    // =========================================================================
    // Type objects: __new__ then __init__
    // =========================================================================

    fn construct(&mut self, t: TypeId, p0: usize, argc: usize, kwargc: usize) -> PyResult {
        let argc = self.receiver_as_arg(p0, argc);
        let nargs = argc + 2 * kwargc;
        let default_new = self.types.get(TypeId::OBJECT).magic(Magic::New);
        let default_init = self.types.get(TypeId::OBJECT).magic(Magic::Init);
        let new_fn = self.types.find_magic(t, Magic::New).unwrap_or(default_new);
        let init_fn = self.types.find_magic(t, Magic::Init).unwrap_or(default_init);
        let custom_new = !self.is_identical(new_fn, default_new);
        let custom_init = !self.is_identical(init_fn, default_init);

        let instance = if custom_new {
            self.push(new_fn);
            self.push_nil();
            self.push(Value::Type(t));
            for i in 0..nargs {
                let v = self.stack[p0 + 2 + i];
                self.push(v);
            }
            self.vectorcall(argc + 1, kwargc)?;
            self.retval
        } else {
            if nargs > 0 && !custom_init {
                let msg = format!("{}() takes no arguments", self.type_name(t));
                return Err(self.type_error(msg));
            }
            self.alloc_instance(t)
        };
        // the type is no longer needed; its slot keeps the instance rooted
        self.stack[p0] = instance;

        if custom_init && self.is_instance(instance, t) {
            self.push(init_fn);
            self.push(instance);
            for i in 0..nargs {
                let v = self.stack[p0 + 2 + i];
                self.push(v);
            }
            self.vectorcall(argc, kwargc)?;
            if !self.retval.is_none() {
                let msg = format!("__init__() should return None, not '{}'", self.type_name_of(self.retval));
                return Err(self.type_error(msg));
            }
        }
        self.retval = instance;
        Ok(())
    }

    // =========================================================================
    // function objects: declaration-based binding
    // =========================================================================

    fn call_function(&mut self, p0: usize, argc: usize, kwargc: usize) -> PyResult {
        let func: Function = self
            .object(self.stack[p0].as_object().expect("function is a heap object"))
            .as_function()
            .expect("function payload")
            .clone();
        let first = if self.stack[p0 + 1].is_nil() { p0 + 2 } else { p0 + 1 };
        let npos = argc + (first == p0 + 1) as usize;
        let kw_at = p0 + 2 + argc;
        let positional: Vec<Value> = self.stack[first..first + npos].to_vec();
        let mut keywords = Vec::with_capacity(kwargc);
        for i in 0..kwargc {
            let key = self.stack[kw_at + 2 * i];
            let name = self.keyword_name(key)?;
            keywords.push((name, self.stack[kw_at + 2 * i + 1]));
        }

        let locals = self.with_gc_paused(|vm| vm.bind_args(&func.decl, &positional, &keywords))?;
        self.reserve_stack(locals.len() + CALL_HEADROOM)?;
        let base = self.sp();
        let nlocals = locals.len();
        for v in locals {
            self.push(v);
        }

        match &func.decl.body {
            FuncBody::Native(id) => {
                let f = self.natives.get(*id);
                self.retval = Value::None;
                f(self, nlocals, StackRef::new(base))
            }
            FuncBody::Code(code) => {
                let module = match func.module {
                    Some(m) => m,
                    None => self.main_module(),
                };
                let frame = Frame {
                    function: Some(StackRef::new(p0)),
                    module,
                    base,
                    nlocals,
                    globals: None,
                    locals: None,
                    name: self.name_to_str(func.decl.name).to_owned(),
                    loc: SourceLoc::new(&*code.filename, 0),
                };
                self.run_frame(frame, code)
            }
        }
    }

    fn keyword_name(&mut self, key: Value) -> PyResult<Name> {
        match key {
            Value::Int(raw) if raw > 0 && raw <= u16::MAX as i64 => Ok(Name::from_raw(raw as u16)),
            Value::Object(r) => match self.object(r).as_str() {
                Some(s) => {
                    let s = s.to_owned();
                    Ok(self.intern(&s))
                }
                None => Err(self.type_error("keywords must be strings")),
            },
            _ => Err(self.type_error("keywords must be strings")),
        }
    }

    /// Matches arguments to `decl` and returns the locals: parameters, then
    /// the `*args` tuple and the `**kwargs` dict when declared.
    fn bind_args(&mut self, decl: &FuncDecl, positional: &[Value], keywords: &[(Name, Value)]) -> PyResult<Vec<Value>> {
        let fname = self.name_to_str(decl.name).to_owned();
        let nparams = decl.positional_count();
        let mut locals = vec![Value::Nil; decl.local_count()];

        let taken = positional.len().min(nparams);
        locals[..taken].copy_from_slice(&positional[..taken]);
        let extra = &positional[taken..];
        if !extra.is_empty() && decl.star_args.is_none() {
            let msg = format!(
                "{fname}() takes {nparams} positional arguments but {} were given",
                positional.len()
            );
            return Err(self.type_error(msg));
        }

        let mut extra_kw = Vec::new();
        for &(name, v) in keywords {
            match decl.params.iter().position(|p| p.name == name) {
                Some(i) if !locals[i].is_nil() => {
                    let msg = format!("{fname}() got multiple values for argument '{}'", self.name_to_str(name));
                    return Err(self.type_error(msg));
                }
                Some(i) => locals[i] = v,
                None if decl.star_kwargs.is_some() => extra_kw.push((name, v)),
                None => {
                    let msg = format!("{fname}() got an unexpected keyword argument '{}'", self.name_to_str(name));
                    return Err(self.type_error(msg));
                }
            }
        }

        for (i, p) in decl.params.iter().enumerate() {
            if locals[i].is_nil() {
                match p.default {
                    Some(d) => locals[i] = d,
                    None => {
                        let msg = format!("{fname}() missing required argument '{}'", self.name_to_str(p.name));
                        return Err(self.type_error(msg));
                    }
                }
            }
        }

        let mut next = decl.params.len();
        if decl.star_args.is_some() {
            locals[next] = self.alloc_tuple(extra);
            next += 1;
        }
        if decl.star_kwargs.is_some() {
            let dict = self.alloc_dict();
            for (name, v) in extra_kw {
                let key = self.name_str(name);
                self.dict_setitem(dict, key, v)?;
            }
            locals[next] = dict;
        }
        Ok(locals)
    }

    /// Runs interpreted code in a new frame through the executor.
    pub(crate) fn run_frame(&mut self, frame: Frame, code: &Code) -> PyResult {
        let Some(executor) = self.executor.clone() else {
            return Err(self.runtime_error("no executor installed"));
        };
        self.frames.push(frame);
        self.fire_trace(TraceEvent::Push);
        self.retval = Value::None;
        let res = executor.run(self, code);
        self.fire_trace(TraceEvent::Pop);
        let frame = self.frames.pop().expect("no active frame");
        if res.is_err() {
            let line = frame.traceback_line();
            let exc = self.curr_exc;
            if let Some(info) = self.exc_info_mut(exc) {
                info.traceback.push(line);
            }
        }
        res
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Raises `RecursionError` unless `n` more slots fit on the operand stack.
    pub(crate) fn reserve_stack(&mut self, n: usize) -> PyResult {
        if self.sp() + n > self.config.stack_size {
            return Err(self.exception(TypeId::RECURSION_ERROR, "maximum recursion depth exceeded (operand stack is full)"));
        }
        Ok(())
    }

    /// Calls `f` with positional `args`. The stack is left unchanged.
    pub fn call(&mut self, f: Value, args: &[Value]) -> PyResult<Value> {
        self.reserve_stack(args.len() + 2)?;
        self.push(f);
        self.push_nil();
        for &a in args {
            self.push(a);
        }
        self.vectorcall(args.len(), 0)?;
        Ok(self.retval)
    }

    /// Calls the magic method or bound callable `f` with `receiver` as self.
    pub(crate) fn call_bound(&mut self, f: Value, receiver: Value, args: &[Value]) -> PyResult<Value> {
        self.reserve_stack(args.len() + 2)?;
        self.push(f);
        self.push(receiver);
        for &a in args {
            self.push(a);
        }
        self.vectorcall(args.len(), 0)?;
        Ok(self.retval)
    }

    /// Calls method `name` of `receiver`.
    pub fn call_method(&mut self, receiver: Value, name: Name, args: &[Value]) -> PyResult<Value> {
        self.reserve_stack(args.len() + 2)?;
        self.push(receiver);
        if !self.push_method(name) {
            self.pop();
            let f = self.getattr(receiver, name)?;
            return self.call(f, args);
        }
        for &a in args {
            self.push(a);
        }
        self.vectorcall(args.len(), 0)?;
        Ok(self.retval)
    }

    /// Replaces the receiver on top of the stack with `[method, self]` when
    /// its type defines `name` as a method. Leaves the stack untouched and
    /// returns false otherwise.
    pub fn push_method(&mut self, name: Name) -> bool {
        let receiver = self.get(self.peek(-1));
        let ty = self.type_of(receiver);
        let Some(attr) = self.types.find_attr(ty, name) else {
            return false;
        };
        let (func, bound) = match attr {
            Value::NativeFunc(_) => (attr, receiver),
            Value::Object(r) => match self.object(r).ty {
                TypeId::FUNCTION => (attr, receiver),
                TypeId::STATICMETHOD => (self.object(r).slots[0], Value::Nil),
                TypeId::CLASSMETHOD => (self.object(r).slots[0], Value::Type(ty)),
                _ => return false,
            },
            _ => return false,
        };
        self.pop();
        self.push(func);
        self.push(bound);
        true
    }

    /// Calls a native function directly on an argument window, checking in
    /// debug builds that it sets the return slot and balances the stack.
    pub fn call_cfunc(&mut self, f: NativeFn, argc: usize, argv: StackRef) -> PyResult {
        let sp = self.sp();
        self.retval = Value::Nil;
        let res = f(self, argc, argv);
        if res.is_ok() {
            debug_assert!(!self.retval.is_nil(), "native function did not set the return value");
            debug_assert_eq!(self.sp(), sp, "native function left the stack unbalanced");
        }
        res
    }

    pub fn check_argc(&mut self, argc: usize, n: usize) -> PyResult {
        if argc == n {
            return Ok(());
        }
        Err(self.type_error(format!("expected {n} arguments, got {argc}")))
    }

    pub fn check_arg_type(&mut self, argv: StackRef, i: usize, t: TypeId) -> PyResult {
        let v = self.arg(argv, i);
        if self.is_type(v, t) {
            return Ok(());
        }
        let msg = format!(
            "expected '{}' for argument {i}, got '{}'",
            self.type_name(t),
            self.type_name_of(v)
        );
        Err(self.type_error(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add2(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult {
        vm.check_argc(argc, 2)?;
        let a = vm.cast_int(vm.arg(argv, 0))?;
        let b = vm.cast_int(vm.arg(argv, 1))?;
        vm.set_retval(Value::Int(a + b));
        Ok(())
    }

    #[test]
    fn test_native_call_pops_window() {
        let mut vm = Vm::new();
        let sp = vm.sp();
        let out = vm.push_tmp();
        vm.new_native_func(out, add2);
        vm.push_nil();
        vm.push(Value::Int(2));
        vm.push(Value::Int(3));
        vm.vectorcall(2, 0).unwrap();
        assert_eq!(vm.retval(), Value::Int(5));
        assert_eq!(vm.sp(), sp);
    }

    #[test]
    fn test_failed_call_pops_window() {
        let mut vm = Vm::new();
        let sp = vm.sp();
        let out = vm.push_tmp();
        vm.new_native_func(out, add2);
        vm.push_nil();
        vm.push(Value::Int(2));
        assert!(vm.vectorcall(1, 0).is_err());
        assert_eq!(vm.sp(), sp);
        assert!(vm.match_exc(TypeId::TYPE_ERROR));
    }

    #[test]
    fn test_not_callable() {
        let mut vm = Vm::new();
        assert!(vm.call(Value::Int(1), &[]).is_err());
        assert_eq!(vm.format_exc().as_deref(), Some("TypeError: 'int' object is not callable"));
    }

    #[test]
    fn test_call_cfunc_checks() {
        let mut vm = Vm::new();
        vm.push(Value::Int(4));
        vm.push(Value::Int(5));
        let argv = vm.peek(-2);
        vm.call_cfunc(add2, 2, argv).unwrap();
        assert_eq!(vm.retval(), Value::Int(9));
        vm.shrink(2);
    }

    #[test]
    fn test_recursion_limit() {
        fn recurse(vm: &mut Vm, _argc: usize, _argv: StackRef) -> PyResult {
            let out = vm.push_tmp();
            vm.new_native_func(out, recurse);
            vm.push_nil();
            vm.vectorcall(0, 0)
        }
        let mut vm = Vm::with_config(crate::VmConfig { max_recursion_depth: 64, ..Default::default() });
        let out = vm.push_tmp();
        vm.new_native_func(out, recurse);
        vm.push_nil();
        assert!(vm.vectorcall(0, 0).is_err());
        assert!(vm.match_exc(TypeId::RECURSION_ERROR));
        assert_eq!(vm.sp(), 0);
    }
}
