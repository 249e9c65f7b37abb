//! Executor boundary and frame introspection.
//!
//! The VM does not parse or interpret source. A host-supplied `Executor`
//! compiles source into opaque `Code` and runs it inside a frame the VM
//! pushes; the executor reads and writes locals through the frame's stack
//! window and reports line changes with `trace_line`.

use std::rc::Rc;

use vela_common_core::{SourceLoc, TypeId};
use vela_runtime::{Code, GcRef, Object, ObjectData, OutRef, Value};

use crate::error::PyResult;
use crate::frame::{Frame, TraceEvent};
use crate::vm::Vm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    /// A module or statement sequence.
    Exec,
    /// A single expression; running it leaves the value in the return slot.
    Eval,
    /// One interactive statement.
    Single,
}

pub trait Executor {
    fn compile(&self, vm: &mut Vm, source: &str, filename: &str, mode: CompileMode) -> PyResult<Code>;

    /// Runs `code` in the innermost frame. Sets the return slot on success.
    fn run(&self, vm: &mut Vm, code: &Code) -> PyResult;
}

impl Vm {
    pub fn set_executor(&mut self, executor: impl Executor + 'static) {
        self.executor = Some(Rc::new(executor));
    }

    fn compile_code(&mut self, source: &str, filename: &str, mode: CompileMode) -> PyResult<Code> {
        let Some(executor) = self.executor.clone() else {
            return Err(self.runtime_error("no executor installed"));
        };
        executor.compile(self, source, filename, mode)
    }

    /// Compiles `source` into a `code` object left in the return slot.
    pub fn compile(&mut self, source: &str, filename: &str, mode: CompileMode) -> PyResult {
        let code = self.compile_code(source, filename, mode)?;
        let r = self.alloc(Object::new(TypeId::CODE, ObjectData::Code(code)));
        self.retval = Value::Object(r);
        Ok(())
    }

    /// Compiles and runs `source` in `module` (`__main__` when `None`).
    pub fn exec(&mut self, source: &str, filename: &str, mode: CompileMode, module: Option<GcRef>) -> PyResult {
        let code = self.compile_code(source, filename, mode)?;
        self.exec_code(&code, module)
    }

    /// Evaluates an expression; the value is left in the return slot.
    pub fn eval(&mut self, source: &str, module: Option<GcRef>) -> PyResult {
        self.exec(source, "<string>", CompileMode::Eval, module)
    }

    /// Runs compiled code as module-level code of `module`.
    pub fn exec_code(&mut self, code: &Code, module: Option<GcRef>) -> PyResult {
        let module = module.unwrap_or_else(|| self.main_module());
        self.run_module_frame(code, module, None, None)
    }

    /// Runs `source` with explicit `globals` and `locals` mappings (dict or
    /// namedict). Missing mappings default to the current module.
    pub fn smart_exec(&mut self, source: &str, globals: Option<Value>, locals: Option<Value>) -> PyResult {
        let code = self.compile_code(source, "<string>", CompileMode::Exec)?;
        let module = self.inspect_current_module();
        self.run_module_frame(&code, module, globals, locals)
    }

    pub fn smart_eval(&mut self, source: &str, globals: Option<Value>, locals: Option<Value>) -> PyResult {
        let code = self.compile_code(source, "<string>", CompileMode::Eval)?;
        let module = self.inspect_current_module();
        self.run_module_frame(&code, module, globals, locals)
    }

    /// Evaluates `source` in the current module and pushes the value.
    pub fn push_eval(&mut self, source: &str) -> PyResult {
        let module = self.inspect_current_module();
        self.eval(source, Some(module))?;
        let v = self.retval;
        self.push(v);
        Ok(())
    }

    fn run_module_frame(&mut self, code: &Code, module: GcRef, globals: Option<Value>, locals: Option<Value>) -> PyResult {
        let frame = Frame {
            function: None,
            module,
            base: self.sp(),
            nlocals: 0,
            globals,
            locals,
            name: "<module>".to_owned(),
            loc: SourceLoc::new(&*code.filename, 0),
        };
        let sp = self.sp();
        let res = self.run_frame(frame, code);
        self.stack.truncate(sp);
        res
    }

    /// Top-level entry: runs `source` in `__main__`. An uncaught exception
    /// is printed through the print callback and cleared.
    pub fn run_source(&mut self, source: &str, filename: &str) -> bool {
        let p0 = vela_runtime::StackRef::new(self.sp());
        match self.exec(source, filename, CompileMode::Exec, None) {
            Ok(()) => true,
            Err(_) => {
                self.print_exc();
                self.clear_exc(Some(p0));
                false
            }
        }
    }

    // =========================================================================
    // Frame introspection
    // =========================================================================

    #[inline]
    pub fn inspect_current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Frame `depth` levels out from the innermost one.
    pub fn frame(&self, depth: usize) -> Option<&Frame> {
        self.frames.iter().rev().nth(depth)
    }

    pub fn frame_source_loc(&self, depth: usize) -> Option<SourceLoc> {
        self.frame(depth).map(|f| f.source_loc().clone())
    }

    /// Function object of frame `depth`; `None` for module-level code.
    pub fn frame_function(&self, depth: usize) -> Option<Value> {
        let r = self.frame(depth)?.function?;
        Some(self.get(r))
    }

    pub fn inspect_current_function(&self) -> Option<Value> {
        self.frame_function(0)
    }

    /// Module of the innermost frame, or `__main__` outside any frame.
    pub fn inspect_current_module(&self) -> GcRef {
        match self.frames.last() {
            Some(f) => f.module,
            None => self.main_module(),
        }
    }

    /// Writes a mapping of frame `depth`'s globals: the explicit globals
    /// mapping if one was given, else a namedict proxy of its module.
    pub fn frame_new_globals(&mut self, out: impl Into<OutRef>, depth: usize) {
        let (module, explicit) = match self.frame(depth) {
            Some(f) => (f.module, f.globals),
            None => (self.main_module(), None),
        };
        let v = match explicit {
            Some(g) => g,
            None => self.alloc_with_slots(TypeId::NAMEDICT, &[Value::Object(module)]),
        };
        self.set(out, v);
    }

    /// Writes a mapping of frame `depth`'s locals. Function frames get a dict
    /// snapshot of their locals; module frames share their globals.
    pub fn frame_new_locals(&mut self, out: impl Into<OutRef>, depth: usize) {
        let out = out.into();
        let Some(frame) = self.frame(depth) else {
            return self.frame_new_globals(out, depth);
        };
        if let Some(l) = frame.locals {
            return self.set(out, l);
        }
        let Some(func_ref) = frame.function else {
            return self.frame_new_globals(out, depth);
        };
        let base = frame.base;
        let func = self.get(func_ref);
        let decl = match func.as_object().and_then(|r| self.object(r).as_function()) {
            Some(f) => f.decl.clone(),
            None => return self.frame_new_globals(out, depth),
        };
        let dict = self.alloc_dict();
        self.set(out, dict);
        for (i, name) in decl.local_names().enumerate() {
            let v = self.stack[base + i];
            if v.is_nil() {
                continue;
            }
            let key = self.name_to_str(name).to_owned();
            self.dict_setitem_by_str(dict, &key, v);
        }
    }

    pub fn new_globals(&mut self, out: impl Into<OutRef>) {
        self.frame_new_globals(out, 0);
    }

    pub fn new_locals(&mut self, out: impl Into<OutRef>) {
        self.frame_new_locals(out, 0);
    }

    /// Called by the executor when it reaches a new source line.
    pub fn trace_line(&mut self, line: u32) {
        if let Some(f) = self.frames.last_mut() {
            f.loc.line = line;
        }
        self.fire_trace(TraceEvent::Line);
    }
}
