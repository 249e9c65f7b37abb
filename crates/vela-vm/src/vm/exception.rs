//! Exception channel.
//!
//! A raise stores the exception object in the context's exception slot and
//! returns `Raised`; callers propagate with `?`. Handlers inspect the slot
//! with `match_exc` and reset it with `clear_exc`.

use core::fmt;
use core::fmt::Write;

use vela_common_core::{Name, TypeId};
use vela_runtime::{ExcInfo, Object, ObjectData, StackRef, Value};

use crate::builtins::{format_float, repr_str};
use crate::error::Raised;
use crate::frame::TraceEvent;
use crate::vm::Vm;

const MAX_CAUSE_DEPTH: usize = 16;

impl Vm {
    pub(crate) fn alloc_exception(&mut self, ty: TypeId, msg: Value) -> Value {
        let obj = Object::with_dict(ty, ObjectData::Exception(ExcInfo::new(msg)));
        Value::Object(self.alloc(obj))
    }

    /// Raises a new exception of type `ty` carrying `msg`.
    pub fn exception(&mut self, ty: TypeId, msg: impl fmt::Display) -> Raised {
        let text = msg.to_string();
        let exc = self.with_gc_paused(|vm| {
            let m = vm.alloc_string(text);
            vm.alloc_exception(ty, m)
        });
        self.raise(exc)
    }

    /// Raises `v`, an exception instance or an exception type to
    /// instantiate without a message.
    pub fn raise(&mut self, v: Value) -> Raised {
        let exc = match v {
            Value::Type(t) if self.types.is_subclass(t, TypeId::BASE_EXCEPTION) => {
                self.alloc_exception(t, Value::None)
            }
            Value::Object(_) if self.exc_info(v).is_some() => v,
            _ => return self.exception(TypeId::TYPE_ERROR, "exceptions must derive from BaseException"),
        };
        let prev = self.curr_exc;
        if !prev.is_nil() && !self.is_identical(prev, exc) {
            if let Some(info) = self.exc_info_mut(exc) {
                if info.cause.is_nil() {
                    info.cause = prev;
                }
            }
        }
        self.curr_exc = exc;
        self.exc_handled = false;
        self.fire_trace(TraceEvent::Exception);
        Raised
    }

    /// Whether an exception is pending. With `ignore_handled`, an exception
    /// already matched by a handler does not count.
    pub fn check_exc(&self, ignore_handled: bool) -> bool {
        !self.curr_exc.is_nil() && !(ignore_handled && self.exc_handled)
    }

    /// Tests the pending exception against `ty`. On a match the exception is
    /// marked handled and copied to the return slot.
    pub fn match_exc(&mut self, ty: TypeId) -> bool {
        if self.curr_exc.is_nil() || !self.is_instance(self.curr_exc, ty) {
            return false;
        }
        self.exc_handled = true;
        self.retval = self.curr_exc;
        true
    }

    /// Discards the pending exception. With `p0`, the stack is unwound to
    /// that depth and frames above it are dropped.
    pub fn clear_exc(&mut self, p0: Option<StackRef>) {
        self.curr_exc = Value::Nil;
        self.exc_handled = false;
        if let Some(p0) = p0 {
            let depth = p0.index();
            while self.frames.last().map_or(false, |f| f.base > depth) {
                self.frames.pop();
            }
            self.stack.truncate(depth);
        }
    }

    #[inline]
    pub fn current_exc(&self) -> Value {
        self.curr_exc
    }

    /// Renders the pending exception with its cause chain and traceback.
    /// Marks it handled.
    pub fn format_exc(&mut self) -> Option<String> {
        if self.curr_exc.is_nil() {
            return None;
        }
        let mut out = String::new();
        self.format_one(self.curr_exc, &mut out, 0);
        self.exc_handled = true;
        Some(out)
    }

    /// Sends `format_exc` to the print callback.
    pub fn print_exc(&mut self) {
        if let Some(mut text) = self.format_exc() {
            text.push('\n');
            (self.callbacks.print)(&text);
        }
    }

    fn format_one(&self, exc: Value, out: &mut String, depth: usize) {
        let Some(info) = self.exc_info(exc) else {
            out.push_str(&self.display_value(exc, true));
            return;
        };
        if depth < MAX_CAUSE_DEPTH && !info.cause.is_nil() {
            self.format_one(info.cause, out, depth + 1);
            out.push_str("\nDuring handling of the above exception, another exception occurred:\n\n");
        }
        if !info.traceback.is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            for line in info.traceback.iter().rev() {
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str(self.type_name_of(exc));
        let msg = self.exc_message(exc);
        if !msg.is_empty() {
            let _ = write!(out, ": {msg}");
        }
    }

    /// Message text of an exception; empty when it has none.
    pub(crate) fn exc_message(&self, exc: Value) -> String {
        match self.exc_info(exc).map(|i| i.msg) {
            None | Some(Value::Nil) | Some(Value::None) => String::new(),
            Some(m) => self.display_value(m, false),
        }
    }

    pub(crate) fn exc_info(&self, v: Value) -> Option<&ExcInfo> {
        v.as_object().and_then(|r| self.heap.try_get(r).ok()).and_then(|o| o.as_exception())
    }

    pub(crate) fn exc_info_mut(&mut self, v: Value) -> Option<&mut ExcInfo> {
        let r = v.as_object()?;
        self.heap.try_get_mut(r).ok().and_then(|o| o.as_exception_mut())
    }

    /// Non-dispatching rendering for messages. Never calls user code.
    pub(crate) fn display_value(&self, v: Value, repr: bool) -> String {
        match v {
            Value::Nil => "<nil>".to_owned(),
            Value::None => "None".to_owned(),
            Value::NotImplemented => "NotImplemented".to_owned(),
            Value::Ellipsis => "Ellipsis".to_owned(),
            Value::Bool(true) => "True".to_owned(),
            Value::Bool(false) => "False".to_owned(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(f),
            Value::Type(t) => format!("<class '{}'>", self.type_name(t)),
            Value::NativeFunc(_) => "<nativefunc object>".to_owned(),
            Value::Object(r) => match self.heap.try_get(r).ok().and_then(|o| o.as_str()) {
                Some(s) if repr => repr_str(s),
                Some(s) => s.to_owned(),
                None => format!("<{} object>", self.type_name_of(v)),
            },
        }
    }

    // =========================================================================
    // Shorthands
    // =========================================================================

    pub fn type_error(&mut self, msg: impl fmt::Display) -> Raised {
        self.exception(TypeId::TYPE_ERROR, msg)
    }

    pub fn value_error(&mut self, msg: impl fmt::Display) -> Raised {
        self.exception(TypeId::VALUE_ERROR, msg)
    }

    pub fn index_error(&mut self, msg: impl fmt::Display) -> Raised {
        self.exception(TypeId::INDEX_ERROR, msg)
    }

    pub fn runtime_error(&mut self, msg: impl fmt::Display) -> Raised {
        self.exception(TypeId::RUNTIME_ERROR, msg)
    }

    pub fn zero_division_error(&mut self, msg: impl fmt::Display) -> Raised {
        self.exception(TypeId::ZERO_DIVISION_ERROR, msg)
    }

    pub fn os_error(&mut self, msg: impl fmt::Display) -> Raised {
        self.exception(TypeId::OS_ERROR, msg)
    }

    pub fn import_error(&mut self, msg: impl fmt::Display) -> Raised {
        self.exception(TypeId::IMPORT_ERROR, msg)
    }

    pub fn name_error(&mut self, name: Name) -> Raised {
        let msg = format!("name '{}' is not defined", self.name_to_str(name));
        self.exception(TypeId::NAME_ERROR, msg)
    }

    pub fn unbound_local_error(&mut self, name: Name) -> Raised {
        let msg = format!("local variable '{}' referenced before assignment", self.name_to_str(name));
        self.exception(TypeId::UNBOUND_LOCAL_ERROR, msg)
    }

    pub fn attribute_error(&mut self, obj: Value, name: Name) -> Raised {
        let msg = match obj {
            Value::Type(t) => format!(
                "type object '{}' has no attribute '{}'",
                self.type_name(t),
                self.name_to_str(name)
            ),
            _ => format!(
                "'{}' object has no attribute '{}'",
                self.type_name_of(obj),
                self.name_to_str(name)
            ),
        };
        self.exception(TypeId::ATTRIBUTE_ERROR, msg)
    }

    pub fn key_error(&mut self, key: Value) -> Raised {
        let msg = self.display_value(key, true);
        self.exception(TypeId::KEY_ERROR, msg)
    }

    pub fn stop_iteration(&mut self) -> Raised {
        self.raise(Value::Type(TypeId::STOP_ITERATION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_and_match() {
        let mut vm = Vm::new();
        let _ = vm.value_error("bad value");
        assert!(vm.check_exc(false));
        assert!(!vm.match_exc(TypeId::TYPE_ERROR));
        assert!(vm.match_exc(TypeId::EXCEPTION));
        assert!(vm.check_exc(false));
        assert!(!vm.check_exc(true));
        assert_eq!(vm.format_exc().as_deref(), Some("ValueError: bad value"));
        vm.clear_exc(None);
        assert!(!vm.check_exc(false));
        assert_eq!(vm.format_exc(), None);
    }

    #[test]
    fn test_raise_non_exception() {
        let mut vm = Vm::new();
        let _ = vm.raise(Value::Int(3));
        assert!(vm.match_exc(TypeId::TYPE_ERROR));
        assert_eq!(vm.exc_message(vm.current_exc()), "exceptions must derive from BaseException");
    }

    #[test]
    fn test_cause_chain_formatting() {
        let mut vm = Vm::new();
        let _ = vm.key_error(Value::Int(1));
        let _ = vm.runtime_error("while handling");
        let text = vm.format_exc().unwrap();
        let expected = [
            "KeyError: 1",
            "During handling of the above exception, another exception occurred:",
            "",
            "RuntimeError: while handling",
        ]
        .join("\n");
        assert_eq!(text, expected);
    }

    #[test]
    fn test_raise_type_has_no_message() {
        let mut vm = Vm::new();
        let _ = vm.stop_iteration();
        assert_eq!(vm.format_exc().as_deref(), Some("StopIteration"));
    }

    #[test]
    fn test_clear_exc_unwinds_stack() {
        let mut vm = Vm::new();
        let p0 = StackRef::new(vm.sp());
        vm.push(Value::Int(1));
        vm.push(Value::Int(2));
        let _ = vm.index_error("oops");
        vm.clear_exc(Some(p0));
        assert_eq!(vm.sp(), p0.index());
    }
}
