//! Activation records and trace events.

use vela_common_core::SourceLoc;
use vela_runtime::{GcRef, StackRef, Value};

/// One activation. Frames exist for interpreted function bodies and for
/// module-level code run through the executor; native calls do not push one.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Stack slot holding the called function object; `None` for module code.
    pub function: Option<StackRef>,
    /// Module whose dict is the global namespace.
    pub module: GcRef,
    /// First local slot on the operand stack.
    pub base: usize,
    pub nlocals: usize,
    /// Explicit globals mapping (dict or namedict) for dynamic execution.
    pub globals: Option<Value>,
    /// Explicit locals mapping for dynamic execution.
    pub locals: Option<Value>,
    /// Function name, or `<module>`.
    pub name: String,
    pub loc: SourceLoc,
}

impl Frame {
    #[inline]
    pub fn source_loc(&self) -> &SourceLoc {
        &self.loc
    }

    /// Stack ref of local `i`.
    #[inline]
    pub fn local(&self, i: usize) -> StackRef {
        assert!(i < self.nlocals, "local {i} out of range ({} locals)", self.nlocals);
        StackRef::new(self.base + i)
    }

    #[inline]
    pub fn locals_base(&self) -> StackRef {
        StackRef::new(self.base)
    }

    pub(crate) fn traceback_line(&self) -> String {
        format!("  File \"{}\", line {}, in {}", self.loc.file, self.loc.line, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// The executor moved to a new source line.
    Line,
    /// An exception was raised while this frame was active.
    Exception,
    Push,
    Pop,
}
