//! Source positions for diagnostics.

use core::fmt;

#[cfg(not(feature = "std"))]
use alloc::string::String;

/// Source location of the instruction a frame is executing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: String,
    /// Line number (1-indexed, 0 when unknown)
    pub line: u32,
}

impl SourceLoc {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
