//! Error types.
//!
//! Language-level failures travel through the exception channel: a fallible
//! operation returns `Err(Raised)` and the exception itself sits in the
//! context's exception slot. Host-level misuse of the context registry is a
//! `ContextError`.

use thiserror::Error;

/// Marker for "an exception was raised; details are in the exception slot".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raised;

/// Result of a fallible runtime operation.
pub type PyResult<T = ()> = Result<T, Raised>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context index {index} out of range (max {max})")]
    OutOfRange { index: usize, max: usize },

    #[error("context {0} is not initialized")]
    NotInitialized(usize),
}
