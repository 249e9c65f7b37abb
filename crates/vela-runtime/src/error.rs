//! Reference misuse errors.
//!
//! These are host programming errors, not language exceptions: they report a
//! reference used outside the lifetime of its role.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefError {
    #[error("stack ref {index} read after pop (stack depth is {depth})")]
    StaleStack { index: usize, depth: usize },

    #[error("item ref used after its container was structurally modified")]
    InvalidatedItem,

    #[error("item ref index {index} out of range (container length {len})")]
    ItemOutOfRange { index: usize, len: usize },

    #[error("reference to a collected object")]
    Collected,

    #[error("slot {slot} out of range (object has {len} slots)")]
    SlotOutOfRange { slot: usize, len: usize },

    #[error("register r{0} does not exist")]
    NoSuchRegister(u8),

    #[error("global constant is read-only")]
    ReadOnly,

    #[error("object has no storage of the requested kind")]
    WrongContainer,
}
