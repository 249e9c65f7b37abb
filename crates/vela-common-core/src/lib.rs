//! # vela-common-core
//!
//! Core types for Vela that are `no_std` compatible.
//!
//! This crate provides the identifiers every other layer agrees on:
//! - `Name` - interned identifier (and `NameTable` with the std feature)
//! - `Magic` - the reserved block of protocol/operator names
//! - `TypeId` - dense ids of the predefined builtin types
//! - `SourceLoc` - source position used in tracebacks

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod magic;
pub mod name;
pub mod source;
pub mod types;

pub use magic::Magic;
pub use name::Name;
#[cfg(feature = "std")]
pub use name::NameTable;
pub use source::SourceLoc;
pub use types::{BuiltinType, TypeId, BUILTIN_TYPES};
