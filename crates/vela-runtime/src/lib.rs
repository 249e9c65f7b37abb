//! # vela-runtime
//!
//! Shared data structures for the Vela VM.
//!
//! - `value` - the tagged `Value` and its identity rules
//! - `gc` - arena heap with generation-checked handles and a mark-sweep cycle
//! - `object` - heap object layout and payloads
//! - `dict`, `namedict` - insertion ordered maps with structural epochs
//! - `refs` - the five reference roles native code uses to touch values

pub mod dict;
pub mod error;
pub mod gc;
pub mod namedict;
pub mod object;
pub mod refs;
pub mod value;

pub use dict::{hash_str, Dict};
pub use error::RefError;
pub use gc::{Gc, GcRef};
pub use namedict::NameDict;
pub use object::{
    Code, ExcInfo, FuncBody, FuncDecl, Function, IterMode, List, ModuleInfo, Object, ObjectData,
    Param, SeqIter,
};
pub use refs::{GlobalRef, ItemKind, ItemRef, ObjectRef, OutRef, Ref, StackRef};
pub use value::{NativeId, Value};

pub use vela_common_core::{Magic, Name, TypeId};
