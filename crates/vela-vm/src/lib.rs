//! # vela-vm
//!
//! Embeddable core of the Vela runtime: isolated contexts with their own
//! names, types and heap, magic-method dispatch, the vectorcall calling
//! convention, an exception channel and a threshold mark-sweep collector.
//!
//! Parsing and bytecode execution are supplied by the host through the
//! [`Executor`] trait.
//!
//! ```ignore
//! let mut rt = Runtime::new();
//! let vm = rt.vm();
//! let r0 = vm.reg(0);
//! vm.new_int(r0, 2);
//! ```

mod builtins;
mod config;
mod error;
mod frame;
mod gc_roots;
mod host;
mod native;
mod registry;
mod signature;
mod types;
mod vm;

pub use config::VmConfig;
pub use error::{ContextError, PyResult, Raised};
pub use frame::{Frame, TraceEvent};
pub use host::{Callbacks, TraceFn};
pub use native::NativeFn;
pub use registry::{Runtime, MAX_CONTEXTS};
pub use signature::{parse_signature, Signature, SignatureError};
pub use types::{Dtor, Layout, TypeRecord, TypeRegistry};
pub use vm::{CompileMode, Executor, Vm, REGISTER_COUNT};

pub use vela_common_core::{Magic, Name, SourceLoc, TypeId};
pub use vela_runtime::{
    Code, FuncBody, FuncDecl, GcRef, GlobalRef, ItemRef, ObjectRef, OutRef, Param, Ref, RefError, StackRef, Value,
};
