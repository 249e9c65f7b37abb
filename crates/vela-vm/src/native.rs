//! Native function table.
//!
//! `Value::NativeFunc` carries an index into this per-context table so values
//! stay plain data. Registering the same function twice returns the same id.

use hashbrown::HashMap;
use vela_runtime::{NativeId, StackRef};

use crate::error::PyResult;
use crate::vm::Vm;

/// Signature of every native callable.
///
/// `argv` is the first of `argc` consecutive argument slots; the callee must
/// not read past them. The result goes to the return slot via
/// `Vm::set_retval`; a callee that never sets it returns `None`.
pub type NativeFn = fn(vm: &mut Vm, argc: usize, argv: StackRef) -> PyResult;

#[derive(Default)]
pub struct NativeRegistry {
    funcs: Vec<NativeFn>,
    index: HashMap<usize, NativeId>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, f: NativeFn) -> NativeId {
        let key = f as usize;
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = NativeId(self.funcs.len() as u32);
        self.funcs.push(f);
        self.index.insert(key, id);
        id
    }

    #[inline]
    pub fn get(&self, id: NativeId) -> NativeFn {
        self.funcs[id.0 as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}
