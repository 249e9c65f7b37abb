//! The context (VM) and its operand stack.
//!
//! A `Vm` is one isolated runtime: its own names, types, heap, modules,
//! stack, registers and exception slot. Every operation takes the context
//! explicitly; there is no ambient global state.

mod attr;
mod bind;
mod call;
mod containers;
mod dispatch;
mod exception;
mod exec;
mod modules;
mod values;

use core::any::Any;
use std::rc::Rc;

use hashbrown::HashMap;
use indexmap::IndexMap;
use vela_common_core::{Name, NameTable};
use vela_runtime::{
    GcRef, Gc, GlobalRef, ItemKind, ItemRef, Object, ObjectData, Ref, RefError, StackRef, Value,
};

use crate::builtins;
use crate::config::VmConfig;
use crate::frame::Frame;
use crate::host::{Callbacks, TraceFn};
use crate::native::NativeRegistry;
use crate::types::TypeRegistry;

pub(crate) use dispatch::hash_float;
pub use exec::{CompileMode, Executor};

/// Number of scratch registers `r0..r7`.
pub const REGISTER_COUNT: usize = 8;

pub struct Vm {
    pub(crate) config: VmConfig,
    pub(crate) names: NameTable,
    pub(crate) types: TypeRegistry,
    pub(crate) heap: Gc,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) registers: [Value; REGISTER_COUNT],
    pub(crate) retval: Value,
    pub(crate) curr_exc: Value,
    pub(crate) exc_handled: bool,
    pub(crate) modules: IndexMap<String, GcRef>,
    pub(crate) name_strs: HashMap<Name, GcRef>,
    pub(crate) natives: NativeRegistry,
    pub(crate) callbacks: Callbacks,
    pub(crate) trace_fn: Option<TraceFn>,
    pub(crate) executor: Option<Rc<dyn Executor>>,
    pub(crate) user_ctx: Option<Box<dyn Any>>,
    pub(crate) call_depth: usize,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut names = NameTable::new();
        let types = TypeRegistry::new(&mut names);
        let mut vm = Self {
            heap: Gc::with_threshold(config.gc_min_threshold, config.gc_pause_percent),
            stack: Vec::with_capacity(config.stack_size),
            config,
            names,
            types,
            frames: Vec::new(),
            registers: [Value::Nil; REGISTER_COUNT],
            retval: Value::Nil,
            curr_exc: Value::Nil,
            exc_handled: false,
            modules: IndexMap::new(),
            name_strs: HashMap::new(),
            natives: NativeRegistry::new(),
            callbacks: Callbacks::default(),
            trace_fn: None,
            executor: None,
            user_ctx: None,
            call_depth: 0,
        };
        vm.heap.pause_gc();
        builtins::install(&mut vm);
        vm.heap.resume_gc();
        log::debug!(
            "context created: {} types, {} natives, {} objects",
            vm.types.len(),
            vm.natives.len(),
            vm.heap.object_count()
        );
        vm
    }

    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    #[inline]
    pub fn heap(&self) -> &Gc {
        &self.heap
    }

    #[inline]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn callbacks_mut(&mut self) -> &mut Callbacks {
        &mut self.callbacks
    }

    /// Installs the trace hook. `None` removes it.
    pub fn set_trace(&mut self, f: Option<TraceFn>) {
        self.trace_fn = f;
    }

    pub fn set_user_ctx(&mut self, ctx: Box<dyn Any>) {
        self.user_ctx = Some(ctx);
    }

    pub fn user_ctx<T: 'static>(&mut self) -> Option<&mut T> {
        self.user_ctx.as_mut().and_then(|c| c.downcast_mut::<T>())
    }

    // =========================================================================
    // Names
    // =========================================================================

    #[inline]
    pub fn intern(&mut self, text: &str) -> Name {
        self.names.intern(text)
    }

    /// Panics for a name this context never produced.
    #[inline]
    pub fn name_to_str(&self, name: Name) -> &str {
        match self.names.resolve(name) {
            Some(s) => s,
            None => panic!("unknown name {name:?}"),
        }
    }

    /// Global ref to the cached `str` object for `name`.
    pub fn name_to_ref(&mut self, name: Name) -> GlobalRef {
        self.name_str(name);
        GlobalRef::NameStr(name)
    }

    /// Cached `str` value for `name`, created on first use.
    pub(crate) fn name_str(&mut self, name: Name) -> Value {
        if let Some(r) = self.name_strs.get(&name) {
            return Value::Object(*r);
        }
        let text = self.name_to_str(name).to_owned();
        let v = self.alloc_str(&text);
        if let Value::Object(r) = v {
            self.name_strs.insert(name, r);
        }
        v
    }

    // =========================================================================
    // Operand stack
    // =========================================================================

    /// Current stack depth.
    #[inline]
    pub fn sp(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn push(&mut self, v: Value) {
        assert!(self.stack.len() < self.config.stack_size, "operand stack overflow");
        self.stack.push(v);
    }

    #[inline]
    pub fn push_nil(&mut self) {
        self.push(Value::Nil);
    }

    #[inline]
    pub fn push_none(&mut self) {
        self.push(Value::None);
    }

    /// Pushes a keyword name as used in the vectorcall keyword pairs.
    #[inline]
    pub fn push_name(&mut self, name: Name) {
        self.push(Value::Int(name.raw() as i64));
    }

    /// Pushes a nil placeholder and returns its slot.
    #[inline]
    pub fn push_tmp(&mut self) -> StackRef {
        self.push(Value::Nil);
        StackRef::new(self.stack.len() - 1)
    }

    #[inline]
    pub fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    /// Pops `n` values.
    #[inline]
    pub fn shrink(&mut self, n: usize) {
        assert!(n <= self.stack.len(), "operand stack underflow");
        self.stack.truncate(self.stack.len() - n);
    }

    /// Slot `i` counted from the top; `peek(-1)` is the top of stack.
    #[inline]
    pub fn peek(&self, i: isize) -> StackRef {
        assert!(i < 0 && i.unsigned_abs() <= self.stack.len(), "peek({i}) outside the stack");
        StackRef::new(self.stack.len() - i.unsigned_abs())
    }

    /// Argument `i` of a native call window.
    #[inline]
    pub fn arg(&self, argv: StackRef, i: usize) -> Value {
        self.stack[argv.index() + i]
    }

    // =========================================================================
    // Registers and return slot
    // =========================================================================

    /// Register `r{i}`.
    #[inline]
    pub fn reg(&self, i: u8) -> GlobalRef {
        assert!((i as usize) < REGISTER_COUNT, "register r{i} does not exist");
        GlobalRef::Register(i)
    }

    #[inline]
    pub fn retval(&self) -> Value {
        self.retval
    }

    #[inline]
    pub fn retval_ref(&self) -> GlobalRef {
        GlobalRef::Retval
    }

    #[inline]
    pub fn set_retval(&mut self, v: Value) {
        self.retval = v;
    }

    // =========================================================================
    // Reference access
    // =========================================================================

    /// Reads through a reference. Panics on misuse (stale stack slot,
    /// invalidated item, collected object).
    pub fn get(&self, r: impl Into<Ref>) -> Value {
        match self.try_get(r) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    /// Writes through a reference. Panics on misuse.
    pub fn set(&mut self, r: impl Into<Ref>, v: Value) {
        if let Err(e) = self.try_set(r, v) {
            panic!("{e}");
        }
    }

    pub fn try_get(&self, r: impl Into<Ref>) -> Result<Value, RefError> {
        match r.into() {
            Ref::Global(g) => Ok(match g {
                GlobalRef::Register(i) => *self
                    .registers
                    .get(i as usize)
                    .ok_or(RefError::NoSuchRegister(i))?,
                GlobalRef::Retval => self.retval,
                GlobalRef::Magic(t, m) => self.types.get(t).magic(m),
                GlobalRef::NameStr(n) => self.name_strs.get(&n).map_or(Value::Nil, |r| Value::Object(*r)),
                GlobalRef::Const(v) => v,
            }),
            Ref::Object(o) => {
                let obj = self.heap.try_get(o.owner)?;
                obj.slots
                    .get(o.slot)
                    .copied()
                    .ok_or(RefError::SlotOutOfRange { slot: o.slot, len: obj.slots.len() })
            }
            Ref::Stack(s) => self
                .stack
                .get(s.index())
                .copied()
                .ok_or(RefError::StaleStack { index: s.index(), depth: self.stack.len() }),
            Ref::Item(item) => self.read_item(item),
        }
    }

    pub fn try_set(&mut self, r: impl Into<Ref>, v: Value) -> Result<(), RefError> {
        match r.into() {
            Ref::Global(g) => match g {
                GlobalRef::Register(i) => {
                    *self.registers.get_mut(i as usize).ok_or(RefError::NoSuchRegister(i))? = v;
                }
                GlobalRef::Retval => self.retval = v,
                GlobalRef::Magic(t, m) => self.types.get_mut(t).magic[m.index()] = v,
                GlobalRef::NameStr(_) | GlobalRef::Const(_) => return Err(RefError::ReadOnly),
            },
            Ref::Object(o) => {
                let obj = self.heap.try_get_mut(o.owner)?;
                let len = obj.slots.len();
                *obj.slots.get_mut(o.slot).ok_or(RefError::SlotOutOfRange { slot: o.slot, len })? = v;
            }
            Ref::Stack(s) => {
                let depth = self.stack.len();
                *self
                    .stack
                    .get_mut(s.index())
                    .ok_or(RefError::StaleStack { index: s.index(), depth })? = v;
            }
            Ref::Item(item) => *self.item_slot(item)? = v,
        }
        Ok(())
    }

    fn read_item(&self, item: ItemRef) -> Result<Value, RefError> {
        let obj = self.heap.try_get(item.owner)?;
        match item.kind {
            ItemKind::ListItem => {
                let list = obj.as_list().ok_or(RefError::WrongContainer)?;
                if list.epoch() != item.epoch {
                    return Err(RefError::InvalidatedItem);
                }
                list.items
                    .get(item.index)
                    .copied()
                    .ok_or(RefError::ItemOutOfRange { index: item.index, len: list.items.len() })
            }
            ItemKind::DictValue => {
                let dict = obj.as_dict().ok_or(RefError::WrongContainer)?;
                if dict.epoch() != item.epoch {
                    return Err(RefError::InvalidatedItem);
                }
                dict.entry(item.index).map(|e| e.val).ok_or(RefError::InvalidatedItem)
            }
            ItemKind::AttrValue => {
                let dict = obj.dict.as_ref().ok_or(RefError::WrongContainer)?;
                if dict.epoch() != item.epoch {
                    return Err(RefError::InvalidatedItem);
                }
                dict.get_index(item.index).map(|(_, v)| v).ok_or(RefError::InvalidatedItem)
            }
        }
    }

    fn item_slot(&mut self, item: ItemRef) -> Result<&mut Value, RefError> {
        let obj = self.heap.try_get_mut(item.owner)?;
        match item.kind {
            ItemKind::ListItem => {
                let list = obj.as_list_mut().ok_or(RefError::WrongContainer)?;
                if list.epoch() != item.epoch {
                    return Err(RefError::InvalidatedItem);
                }
                let len = list.items.len();
                list.items
                    .get_mut(item.index)
                    .ok_or(RefError::ItemOutOfRange { index: item.index, len })
            }
            ItemKind::DictValue => {
                let dict = obj.as_dict_mut().ok_or(RefError::WrongContainer)?;
                if dict.epoch() != item.epoch {
                    return Err(RefError::InvalidatedItem);
                }
                dict.value_mut(item.index).ok_or(RefError::InvalidatedItem)
            }
            ItemKind::AttrValue => {
                let dict = obj.dict.as_mut().ok_or(RefError::WrongContainer)?;
                if dict.epoch() != item.epoch {
                    return Err(RefError::InvalidatedItem);
                }
                dict.value_at_mut(item.index).ok_or(RefError::InvalidatedItem)
            }
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Moves `obj` to the heap, collecting first if the threshold was
    /// crossed. References held by `obj` itself are kept alive.
    ///
    /// Containers growing in place are charged to the same counter, so the
    /// cycle they owe runs here at the next allocation.
    pub(crate) fn alloc(&mut self, obj: Object) -> GcRef {
        if self.heap.should_collect() {
            let heap = &mut self.heap;
            obj.trace(&mut |r| heap.mark_gray(r));
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    #[inline]
    pub(crate) fn object(&self, r: GcRef) -> &Object {
        self.heap.get(r)
    }

    #[inline]
    pub(crate) fn object_mut(&mut self, r: GcRef) -> &mut Object {
        self.heap.get_mut(r)
    }

    /// Runs `f` with collection suppressed, for code that holds fresh
    /// objects only in Rust locals.
    pub fn with_gc_paused<R>(&mut self, f: impl FnOnce(&mut Vm) -> R) -> R {
        self.heap.pause_gc();
        let r = f(self);
        self.heap.resume_gc();
        r
    }

    /// Forces a collection cycle. Returns the number of objects freed.
    pub fn gc_collect(&mut self) -> usize {
        self.collect_garbage()
    }

    // =========================================================================
    // Frames
    // =========================================================================

    #[inline]
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    #[inline]
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn fire_trace(&mut self, event: crate::frame::TraceEvent) {
        if let (Some(f), Some(frame)) = (self.trace_fn.as_mut(), self.frames.last()) {
            f(event, frame);
        }
    }

    pub(crate) fn payload_of(&self, v: Value) -> Option<&ObjectData> {
        v.as_object().map(|r| &self.object(r).data)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        let types = &self.types;
        let freed = self.heap.finalize_all(|obj| crate::gc_roots::finalize_object(types, obj));
        log::debug!("context torn down: {freed} objects finalized");
    }
}
