//! Value constructors, accessors and type predicates.
//!
//! Public constructors write into a caller-supplied out ref. The crate-local
//! `alloc_*` helpers return the fresh value instead; the caller must root it
//! (stack, register, container) before allocating again.

use core::any::Any;
use std::fmt;

use vela_common_core::{Magic, Name, TypeId};
use vela_runtime::{
    value::is_identical, Dict, GcRef, GlobalRef, List, Object, ObjectData, ObjectRef, OutRef, SeqIter, IterMode, Value,
};

use crate::error::PyResult;
use crate::native::NativeFn;
use crate::types::{Dtor, Layout};
use crate::vm::Vm;

impl Vm {
    // =========================================================================
    // Crate-local allocation helpers
    // =========================================================================

    pub(crate) fn alloc_str(&mut self, s: &str) -> Value {
        Value::Object(self.alloc(Object::new(TypeId::STR, ObjectData::Str(s.to_owned()))))
    }

    pub(crate) fn alloc_string(&mut self, s: String) -> Value {
        Value::Object(self.alloc(Object::new(TypeId::STR, ObjectData::Str(s))))
    }

    pub(crate) fn alloc_list(&mut self, items: Vec<Value>) -> Value {
        Value::Object(self.alloc(Object::new(TypeId::LIST, ObjectData::List(List::from_vec(items)))))
    }

    pub(crate) fn alloc_tuple(&mut self, items: &[Value]) -> Value {
        let mut obj = Object::with_slots(TypeId::TUPLE, items.len(), ObjectData::Plain);
        obj.slots.copy_from_slice(items);
        Value::Object(self.alloc(obj))
    }

    pub(crate) fn alloc_dict(&mut self) -> Value {
        Value::Object(self.alloc(Object::new(TypeId::DICT, ObjectData::Dict(Dict::new()))))
    }

    pub(crate) fn alloc_bytes(&mut self, bytes: Vec<u8>) -> Value {
        Value::Object(self.alloc(Object::new(TypeId::BYTES, ObjectData::Bytes(bytes))))
    }

    pub(crate) fn alloc_iter(&mut self, ty: TypeId, target: Value, mode: IterMode) -> Value {
        let it = SeqIter { target, index: 0, mode };
        Value::Object(self.alloc(Object::new(ty, ObjectData::Iter(it))))
    }

    pub(crate) fn alloc_with_slots(&mut self, ty: TypeId, slots: &[Value]) -> Value {
        let mut obj = Object::with_slots(ty, slots.len(), ObjectData::Plain);
        obj.slots.copy_from_slice(slots);
        Value::Object(self.alloc(obj))
    }

    /// Instance of `ty` with the type's default layout.
    pub(crate) fn alloc_instance(&mut self, ty: TypeId) -> Value {
        if self.types.is_subclass(ty, TypeId::BASE_EXCEPTION) {
            return self.alloc_exception(ty, Value::None);
        }
        let obj = match self.types.get(ty).layout {
            Layout::Dict => Object::with_dict(ty, ObjectData::Plain),
            Layout::Fixed(n) => Object::with_slots(ty, n, ObjectData::Plain),
        };
        Value::Object(self.alloc(obj))
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn new_int(&mut self, out: impl Into<OutRef>, i: i64) {
        self.set(out, Value::Int(i));
    }

    pub fn new_float(&mut self, out: impl Into<OutRef>, f: f64) {
        self.set(out, Value::Float(f));
    }

    pub fn new_bool(&mut self, out: impl Into<OutRef>, b: bool) {
        self.set(out, Value::Bool(b));
    }

    pub fn new_none(&mut self, out: impl Into<OutRef>) {
        self.set(out, Value::None);
    }

    pub fn new_not_implemented(&mut self, out: impl Into<OutRef>) {
        self.set(out, Value::NotImplemented);
    }

    pub fn new_ellipsis(&mut self, out: impl Into<OutRef>) {
        self.set(out, Value::Ellipsis);
    }

    pub fn new_nil(&mut self, out: impl Into<OutRef>) {
        self.set(out, Value::Nil);
    }

    /// New `str`. Embedded NULs are preserved.
    pub fn new_str(&mut self, out: impl Into<OutRef>, s: &str) -> GcRef {
        let v = self.alloc_str(s);
        self.set(out, v);
        v.as_object().expect("str is a heap object")
    }

    /// New `str` from the first `n` bytes of `s`. A cut inside a character
    /// drops that character; `n` past the end takes all of `s`.
    pub fn new_strn(&mut self, out: impl Into<OutRef>, s: &str, n: usize) -> GcRef {
        let mut end = n.min(s.len());
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.new_str(out, &s[..end])
    }

    /// New `str` from raw bytes; embedded NULs are kept and invalid UTF-8
    /// is replaced.
    pub fn new_strv(&mut self, out: impl Into<OutRef>, bytes: &[u8]) -> GcRef {
        let v = self.alloc_string(String::from_utf8_lossy(bytes).into_owned());
        self.set(out, v);
        v.as_object().expect("str is a heap object")
    }

    pub fn new_fstr(&mut self, out: impl Into<OutRef>, args: fmt::Arguments<'_>) -> GcRef {
        let v = self.alloc_string(fmt::format(args));
        self.set(out, v);
        v.as_object().expect("str is a heap object")
    }

    /// New zero-filled `bytes` of length `n`; fill it with `bytes_mut`.
    pub fn new_bytes(&mut self, out: impl Into<OutRef>, n: usize) -> GcRef {
        let v = self.alloc_bytes(vec![0; n]);
        self.set(out, v);
        v.as_object().expect("bytes is a heap object")
    }

    /// New tuple of `n` nil slots, to be filled with `tuple_setitem`.
    pub fn new_tuple(&mut self, out: impl Into<OutRef>, n: usize) -> GcRef {
        let r = self.alloc(Object::with_slots(TypeId::TUPLE, n, ObjectData::Plain));
        self.set(out, Value::Object(r));
        r
    }

    pub fn new_list(&mut self, out: impl Into<OutRef>) -> GcRef {
        self.new_listn(out, 0)
    }

    /// New list of `n` nil items, to be filled with `list_setitem`.
    pub fn new_listn(&mut self, out: impl Into<OutRef>, n: usize) -> GcRef {
        let v = self.alloc_list(vec![Value::Nil; n]);
        self.set(out, v);
        v.as_object().expect("list is a heap object")
    }

    pub fn new_dict(&mut self, out: impl Into<OutRef>) -> GcRef {
        let v = self.alloc_dict();
        self.set(out, v);
        v.as_object().expect("dict is a heap object")
    }

    /// New slice with nil `start`, `stop`, `step` slots (slots 0, 1, 2).
    pub fn new_slice(&mut self, out: impl Into<OutRef>) -> GcRef {
        let r = self.alloc(Object::with_slots(TypeId::SLICE, 3, ObjectData::Plain));
        self.set(out, Value::Object(r));
        r
    }

    pub fn new_native_func(&mut self, out: impl Into<OutRef>, f: NativeFn) {
        let id = self.natives.register(f);
        self.set(out, Value::NativeFunc(id));
    }

    pub fn new_bound_method(&mut self, out: impl Into<OutRef>, receiver: Value, func: Value) -> GcRef {
        let v = self.alloc_with_slots(TypeId::BOUNDMETHOD, &[receiver, func]);
        self.set(out, v);
        v.as_object().expect("boundmethod is a heap object")
    }

    /// New instance of `ty` with an explicit layout and optional user
    /// payload. The payload is finalized by the type's destructor.
    pub fn new_object(
        &mut self,
        out: impl Into<OutRef>,
        ty: TypeId,
        layout: Layout,
        userdata: Option<Box<dyn Any>>,
    ) -> GcRef {
        let data = match userdata {
            Some(b) => ObjectData::User(b),
            None => ObjectData::Plain,
        };
        let obj = match layout {
            Layout::Dict => Object::with_dict(ty, data),
            Layout::Fixed(n) => Object::with_slots(ty, n, data),
        };
        let r = self.alloc(obj);
        self.set(out, Value::Object(r));
        r
    }

    // =========================================================================
    // Accessors (hard-assert) and casts (raise TypeError)
    // =========================================================================

    /// Panics unless `v` is an int or bool.
    pub fn to_int(&self, v: Value) -> i64 {
        match v.as_int() {
            Some(i) => i,
            None => panic!("expected int, got {}", self.type_name(self.type_of(v))),
        }
    }

    /// Panics unless `v` is a float.
    pub fn to_float(&self, v: Value) -> f64 {
        match v {
            Value::Float(f) => f,
            _ => panic!("expected float, got {}", self.type_name(self.type_of(v))),
        }
    }

    /// Panics unless `v` is a bool.
    pub fn to_bool(&self, v: Value) -> bool {
        match v {
            Value::Bool(b) => b,
            _ => panic!("expected bool, got {}", self.type_name(self.type_of(v))),
        }
    }

    /// Panics unless `v` is a type object.
    pub fn to_type(&self, v: Value) -> TypeId {
        match v {
            Value::Type(t) => t,
            _ => panic!("expected type, got {}", self.type_name(self.type_of(v))),
        }
    }

    /// Panics unless `v` is a str.
    pub fn to_str(&self, v: Value) -> &str {
        match self.payload_of(v) {
            Some(ObjectData::Str(s)) => s,
            _ => panic!("expected str, got {}", self.type_name(self.type_of(v))),
        }
    }

    /// Panics unless `v` is bytes.
    pub fn to_bytes(&self, v: Value) -> &[u8] {
        match self.payload_of(v) {
            Some(ObjectData::Bytes(b)) => b,
            _ => panic!("expected bytes, got {}", self.type_name(self.type_of(v))),
        }
    }

    pub fn bytes_mut(&mut self, v: Value) -> &mut [u8] {
        let r = v.as_object().expect("expected bytes");
        match &mut self.object_mut(r).data {
            ObjectData::Bytes(b) => b,
            _ => panic!("expected bytes"),
        }
    }

    /// Shrinks a bytes buffer in place. Panics if `n` is larger than the
    /// current length.
    pub fn bytes_resize(&mut self, v: Value, n: usize) {
        let r = v.as_object().expect("expected bytes");
        match &mut self.object_mut(r).data {
            ObjectData::Bytes(b) => {
                assert!(n <= b.len(), "bytes can only shrink ({} -> {n})", b.len());
                b.truncate(n);
            }
            _ => panic!("expected bytes"),
        }
    }

    /// Panics unless `v` carries a `T` payload.
    pub fn userdata<T: 'static>(&self, v: Value) -> &T {
        match self.payload_of(v) {
            Some(ObjectData::User(b)) => b.downcast_ref::<T>().expect("userdata has a different type"),
            _ => panic!("object has no userdata"),
        }
    }

    /// Panics unless `v` carries a `T` payload.
    pub fn userdata_mut<T: 'static>(&mut self, v: Value) -> &mut T {
        let r = v.as_object().expect("object has no userdata");
        match &mut self.object_mut(r).data {
            ObjectData::User(b) => b.downcast_mut::<T>().expect("userdata has a different type"),
            _ => panic!("object has no userdata"),
        }
    }

    pub fn cast_int(&mut self, v: Value) -> PyResult<i64> {
        match v.as_int() {
            Some(i) => Ok(i),
            None => Err(self.type_error(format!("expected 'int', got '{}'", self.type_name_of(v)))),
        }
    }

    /// Int, bool or float as f64.
    pub fn cast_float(&mut self, v: Value) -> PyResult<f64> {
        match v.as_number() {
            Some(f) => Ok(f),
            None => Err(self.type_error(format!(
                "expected 'int' or 'float', got '{}'",
                self.type_name_of(v)
            ))),
        }
    }

    pub fn cast_float32(&mut self, v: Value) -> PyResult<f32> {
        self.cast_float(v).map(|f| f as f32)
    }

    // =========================================================================
    // Type predicates
    // =========================================================================

    pub fn type_of(&self, v: Value) -> TypeId {
        match v {
            Value::Object(r) => self.object(r).ty,
            other => other.inline_type().unwrap_or(TypeId::NIL),
        }
    }

    /// Exact type test.
    #[inline]
    pub fn is_type(&self, v: Value, t: TypeId) -> bool {
        self.type_of(v) == t
    }

    #[inline]
    pub fn is_instance(&self, v: Value, t: TypeId) -> bool {
        self.types.is_subclass(self.type_of(v), t)
    }

    #[inline]
    pub fn is_subclass(&self, derived: TypeId, base: TypeId) -> bool {
        self.types.is_subclass(derived, base)
    }

    #[inline]
    pub fn is_identical(&self, a: Value, b: Value) -> bool {
        is_identical(a, b)
    }

    pub fn check_type(&mut self, v: Value, t: TypeId) -> PyResult {
        if self.is_type(v, t) {
            return Ok(());
        }
        Err(self.type_error(format!(
            "expected '{}', got '{}'",
            self.type_name(t),
            self.type_name_of(v)
        )))
    }

    pub fn check_instance(&mut self, v: Value, t: TypeId) -> PyResult {
        if self.is_instance(v, t) {
            return Ok(());
        }
        Err(self.type_error(format!(
            "expected '{}' or a subclass, got '{}'",
            self.type_name(t),
            self.type_name_of(v)
        )))
    }

    pub fn type_name(&self, t: TypeId) -> &str {
        self.name_to_str(self.types.get(t).name)
    }

    pub fn type_name_of(&self, v: Value) -> &str {
        self.type_name(self.type_of(v))
    }

    // =========================================================================
    // Type registry
    // =========================================================================

    /// Registers a new type deriving from `base`. With a module, the type is
    /// also bound as a module attribute.
    pub fn new_type(&mut self, name: &str, base: TypeId, module: Option<GcRef>, dtor: Option<Dtor>) -> TypeId {
        let n = self.intern(name);
        let t = self.types.register(n, base, module, dtor);
        if let Some(m) = module {
            self.setdict(Value::Object(m), n, Value::Type(t));
        }
        t
    }

    /// The magic slot defined on `t` itself (may hold nil).
    #[inline]
    pub fn tp_get_magic(&self, t: TypeId, m: Magic) -> GlobalRef {
        GlobalRef::Magic(t, m)
    }

    /// Magic method of `t` or its nearest base.
    #[inline]
    pub fn tp_find_magic(&self, t: TypeId, m: Magic) -> Option<Value> {
        self.types.find_magic(t, m)
    }

    /// Class attribute of `t` or its nearest base.
    #[inline]
    pub fn tp_find_name(&self, t: TypeId, name: Name) -> Option<Value> {
        self.types.find_attr(t, name)
    }

    #[inline]
    pub fn tp_object(&self, t: TypeId) -> GlobalRef {
        GlobalRef::Const(Value::Type(t))
    }

    #[inline]
    pub fn tp_name(&self, t: TypeId) -> Name {
        self.types.get(t).name
    }

    /// Calls the type object `t` with positional `args`.
    pub fn tp_call(&mut self, t: TypeId, args: &[Value]) -> PyResult<Value> {
        self.call(Value::Type(t), args)
    }

    /// Looks up a type bound as `name` in `module` (builtins when `None`).
    pub fn get_type(&self, module: Option<&str>, name: Name) -> Option<TypeId> {
        let m = self.get_module(module.unwrap_or("builtins"))?;
        match self.getdict(Value::Object(m), name)? {
            Value::Type(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn slot_ref(&self, v: Value, i: usize) -> ObjectRef {
        ObjectRef::new(v.as_object().expect("object has no slots"), i)
    }
}
