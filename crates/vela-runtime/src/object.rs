//! Heap object layout.
//!
//! Every heap object has a type, a fixed run of value slots, an optional
//! attribute dict and a payload. Tuples, slices, bound methods, properties
//! and static/class method wrappers keep their fields in `slots`; the other
//! builtin kinds carry a dedicated payload.

use core::any::Any;
use core::fmt;
use std::rc::Rc;

use vela_common_core::{Name, TypeId};

use crate::dict::Dict;
use crate::gc::GcRef;
use crate::namedict::NameDict;
use crate::value::{NativeId, Value};

/// A compiled unit handed out by the host executor.
#[derive(Clone)]
pub struct Code {
    pub filename: Rc<str>,
    pub inner: Rc<dyn Any>,
}

impl Code {
    pub fn new(filename: &str, inner: Rc<dyn Any>) -> Self {
        Self { filename: Rc::from(filename), inner }
    }

    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Code").field("filename", &self.filename).finish()
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Name,
    pub default: Option<Value>,
    /// Declared after `*args`; only fillable by keyword.
    pub kw_only: bool,
}

/// Body of a `function` object.
#[derive(Debug, Clone)]
pub enum FuncBody {
    /// Native body, called with the bound locals as its argument window.
    Native(NativeId),
    /// Interpreted body run by the host executor in a new frame.
    Code(Code),
}

/// Declared signature plus body.
///
/// Locals are laid out as `params`, then the `*args` tuple if declared, then
/// the `**kwargs` dict if declared.
#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: Name,
    pub params: Vec<Param>,
    pub star_args: Option<Name>,
    pub star_kwargs: Option<Name>,
    pub doc: Option<String>,
    pub body: FuncBody,
}

impl FuncDecl {
    pub fn local_count(&self) -> usize {
        self.params.len() + self.star_args.is_some() as usize + self.star_kwargs.is_some() as usize
    }

    /// Number of parameters fillable by position.
    pub fn positional_count(&self) -> usize {
        self.params.iter().take_while(|p| !p.kw_only).count()
    }

    pub fn local_names(&self) -> impl Iterator<Item = Name> + '_ {
        self.params
            .iter()
            .map(|p| p.name)
            .chain(self.star_args)
            .chain(self.star_kwargs)
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub decl: Rc<FuncDecl>,
    /// Module whose dict serves as globals.
    pub module: Option<GcRef>,
}

#[derive(Debug, Clone, Default)]
pub struct List {
    pub items: Vec<Value>,
    epoch: u32,
}

impl List {
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self { items, epoch: 0 }
    }

    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Record a structural change; outstanding item refs become stale.
    #[inline]
    pub fn touch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn push(&mut self, v: Value) {
        self.items.push(v);
        self.touch();
    }

    pub fn insert(&mut self, index: usize, v: Value) {
        self.items.insert(index, v);
        self.touch();
    }

    pub fn remove(&mut self, index: usize) -> Value {
        let v = self.items.remove(index);
        self.touch();
        v
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
    }

    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
        self.touch();
    }
}

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub path: String,
}

/// Exception payload. The message is `msg`; `cause` is the exception that
/// was current when this one was raised.
#[derive(Debug, Clone)]
pub struct ExcInfo {
    pub msg: Value,
    pub cause: Value,
    pub traceback: Vec<String>,
}

impl ExcInfo {
    pub fn new(msg: Value) -> Self {
        Self { msg, cause: Value::Nil, traceback: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterMode {
    /// list/tuple elements, dict keys, str characters
    Items,
    /// dict `(key, value)` pairs
    Pairs,
}

/// Cursor over a sequence, dict or str. `index` is a raw position (byte
/// offset for str, raw entry index for dict).
#[derive(Debug, Clone)]
pub struct SeqIter {
    pub target: Value,
    pub index: usize,
    pub mode: IterMode,
}

pub enum ObjectData {
    Plain,
    Str(String),
    Bytes(Vec<u8>),
    List(List),
    Dict(Dict),
    Function(Function),
    Module(ModuleInfo),
    Exception(ExcInfo),
    Code(Code),
    Iter(SeqIter),
    Range { start: i64, stop: i64, step: i64 },
    RangeIter { current: i64, stop: i64, step: i64 },
    User(Box<dyn Any>),
}

impl ObjectData {
    fn kind(&self) -> &'static str {
        match self {
            ObjectData::Plain => "Plain",
            ObjectData::Str(_) => "Str",
            ObjectData::Bytes(_) => "Bytes",
            ObjectData::List(_) => "List",
            ObjectData::Dict(_) => "Dict",
            ObjectData::Function(_) => "Function",
            ObjectData::Module(_) => "Module",
            ObjectData::Exception(_) => "Exception",
            ObjectData::Code(_) => "Code",
            ObjectData::Iter(_) => "Iter",
            ObjectData::Range { .. } => "Range",
            ObjectData::RangeIter { .. } => "RangeIter",
            ObjectData::User(_) => "User",
        }
    }

    /// Bytes owned outside the object header, for GC accounting.
    fn heap_size(&self) -> usize {
        let value = core::mem::size_of::<Value>();
        match self {
            ObjectData::Str(s) => s.capacity(),
            ObjectData::Bytes(b) => b.capacity(),
            ObjectData::List(l) => l.items.capacity() * value,
            ObjectData::Dict(d) => d.raw_len() * (value * 2 + 16),
            ObjectData::Exception(e) => e.traceback.iter().map(|s| s.capacity()).sum(),
            _ => 0,
        }
    }
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectData::Str(s) => write!(f, "Str({s:?})"),
            ObjectData::List(l) => write!(f, "List(len={})", l.items.len()),
            ObjectData::Dict(d) => write!(f, "Dict(len={})", d.len()),
            other => f.write_str(other.kind()),
        }
    }
}

#[derive(Debug)]
pub struct Object {
    pub ty: TypeId,
    pub slots: Box<[Value]>,
    pub dict: Option<NameDict>,
    pub data: ObjectData,
}

impl Object {
    pub fn new(ty: TypeId, data: ObjectData) -> Self {
        Self { ty, slots: Box::new([]), dict: None, data }
    }

    /// `n` nil-initialized slots.
    pub fn with_slots(ty: TypeId, n: usize, data: ObjectData) -> Self {
        Self { ty, slots: vec![Value::Nil; n].into_boxed_slice(), dict: None, data }
    }

    pub fn with_dict(ty: TypeId, data: ObjectData) -> Self {
        Self { ty, slots: Box::new([]), dict: Some(NameDict::new()), data }
    }

    /// Approximate footprint used by the collector's byte counter.
    pub fn size(&self) -> usize {
        let value = core::mem::size_of::<Value>();
        let dict = self.dict.as_ref().map_or(0, |d| d.len() * (value + 8));
        core::mem::size_of::<Object>() + self.slots.len() * value + dict + self.data.heap_size()
    }

    /// Calls `f` for every heap reference this object holds.
    pub fn trace(&self, f: &mut impl FnMut(GcRef)) {
        fn visit(v: &Value, f: &mut impl FnMut(GcRef)) {
            if let Value::Object(r) = v {
                f(*r);
            }
        }
        for v in self.slots.iter() {
            visit(v, f);
        }
        if let Some(d) = &self.dict {
            for v in d.values() {
                visit(v, f);
            }
        }
        match &self.data {
            ObjectData::List(l) => {
                for v in &l.items {
                    visit(v, f);
                }
            }
            ObjectData::Dict(d) => {
                for e in d.iter() {
                    visit(&e.key, f);
                    visit(&e.val, f);
                }
            }
            ObjectData::Function(func) => {
                if let Some(m) = func.module {
                    f(m);
                }
                for p in &func.decl.params {
                    if let Some(v) = &p.default {
                        visit(v, f);
                    }
                }
            }
            ObjectData::Exception(e) => {
                visit(&e.msg, f);
                visit(&e.cause, f);
            }
            ObjectData::Iter(it) => visit(&it.target, f),
            _ => {}
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ObjectData::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ObjectData::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match &self.data {
            ObjectData::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        match &mut self.data {
            ObjectData::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match &self.data {
            ObjectData::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match &mut self.data {
            ObjectData::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_exception(&self) -> Option<&ExcInfo> {
        match &self.data {
            ObjectData::Exception(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_exception_mut(&mut self) -> Option<&mut ExcInfo> {
        match &mut self.data {
            ObjectData::Exception(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match &self.data {
            ObjectData::Function(func) => Some(func),
            _ => None,
        }
    }
}
