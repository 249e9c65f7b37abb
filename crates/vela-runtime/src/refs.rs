//! Reference roles.
//!
//! Native code never holds a bare pointer to a value slot. It holds one of the
//! role types below, each of which carries enough information to detect use
//! outside its lifetime:
//!
//! | role        | valid while                                            |
//! |-------------|--------------------------------------------------------|
//! | `GlobalRef` | the context lives                                      |
//! | `ObjectRef` | the owning object is reachable (generation check)      |
//! | `StackRef`  | the stack is at least `index + 1` deep                 |
//! | `ItemRef`   | the container's structural epoch is unchanged          |
//! | `OutRef`    | chosen by the caller; any writable location            |

use crate::gc::GcRef;
use crate::value::Value;
use vela_common_core::{Magic, Name, TypeId};

/// Context-lifetime locations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GlobalRef {
    /// Scratch register `r0..r7`.
    Register(u8),
    /// The return slot written by every call.
    Retval,
    /// A type's own magic slot (may hold nil).
    Magic(TypeId, Magic),
    /// Cached `str` object for an interned name.
    NameStr(Name),
    /// Read-only constant (`True`, `False`, `None`, nil, type objects).
    Const(Value),
}

impl GlobalRef {
    pub const TRUE: GlobalRef = GlobalRef::Const(Value::TRUE);
    pub const FALSE: GlobalRef = GlobalRef::Const(Value::FALSE);
    pub const NONE: GlobalRef = GlobalRef::Const(Value::None);
    pub const NIL: GlobalRef = GlobalRef::Const(Value::Nil);
}

/// Fixed slot `slot` of a heap object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub owner: GcRef,
    pub slot: usize,
}

impl ObjectRef {
    #[inline]
    pub fn new(owner: GcRef, slot: usize) -> Self {
        Self { owner, slot }
    }
}

/// Absolute index into the operand stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackRef(usize);

impl StackRef {
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    /// The slot `n` positions above this one.
    #[inline]
    pub const fn offset(self, n: usize) -> Self {
        Self(self.0 + n)
    }
}

/// Which backing storage an `ItemRef` points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    ListItem,
    DictValue,
    AttrValue,
}

/// A slot in a container's backing storage, stamped with the container's
/// structural epoch at the time it was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemRef {
    pub owner: GcRef,
    pub kind: ItemKind,
    pub index: usize,
    pub epoch: u32,
}

/// Any location a value can be read from or written to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Ref {
    Global(GlobalRef),
    Object(ObjectRef),
    Stack(StackRef),
    Item(ItemRef),
}

/// Caller-supplied destination for a constructor or operation result.
///
/// An out ref is any writable `Ref`; the slot stays owned by the caller.
pub type OutRef = Ref;

impl From<GlobalRef> for Ref {
    #[inline]
    fn from(r: GlobalRef) -> Self {
        Ref::Global(r)
    }
}

impl From<ObjectRef> for Ref {
    #[inline]
    fn from(r: ObjectRef) -> Self {
        Ref::Object(r)
    }
}

impl From<StackRef> for Ref {
    #[inline]
    fn from(r: StackRef) -> Self {
        Ref::Stack(r)
    }
}

impl From<ItemRef> for Ref {
    #[inline]
    fn from(r: ItemRef) -> Self {
        Ref::Item(r)
    }
}
