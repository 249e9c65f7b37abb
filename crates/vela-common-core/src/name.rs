//! Name interning.
//!
//! `Name` is a `u16` handle for identifier text. Raw value `0` is reserved as
//! the null name; raw values `1..=Magic::COUNT` are the magic names, which a
//! `NameTable` interns first so they are identical in every context.
//!
//! `Name` is `no_std` compatible. `NameTable` requires the `std` feature.

use core::fmt;

use crate::magic::Magic;

#[cfg(feature = "std")]
use string_interner::{backend::StringBackend, DefaultSymbol, StringInterner};

/// An interned identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(u16);

impl Name {
    /// The reserved null name. Never returned by `NameTable::intern`.
    pub const NULL: Name = Name(0);

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Constant-time test against the reserved magic block.
    #[inline]
    pub const fn is_magic(self) -> bool {
        self.0 >= 1 && self.0 as usize <= Magic::COUNT
    }

    /// The magic this name denotes, if any.
    #[inline]
    pub fn as_magic(self) -> Option<Magic> {
        if self.is_magic() {
            Magic::try_from(self.0).ok()
        } else {
            None
        }
    }
}

impl From<Magic> for Name {
    #[inline]
    fn from(m: Magic) -> Self {
        Name(m as u16)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_magic() {
            Some(m) => write!(f, "Name({})", m.as_str()),
            None => write!(f, "Name({})", self.0),
        }
    }
}

/// Per-context identifier table.
///
/// Interning is idempotent and never reuses a value for different text.
/// Reverse lookup is O(1).
#[cfg(feature = "std")]
#[derive(Clone)]
pub struct NameTable {
    interner: StringInterner<StringBackend<DefaultSymbol>>,
}

#[cfg(feature = "std")]
impl NameTable {
    /// Upper bound on distinct names per context.
    pub const MAX_NAMES: usize = u16::MAX as usize;

    /// Creates a table with the magic block already interned.
    pub fn new() -> Self {
        let mut table = Self {
            interner: StringInterner::with_capacity(256),
        };
        for m in Magic::ALL {
            let name = table.intern(m.as_str());
            debug_assert_eq!(name, Name::from(m));
        }
        table
    }

    /// Interns `text`, returning its name.
    ///
    /// Panics when the table exceeds `MAX_NAMES` distinct names.
    #[inline]
    pub fn intern(&mut self, text: &str) -> Name {
        use string_interner::Symbol as _;
        if let Some(name) = self.get(text) {
            return name;
        }
        assert!(self.interner.len() < Self::MAX_NAMES, "name table exhausted");
        Name((self.interner.get_or_intern(text).to_usize() + 1) as u16)
    }

    /// Looks up a name without interning it.
    #[inline]
    pub fn get(&self, text: &str) -> Option<Name> {
        use string_interner::Symbol as _;
        self.interner.get(text).map(|s| Name((s.to_usize() + 1) as u16))
    }

    /// Resolves a name to its text.
    ///
    /// Returns `None` for the null name or a name this table never produced.
    #[inline]
    pub fn resolve(&self, name: Name) -> Option<&str> {
        use string_interner::Symbol as _;
        if name.is_null() {
            return None;
        }
        DefaultSymbol::try_from_usize(name.0 as usize - 1).and_then(|s| self.interner.resolve(s))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.interner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }
}

#[cfg(feature = "std")]
impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl fmt::Debug for NameTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameTable")
            .field("len", &self.interner.len())
            .finish()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_magic_block_is_fixed() {
        let table = NameTable::new();
        assert_eq!(table.len(), Magic::COUNT);
        for m in Magic::ALL {
            let name = Name::from(m);
            assert!(name.is_magic());
            assert_eq!(table.resolve(name), Some(m.as_str()));
            assert_eq!(name.as_magic(), Some(m));
        }
    }

    #[test]
    fn test_full_table_rejects_new_names_only() {
        let mut table = NameTable::new();
        for i in table.len()..NameTable::MAX_NAMES {
            table.intern(&format!("n{i}"));
        }
        assert_eq!(table.len(), NameTable::MAX_NAMES);
        let last = table.intern(&format!("n{}", NameTable::MAX_NAMES - 1));
        assert_eq!(last.raw() as usize, NameTable::MAX_NAMES);

        let overflow = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| table.intern("one more")));
        assert!(overflow.is_err());
        assert_eq!(table.len(), NameTable::MAX_NAMES);
        assert_eq!(table.get("one more"), None);
    }

    #[test]
    fn test_intern_roundtrip() {
        let mut table = NameTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        let c = table.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_magic());
        assert_eq!(table.resolve(a), Some("foo"));
        let text = table.resolve(c).unwrap().to_owned();
        assert_eq!(table.intern(&text), c);
    }

    #[test]
    fn test_embedded_nul() {
        let mut table = NameTable::new();
        let n = table.intern("a\0b");
        assert_ne!(n, table.intern("a"));
        assert_eq!(table.resolve(n), Some("a\0b"));
    }

    #[test]
    fn test_magic_text_interns_to_magic() {
        let mut table = NameTable::new();
        assert_eq!(table.intern("__add__"), Name::from(Magic::Add));
        assert_eq!(table.get("__missing__"), Some(Name::from(Magic::Missing)));
        assert_eq!(table.get("not_there"), None);
        assert_eq!(table.resolve(Name::NULL), None);
    }
}
