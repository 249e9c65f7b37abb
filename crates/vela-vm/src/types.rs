//! Type registry.
//!
//! Types are records in a dense table indexed by `TypeId`. Builtins occupy
//! the first `TypeId::BUILTIN_COUNT` entries; user types are appended. Each
//! record holds one magic slot per magic name plus a class attribute dict,
//! and lookups walk the single-inheritance base chain.

use core::any::Any;

use vela_common_core::{Magic, Name, NameTable, TypeId, BUILTIN_TYPES};
use vela_runtime::{GcRef, NameDict, Value};

/// Finalizer for user payloads, run once when the object is swept.
pub type Dtor = fn(&mut dyn Any);

/// Default storage of instances created by `object.__new__`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// `n` direct value slots.
    Fixed(usize),
    /// An open attribute dict.
    Dict,
}

pub struct TypeRecord {
    pub id: TypeId,
    pub name: Name,
    pub base: Option<TypeId>,
    /// Owning module; `None` for builtins.
    pub module: Option<GcRef>,
    pub dtor: Option<Dtor>,
    /// Indexed by `Magic::index()`; nil when this type does not define it.
    pub magic: Box<[Value]>,
    pub attrs: NameDict,
    pub layout: Layout,
    pub sealed: bool,
}

impl TypeRecord {
    fn new(id: TypeId, name: Name, base: Option<TypeId>, layout: Layout, sealed: bool) -> Self {
        Self {
            id,
            name,
            base,
            module: None,
            dtor: None,
            magic: vec![Value::Nil; Magic::COUNT + 1].into_boxed_slice(),
            attrs: NameDict::new(),
            layout,
            sealed,
        }
    }

    #[inline]
    pub fn magic(&self, m: Magic) -> Value {
        self.magic[m.index()]
    }
}

fn is_builtin_exception(mut t: TypeId) -> bool {
    while t != TypeId::NIL {
        if t == TypeId::BASE_EXCEPTION {
            return true;
        }
        t = BUILTIN_TYPES[t.index()].base;
    }
    false
}

pub struct TypeRegistry {
    types: Vec<TypeRecord>,
}

impl TypeRegistry {
    /// Registers every builtin type.
    pub fn new(names: &mut NameTable) -> Self {
        let mut types = Vec::with_capacity(TypeId::BUILTIN_COUNT + 16);
        for b in BUILTIN_TYPES.iter() {
            let base = (b.base != TypeId::NIL).then_some(b.base);
            let layout = if b.id == TypeId::OBJECT || is_builtin_exception(b.id) {
                Layout::Dict
            } else {
                Layout::Fixed(0)
            };
            types.push(TypeRecord::new(b.id, names.intern(b.name), base, layout, b.sealed));
        }
        Self { types }
    }

    /// Appends a user type deriving from `base`.
    ///
    /// Panics if `base` is sealed.
    pub fn register(&mut self, name: Name, base: TypeId, module: Option<GcRef>, dtor: Option<Dtor>) -> TypeId {
        let base_rec = self.get(base);
        assert!(!base_rec.sealed, "type {:?} is not an acceptable base type", base);
        let layout = base_rec.layout;
        let id = TypeId(self.types.len() as u16);
        let mut rec = TypeRecord::new(id, name, Some(base), layout, false);
        rec.module = module;
        rec.dtor = dtor;
        self.types.push(rec);
        id
    }

    #[inline]
    pub fn get(&self, t: TypeId) -> &TypeRecord {
        &self.types[t.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, t: TypeId) -> &mut TypeRecord {
        &mut self.types[t.index()]
    }

    #[inline]
    pub fn contains(&self, t: TypeId) -> bool {
        t.index() < self.types.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeRecord> + '_ {
        self.types.iter()
    }

    /// `t` followed by each of its bases.
    pub fn chain(&self, t: TypeId) -> impl Iterator<Item = &TypeRecord> + '_ {
        let mut next = Some(t);
        core::iter::from_fn(move || {
            let rec = self.get(next?);
            next = rec.base;
            Some(rec)
        })
    }

    pub fn is_subclass(&self, derived: TypeId, base: TypeId) -> bool {
        self.chain(derived).any(|r| r.id == base)
    }

    /// First non-nil magic slot along the base chain.
    pub fn find_magic(&self, t: TypeId, m: Magic) -> Option<Value> {
        self.chain(t).map(|r| r.magic(m)).find(|v| !v.is_nil())
    }

    /// Class attribute lookup along the base chain. Magic names resolve
    /// through the magic slots.
    pub fn find_attr(&self, t: TypeId, name: Name) -> Option<Value> {
        match name.as_magic() {
            Some(m) => self.find_magic(t, m),
            None => self.chain(t).find_map(|r| r.attrs.get(name)),
        }
    }

    pub fn find_dtor(&self, t: TypeId) -> Option<Dtor> {
        self.chain(t).find_map(|r| r.dtor)
    }

    /// Sets a class attribute; magic names go to the magic slot.
    pub fn set_attr(&mut self, t: TypeId, name: Name, v: Value) {
        let rec = self.get_mut(t);
        match name.as_magic() {
            Some(m) => rec.magic[m.index()] = v,
            None => {
                rec.attrs.set(name, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (NameTable, TypeRegistry) {
        let mut names = NameTable::new();
        let types = TypeRegistry::new(&mut names);
        (names, types)
    }

    #[test]
    fn test_builtin_layouts() {
        let (_, types) = registry();
        assert_eq!(types.len(), TypeId::BUILTIN_COUNT);
        assert_eq!(types.get(TypeId::OBJECT).layout, Layout::Dict);
        assert_eq!(types.get(TypeId::KEY_ERROR).layout, Layout::Dict);
        assert_eq!(types.get(TypeId::LIST).layout, Layout::Fixed(0));
        assert!(types.is_subclass(TypeId::BOOL, TypeId::INT));
        assert!(types.is_subclass(TypeId::UNBOUND_LOCAL_ERROR, TypeId::EXCEPTION));
        assert!(!types.is_subclass(TypeId::INT, TypeId::BOOL));
    }

    #[test]
    fn test_user_type_inherits_magic_and_attrs() {
        let (mut names, mut types) = registry();
        let marker = Value::Int(7);
        types.get_mut(TypeId::OBJECT).magic[Magic::Repr.index()] = marker;
        let attr = names.intern("greet");
        types.set_attr(TypeId::OBJECT, attr, Value::Int(1));

        let base = types.register(names.intern("Base"), TypeId::OBJECT, None, None);
        let derived = types.register(names.intern("Derived"), base, None, None);
        assert_eq!(types.find_magic(derived, Magic::Repr), Some(marker));
        assert_eq!(types.find_magic(derived, Magic::Add), None);
        assert_eq!(types.find_attr(derived, attr), Some(Value::Int(1)));
        assert_eq!(types.find_attr(derived, Name::from(Magic::Repr)), Some(marker));

        types.set_attr(base, attr, Value::Int(2));
        assert_eq!(types.find_attr(derived, attr), Some(Value::Int(2)));
        assert_eq!(types.get(derived).layout, Layout::Dict);
    }

    #[test]
    fn test_dtor_inherited() {
        fn dtor(_: &mut dyn Any) {}
        let (mut names, mut types) = registry();
        let a = types.register(names.intern("A"), TypeId::OBJECT, None, Some(dtor));
        let b = types.register(names.intern("B"), a, None, None);
        assert!(types.find_dtor(b).is_some());
        assert!(types.find_dtor(TypeId::OBJECT).is_none());
    }

    #[test]
    #[should_panic(expected = "not an acceptable base type")]
    fn test_sealed_base_rejected() {
        let (mut names, mut types) = registry();
        types.register(names.intern("MyInt"), TypeId::INT, None, None);
    }
}
