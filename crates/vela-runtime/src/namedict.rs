//! Attribute dictionaries keyed by interned names.

use indexmap::IndexMap;
use vela_common_core::Name;

use crate::value::Value;

/// Insertion-ordered `Name -> Value` map backing instance, type and module
/// attributes.
///
/// `epoch` changes on every structural mutation (insert of a new key,
/// removal, clear). Overwriting an existing key keeps the epoch.
#[derive(Debug, Clone, Default)]
pub struct NameDict {
    map: IndexMap<Name, Value>,
    epoch: u32,
}

impl NameDict {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, name: Name) -> Option<Value> {
        self.map.get(&name).copied()
    }

    /// Returns true when `name` was not present before.
    pub fn set(&mut self, name: Name, val: Value) -> bool {
        match self.map.insert(name, val) {
            Some(_) => false,
            None => {
                self.bump();
                true
            }
        }
    }

    /// Removes `name`, keeping the order of the remaining entries.
    pub fn remove(&mut self, name: Name) -> Option<Value> {
        let old = self.map.shift_remove(&name);
        if old.is_some() {
            self.bump();
        }
        old
    }

    /// Position of `name`, inserting `Value::Nil` first if missing.
    pub fn emplace(&mut self, name: Name) -> usize {
        if let Some(index) = self.map.get_index_of(&name) {
            return index;
        }
        self.bump();
        self.map.insert_full(name, Value::Nil).0
    }

    #[inline]
    pub fn get_index(&self, index: usize) -> Option<(Name, Value)> {
        self.map.get_index(index).map(|(k, v)| (*k, *v))
    }

    #[inline]
    pub fn value_at_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.map.get_index_mut(index).map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.bump();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn iter(&self) -> impl Iterator<Item = (Name, Value)> + '_ {
        self.map.iter().map(|(k, v)| (*k, *v))
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.map.values()
    }

    #[inline]
    fn bump(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }
}
