//! Container primitives: list, tuple, dict and bytes.
//!
//! Index arguments are already normalized; out-of-range indices are
//! programming errors and panic. Generic dict operations hash and compare
//! keys through magic dispatch and may raise.

use vela_common_core::TypeId;
use vela_runtime::{hash_str, GcRef, ItemKind, ItemRef, ObjectData, Value};

use crate::error::PyResult;
use crate::vm::Vm;

impl Vm {
    fn list_ref(&self, list: Value) -> GcRef {
        match list {
            Value::Object(r) if self.object(r).as_list().is_some() => r,
            _ => panic!("expected list, got {}", self.type_name_of(list)),
        }
    }

    fn dict_ref(&self, dict: Value) -> GcRef {
        match dict {
            Value::Object(r) if self.object(r).as_dict().is_some() => r,
            _ => panic!("expected dict, got {}", self.type_name_of(dict)),
        }
    }

    // =========================================================================
    // list
    // =========================================================================

    pub fn list_data(&self, list: Value) -> &[Value] {
        let r = self.list_ref(list);
        &self.object(r).as_list().expect("list payload").items
    }

    #[inline]
    pub fn list_len(&self, list: Value) -> usize {
        self.list_data(list).len()
    }

    pub fn list_getitem(&self, list: Value, i: usize) -> Value {
        self.list_data(list)[i]
    }

    pub fn list_setitem(&mut self, list: Value, i: usize, val: Value) {
        let r = self.list_ref(list);
        self.list_mut(r).items[i] = val;
    }

    pub fn list_delitem(&mut self, list: Value, i: usize) {
        let r = self.list_ref(list);
        self.list_mut(r).remove(i);
    }

    pub fn list_swap(&mut self, list: Value, i: usize, j: usize) {
        let r = self.list_ref(list);
        self.list_mut(r).items.swap(i, j);
    }

    pub fn list_append(&mut self, list: Value, val: Value) {
        let r = self.list_ref(list);
        self.list_mut(r).push(val);
        self.heap.resize(r);
    }

    /// Appends a nil element and returns a reference to it.
    pub fn list_emplace(&mut self, list: Value) -> ItemRef {
        let owner = self.list_ref(list);
        let l = self.list_mut(owner);
        l.push(Value::Nil);
        let item = ItemRef { owner, kind: ItemKind::ListItem, index: l.items.len() - 1, epoch: l.epoch() };
        self.heap.resize(owner);
        item
    }

    /// Reference to element `i`, valid until the list is structurally changed.
    pub fn list_item_ref(&self, list: Value, i: usize) -> ItemRef {
        let owner = self.list_ref(list);
        let l = self.object(owner).as_list().expect("list payload");
        assert!(i < l.items.len(), "list index {i} out of range");
        ItemRef { owner, kind: ItemKind::ListItem, index: i, epoch: l.epoch() }
    }

    pub fn list_clear(&mut self, list: Value) {
        let r = self.list_ref(list);
        self.list_mut(r).clear();
    }

    pub fn list_insert(&mut self, list: Value, i: usize, val: Value) {
        let r = self.list_ref(list);
        self.list_mut(r).insert(i, val);
        self.heap.resize(r);
    }

    /// Calls `f` on each element. Resizing the list from `f` raises
    /// `RuntimeError`.
    pub fn list_apply(&mut self, list: Value, mut f: impl FnMut(&mut Vm, Value) -> PyResult) -> PyResult {
        let r = self.list_ref(list);
        let epoch = self.object(r).as_list().map_or(0, |l| l.epoch());
        let mut i = 0;
        loop {
            let l = self.object(r).as_list().expect("list payload");
            if l.epoch() != epoch {
                return Err(self.runtime_error("list changed size during iteration"));
            }
            let Some(&v) = l.items.get(i) else {
                return Ok(());
            };
            f(self, v)?;
            i += 1;
        }
    }

    fn list_mut(&mut self, r: GcRef) -> &mut vela_runtime::List {
        self.object_mut(r).as_list_mut().expect("list payload")
    }

    // =========================================================================
    // tuple
    // =========================================================================

    fn tuple_ref(&self, tuple: Value) -> GcRef {
        match tuple {
            Value::Object(r) if self.object(r).ty == TypeId::TUPLE => r,
            _ => panic!("expected tuple, got {}", self.type_name_of(tuple)),
        }
    }

    pub fn tuple_data(&self, tuple: Value) -> &[Value] {
        &self.object(self.tuple_ref(tuple)).slots
    }

    #[inline]
    pub fn tuple_len(&self, tuple: Value) -> usize {
        self.tuple_data(tuple).len()
    }

    pub fn tuple_getitem(&self, tuple: Value, i: usize) -> Value {
        self.tuple_data(tuple)[i]
    }

    /// Fills slot `i` of a tuple under construction.
    pub fn tuple_setitem(&mut self, tuple: Value, i: usize, val: Value) {
        let r = self.tuple_ref(tuple);
        self.object_mut(r).slots[i] = val;
    }

    // =========================================================================
    // dict
    // =========================================================================

    #[inline]
    pub fn dict_len(&self, dict: Value) -> usize {
        self.object(self.dict_ref(dict)).as_dict().map_or(0, |d| d.len())
    }

    /// Hash of `key` and the entry index holding an equal key.
    fn dict_lookup(&mut self, r: GcRef, key: Value) -> PyResult<(i64, Option<usize>)> {
        let hash = self.hash(key)?;
        let candidates = self.object(r).as_dict().expect("dict payload").candidates(hash);
        for idx in candidates {
            let Some(k) = self.object(r).as_dict().and_then(|d| d.entry(idx)).map(|e| e.key) else {
                continue;
            };
            if self.is_identical(k, key) {
                return Ok((hash, Some(idx)));
            }
            let same = match self.fast_key_eq(k, key) {
                Some(b) => b,
                None => self.equal(k, key)?,
            };
            if same {
                return Ok((hash, Some(idx)));
            }
        }
        Ok((hash, None))
    }

    /// Key equality for str and numbers without dispatch.
    fn fast_key_eq(&self, a: Value, b: Value) -> Option<bool> {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return Some(x == y);
        }
        match (self.payload_of(a), self.payload_of(b)) {
            (Some(ObjectData::Str(x)), Some(ObjectData::Str(y))) => Some(x == y),
            _ => None,
        }
    }

    pub fn dict_getitem(&mut self, dict: Value, key: Value) -> PyResult<Option<Value>> {
        let r = self.dict_ref(dict);
        let (_, idx) = self.dict_lookup(r, key)?;
        Ok(idx.and_then(|i| self.object(r).as_dict().and_then(|d| d.entry(i)).map(|e| e.val)))
    }

    pub fn dict_setitem(&mut self, dict: Value, key: Value, val: Value) -> PyResult {
        let r = self.dict_ref(dict);
        let (hash, idx) = self.dict_lookup(r, key)?;
        let d = self.object_mut(r).as_dict_mut().expect("dict payload");
        match idx.and_then(|i| d.value_mut(i)) {
            Some(slot) => *slot = val,
            None => {
                d.insert(hash, key, val);
                self.heap.resize(r);
            }
        }
        Ok(())
    }

    /// Removes `key`. `Ok(false)` if it was absent.
    pub fn dict_delitem(&mut self, dict: Value, key: Value) -> PyResult<bool> {
        let r = self.dict_ref(dict);
        let (_, idx) = self.dict_lookup(r, key)?;
        let Some(i) = idx else {
            return Ok(false);
        };
        Ok(self.object_mut(r).as_dict_mut().expect("dict payload").remove_at(i).is_some())
    }

    /// Reference to the value stored under `key`, inserting nil if absent.
    pub fn dict_emplace(&mut self, dict: Value, key: Value) -> PyResult<ItemRef> {
        let owner = self.dict_ref(dict);
        let (hash, idx) = self.dict_lookup(owner, key)?;
        let d = self.object_mut(owner).as_dict_mut().expect("dict payload");
        let index = match idx {
            Some(i) => i,
            None => d.insert(hash, key, Value::Nil),
        };
        let item = ItemRef { owner, kind: ItemKind::DictValue, index, epoch: d.epoch() };
        self.heap.resize(owner);
        Ok(item)
    }

    fn find_str(&self, r: GcRef, key: &str) -> Option<usize> {
        let heap = &self.heap;
        let d = heap.get(r).as_dict().expect("dict payload");
        d.find(hash_str(key), |k| {
            k.as_object()
                .and_then(|kr| heap.try_get(kr).ok())
                .and_then(|o| o.as_str())
                == Some(key)
        })
    }

    fn find_int(&self, r: GcRef, key: i64) -> Option<usize> {
        let d = self.heap.get(r).as_dict().expect("dict payload");
        d.find(key, |k| match k {
            Value::Int(i) => i == key,
            Value::Bool(b) => b as i64 == key,
            Value::Float(f) => f == key as f64,
            _ => false,
        })
    }

    pub fn dict_getitem_by_str(&self, dict: Value, key: &str) -> Option<Value> {
        let r = self.dict_ref(dict);
        let i = self.find_str(r, key)?;
        self.object(r).as_dict().and_then(|d| d.entry(i)).map(|e| e.val)
    }

    pub fn dict_setitem_by_str(&mut self, dict: Value, key: &str, val: Value) {
        let r = self.dict_ref(dict);
        match self.find_str(r, key) {
            Some(i) => {
                let d = self.object_mut(r).as_dict_mut().expect("dict payload");
                if let Some(slot) = d.value_mut(i) {
                    *slot = val;
                }
            }
            None => {
                // the new key must not be collected before it is stored
                let k = self.with_gc_paused(|vm| vm.alloc_str(key));
                let d = self.object_mut(r).as_dict_mut().expect("dict payload");
                d.insert(hash_str(key), k, val);
                self.heap.resize(r);
            }
        }
    }

    pub fn dict_delitem_by_str(&mut self, dict: Value, key: &str) -> bool {
        let r = self.dict_ref(dict);
        match self.find_str(r, key) {
            Some(i) => self.object_mut(r).as_dict_mut().expect("dict payload").remove_at(i).is_some(),
            None => false,
        }
    }

    pub fn dict_getitem_by_int(&self, dict: Value, key: i64) -> Option<Value> {
        let r = self.dict_ref(dict);
        let i = self.find_int(r, key)?;
        self.object(r).as_dict().and_then(|d| d.entry(i)).map(|e| e.val)
    }

    pub fn dict_setitem_by_int(&mut self, dict: Value, key: i64, val: Value) {
        let r = self.dict_ref(dict);
        let idx = self.find_int(r, key);
        let d = self.object_mut(r).as_dict_mut().expect("dict payload");
        match idx.and_then(|i| d.value_mut(i)) {
            Some(slot) => *slot = val,
            None => {
                d.insert(key, Value::Int(key), val);
                self.heap.resize(r);
            }
        }
    }

    pub fn dict_delitem_by_int(&mut self, dict: Value, key: i64) -> bool {
        let r = self.dict_ref(dict);
        match self.find_int(r, key) {
            Some(i) => self.object_mut(r).as_dict_mut().expect("dict payload").remove_at(i).is_some(),
            None => false,
        }
    }

    /// Calls `f` on each `(key, value)` in insertion order. Adding or
    /// removing keys from `f` raises `RuntimeError`.
    pub fn dict_apply(&mut self, dict: Value, mut f: impl FnMut(&mut Vm, Value, Value) -> PyResult) -> PyResult {
        let r = self.dict_ref(dict);
        let epoch = self.object(r).as_dict().map_or(0, |d| d.epoch());
        let mut pos = 0;
        loop {
            let d = self.object(r).as_dict().expect("dict payload");
            if d.epoch() != epoch {
                return Err(self.runtime_error("dictionary changed size during iteration"));
            }
            let Some((i, e)) = d.next_live(pos) else {
                return Ok(());
            };
            let (k, v) = (e.key, e.val);
            pos = i + 1;
            f(self, k, v)?;
        }
    }

    // =========================================================================
    // str / bytes views
    // =========================================================================

    /// Raw UTF-8 bytes of a str.
    pub fn to_sv(&self, s: Value) -> &[u8] {
        self.to_str(s).as_bytes()
    }

    /// Normalizes a possibly negative index against `len`.
    pub(crate) fn normalize_index(&mut self, i: i64, len: usize, what: &str) -> PyResult<usize> {
        let j = if i < 0 { i + len as i64 } else { i };
        if j < 0 || j >= len as i64 {
            return Err(self.index_error(format!("{what} index out of range")));
        }
        Ok(j as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_basics() {
        let mut vm = Vm::new();
        let r = vm.reg(0);
        vm.new_list(r);
        let l = vm.get(r);
        for i in 0..5 {
            vm.list_append(l, Value::Int(i));
        }
        vm.list_swap(l, 0, 4);
        vm.list_delitem(l, 1);
        vm.list_insert(l, 0, Value::None);
        assert_eq!(
            vm.list_data(l),
            &[Value::None, Value::Int(4), Value::Int(2), Value::Int(3), Value::Int(0)]
        );
        vm.list_clear(l);
        assert_eq!(vm.list_len(l), 0);
    }

    #[test]
    fn test_list_emplace_ref() {
        let mut vm = Vm::new();
        let r = vm.reg(0);
        vm.new_list(r);
        let l = vm.get(r);
        let item = vm.list_emplace(l);
        vm.set(item, Value::Int(9));
        assert_eq!(vm.list_getitem(l, 0), Value::Int(9));
    }

    #[test]
    fn test_tuple_fill() {
        let mut vm = Vm::new();
        let r = vm.reg(0);
        vm.new_tuple(r, 2);
        let t = vm.get(r);
        vm.tuple_setitem(t, 0, Value::Int(1));
        vm.tuple_setitem(t, 1, Value::Int(2));
        assert_eq!(vm.tuple_len(t), 2);
        assert_eq!(vm.tuple_getitem(t, 1), Value::Int(2));
    }

    #[test]
    fn test_dict_int_keys_agree_across_paths() {
        let mut vm = Vm::new();
        let r = vm.reg(0);
        vm.new_dict(r);
        let d = vm.get(r);
        vm.dict_setitem_by_int(d, 3, Value::Int(30));
        assert_eq!(vm.dict_getitem(d, Value::Int(3)).unwrap(), Some(Value::Int(30)));
        assert_eq!(vm.dict_getitem(d, Value::Float(3.0)).unwrap(), Some(Value::Int(30)));
        vm.dict_setitem(d, Value::Int(4), Value::Int(40)).unwrap();
        assert_eq!(vm.dict_getitem_by_int(d, 4), Some(Value::Int(40)));
        assert!(vm.dict_delitem(d, Value::Int(3)).unwrap());
        assert!(!vm.dict_delitem_by_int(d, 3));
        assert_eq!(vm.dict_len(d), 1);
    }

    #[test]
    fn test_dict_apply_detects_mutation() {
        let mut vm = Vm::new();
        let r = vm.reg(0);
        vm.new_dict(r);
        let d = vm.get(r);
        vm.dict_setitem_by_int(d, 1, Value::None);
        let res = vm.dict_apply(d, |vm, k, _| {
            let k = vm.to_int(k);
            vm.dict_setitem_by_int(d, k + 100, Value::None);
            Ok(())
        });
        assert!(res.is_err());
        assert!(vm.match_exc(TypeId::RUNTIME_ERROR));
    }

    #[test]
    fn test_negative_index() {
        let mut vm = Vm::new();
        assert_eq!(vm.normalize_index(-1, 3, "list").unwrap(), 2);
        assert!(vm.normalize_index(3, 3, "list").is_err());
        assert_eq!(vm.format_exc().as_deref(), Some("IndexError: list index out of range"));
    }
}
