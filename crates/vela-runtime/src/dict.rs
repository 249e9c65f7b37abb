//! Insertion-ordered hash map storage for `dict` objects.
//!
//! The map only stores hashes and values. Key equality for generic keys needs
//! magic dispatch, so lookups are split: `candidates` yields the entries whose
//! hash matches and the VM decides which one is equal. Str and int keys are
//! compared directly through `find`.

use core::hash::Hasher;

use hashbrown::HashMap;
use rustc_hash::FxHasher;

use crate::value::Value;

/// Hash used for `str` keys on both the generic and the by-str paths.
pub fn hash_str(s: &str) -> i64 {
    let mut h = FxHasher::default();
    h.write(s.as_bytes());
    h.finish() as i64
}

#[derive(Debug, Clone, Copy)]
pub struct DictEntry {
    pub hash: i64,
    pub key: Value,
    pub val: Value,
}

/// Entries live in a dense vector in insertion order; deletions leave a
/// tombstone until enough accumulate to compact.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<Option<DictEntry>>,
    buckets: HashMap<i64, Vec<u32>>,
    len: usize,
    epoch: u32,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Structural version; changes on insert of a new key, removal, clear and
    /// compaction.
    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Raw entry positions whose hash equals `hash`, oldest first.
    pub fn candidates(&self, hash: i64) -> Vec<usize> {
        self.buckets
            .get(&hash)
            .map(|b| b.iter().map(|&i| i as usize).collect())
            .unwrap_or_default()
    }

    /// First entry with `hash` whose key satisfies `eq`.
    pub fn find(&self, hash: i64, mut eq: impl FnMut(Value) -> bool) -> Option<usize> {
        let bucket = self.buckets.get(&hash)?;
        bucket.iter().map(|&i| i as usize).find(|&i| match &self.entries[i] {
            Some(e) => eq(e.key),
            None => false,
        })
    }

    /// Appends a new entry. The caller guarantees the key is absent.
    pub fn insert(&mut self, hash: i64, key: Value, val: Value) -> usize {
        let index = self.entries.len();
        self.entries.push(Some(DictEntry { hash, key, val }));
        self.buckets.entry(hash).or_default().push(index as u32);
        self.len += 1;
        self.bump();
        index
    }

    #[inline]
    pub fn entry(&self, index: usize) -> Option<&DictEntry> {
        self.entries.get(index).and_then(|e| e.as_ref())
    }

    #[inline]
    pub fn value_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.entries.get_mut(index).and_then(|e| e.as_mut()).map(|e| &mut e.val)
    }

    pub fn remove_at(&mut self, index: usize) -> Option<DictEntry> {
        let entry = self.entries.get_mut(index)?.take()?;
        if let Some(bucket) = self.buckets.get_mut(&entry.hash) {
            bucket.retain(|&i| i as usize != index);
            if bucket.is_empty() {
                self.buckets.remove(&entry.hash);
            }
        }
        self.len -= 1;
        self.bump();
        if self.entries.len() > 8 && self.entries.len() > self.len * 2 {
            self.compact();
        }
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
        self.len = 0;
        self.bump();
    }

    /// Number of raw positions, including tombstones.
    #[inline]
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }

    /// First live entry at or after raw position `from`.
    pub fn next_live(&self, from: usize) -> Option<(usize, &DictEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DictEntry> + '_ {
        self.entries.iter().flatten()
    }

    fn compact(&mut self) {
        let live: Vec<DictEntry> = self.entries.drain(..).flatten().collect();
        self.buckets.clear();
        for (i, e) in live.iter().enumerate() {
            self.buckets.entry(e.hash).or_default().push(i as u32);
        }
        self.entries = live.into_iter().map(Some).collect();
        log::trace!("dict compacted to {} entries", self.len);
    }

    #[inline]
    fn bump(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_find(d: &Dict, k: i64) -> Option<usize> {
        d.find(k, |key| key == Value::Int(k))
    }

    #[test]
    fn test_insert_find_remove() {
        let mut d = Dict::new();
        for i in 0..20 {
            d.insert(i, Value::Int(i), Value::Int(i * 10));
        }
        assert_eq!(d.len(), 20);
        let idx = int_find(&d, 7).unwrap();
        assert_eq!(d.entry(idx).unwrap().val, Value::Int(70));
        for i in 0..15 {
            let idx = int_find(&d, i).unwrap();
            assert!(d.remove_at(idx).is_some());
        }
        assert_eq!(d.len(), 5);
        // compaction keeps order and lookups intact
        let keys: Vec<Value> = d.iter().map(|e| e.key).collect();
        assert_eq!(keys, (15..20).map(Value::Int).collect::<Vec<_>>());
        assert!(int_find(&d, 3).is_none());
        assert!(int_find(&d, 19).is_some());
    }

    #[test]
    fn test_colliding_hashes() {
        let mut d = Dict::new();
        d.insert(1, Value::Int(10), Value::None);
        d.insert(1, Value::Int(20), Value::None);
        assert_eq!(d.candidates(1).len(), 2);
        let i = d.find(1, |k| k == Value::Int(20)).unwrap();
        assert_eq!(i, 1);
    }

    #[test]
    fn test_epoch_changes_on_structure_only() {
        let mut d = Dict::new();
        let i = d.insert(5, Value::Int(5), Value::None);
        let e = d.epoch();
        *d.value_mut(i).unwrap() = Value::Int(1);
        assert_eq!(d.epoch(), e);
        d.remove_at(i);
        assert_ne!(d.epoch(), e);
    }

    #[test]
    fn test_hash_str_is_stable() {
        assert_eq!(hash_str("abc"), hash_str("abc"));
        assert_ne!(hash_str("abc"), hash_str("abd"));
    }
}
