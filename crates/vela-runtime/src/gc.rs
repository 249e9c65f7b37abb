//! Garbage collector.
//!
//! Objects live in an arena of generation-stamped entries. A `GcRef` is an
//! `(index, generation)` pair, so a handle that outlived its object is
//! detected instead of silently aliasing whatever reused the entry.
//!
//! Collection is a stop-the-world mark-sweep:
//! 1. The owner marks its roots with `mark_gray`.
//! 2. `collect` drains the gray queue, tracing children.
//! 3. Unmarked entries are swept and handed to the finalizer callback.
//!
//! Allocation does not collect by itself; the owner checks `should_collect`
//! first so it can mark roots.

use crate::error::RefError;
use crate::object::Object;

/// Floor for the collection threshold, in bytes.
pub const DEFAULT_MIN_THRESHOLD: usize = 1024 * 1024;
/// Next threshold as a percentage of live bytes after a cycle.
pub const DEFAULT_PAUSE_PERCENT: usize = 200;

/// Generation-checked handle to a heap object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GcRef {
    index: u32,
    generation: u32,
}

impl GcRef {
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

struct Entry {
    generation: u32,
    marked: bool,
    size: usize,
    object: Option<Object>,
}

pub struct Gc {
    entries: Vec<Entry>,
    free: Vec<u32>,
    gray_queue: Vec<GcRef>,
    live: usize,
    total_bytes: usize,
    allocated_since: usize,
    threshold: usize,
    min_threshold: usize,
    pause_percent: usize,
    pause_count: u32,
    cycles: u64,
}

impl Gc {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_MIN_THRESHOLD, DEFAULT_PAUSE_PERCENT)
    }

    pub fn with_threshold(min_threshold: usize, pause_percent: usize) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            gray_queue: Vec::new(),
            live: 0,
            total_bytes: 0,
            allocated_since: 0,
            threshold: min_threshold,
            min_threshold,
            pause_percent,
            pause_count: 0,
            cycles: 0,
        }
    }

    /// Moves `obj` onto the heap.
    pub fn alloc(&mut self, obj: Object) -> GcRef {
        let size = obj.size();
        self.total_bytes += size;
        self.allocated_since += size;
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.marked = false;
                entry.size = size;
                entry.object = Some(obj);
                GcRef { index, generation: entry.generation }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry { generation: 0, marked: false, size, object: Some(obj) });
                GcRef { index, generation: 0 }
            }
        }
    }

    /// Re-measures `r` after its payload changed size. Growth counts toward
    /// the next cycle like a fresh allocation.
    pub fn resize(&mut self, r: GcRef) {
        let Some(entry) = self
            .entries
            .get_mut(r.index as usize)
            .filter(|e| e.generation == r.generation)
        else {
            return;
        };
        let Some(size) = entry.object.as_ref().map(Object::size) else {
            return;
        };
        if size > entry.size {
            self.allocated_since += size - entry.size;
        }
        self.total_bytes = self.total_bytes + size - entry.size;
        entry.size = size;
    }

    #[inline]
    pub fn is_alive(&self, r: GcRef) -> bool {
        self.entry(r).is_some()
    }

    #[inline]
    fn entry(&self, r: GcRef) -> Option<&Entry> {
        self.entries
            .get(r.index as usize)
            .filter(|e| e.generation == r.generation && e.object.is_some())
    }

    #[inline]
    pub fn try_get(&self, r: GcRef) -> Result<&Object, RefError> {
        self.entry(r).and_then(|e| e.object.as_ref()).ok_or(RefError::Collected)
    }

    #[inline]
    pub fn try_get_mut(&mut self, r: GcRef) -> Result<&mut Object, RefError> {
        self.entries
            .get_mut(r.index as usize)
            .filter(|e| e.generation == r.generation)
            .and_then(|e| e.object.as_mut())
            .ok_or(RefError::Collected)
    }

    /// Panics if `r` refers to a collected object.
    #[inline]
    pub fn get(&self, r: GcRef) -> &Object {
        match self.try_get(r) {
            Ok(obj) => obj,
            Err(e) => panic!("{e}: {r:?}"),
        }
    }

    /// Panics if `r` refers to a collected object.
    #[inline]
    pub fn get_mut(&mut self, r: GcRef) -> &mut Object {
        match self.try_get_mut(r) {
            Ok(obj) => obj,
            Err(e) => panic!("{e}: {r:?}"),
        }
    }

    /// Marks `r` reachable and queues it for tracing.
    #[inline]
    pub fn mark_gray(&mut self, r: GcRef) {
        if let Some(e) = self.entries.get_mut(r.index as usize) {
            if e.generation == r.generation && e.object.is_some() && !e.marked {
                e.marked = true;
                self.gray_queue.push(r);
            }
        }
    }

    /// Whether bytes allocated since the last cycle crossed the threshold.
    #[inline]
    pub fn should_collect(&self) -> bool {
        self.allocated_since > self.threshold && self.pause_count == 0
    }

    /// Traces from the already-marked roots, then sweeps everything else.
    ///
    /// `finalize` receives each swept object exactly once, before its storage
    /// is dropped. Returns the number of objects freed.
    pub fn collect<F>(&mut self, mut finalize: F) -> usize
    where
        F: FnMut(Object),
    {
        let mut children = Vec::new();
        while let Some(r) = self.gray_queue.pop() {
            if let Some(obj) = self.entries[r.index as usize].object.as_ref() {
                obj.trace(&mut |c| children.push(c));
            }
            for c in children.drain(..) {
                self.mark_gray(c);
            }
        }

        let before = self.total_bytes;
        let mut freed = 0;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.marked {
                entry.marked = false;
                continue;
            }
            if let Some(obj) = entry.object.take() {
                entry.generation = entry.generation.wrapping_add(1);
                self.total_bytes -= entry.size;
                self.free.push(i as u32);
                freed += 1;
                finalize(obj);
            }
        }
        self.live -= freed;
        self.allocated_since = 0;
        self.threshold = (self.total_bytes * self.pause_percent / 100).max(self.min_threshold);
        self.cycles += 1;

        log::debug!(
            "gc cycle {}: freed {} objects ({} bytes), {} live, next threshold {}",
            self.cycles,
            freed,
            before - self.total_bytes,
            self.live,
            self.threshold
        );
        freed
    }

    /// Releases every object, live or not. Used at context teardown.
    pub fn finalize_all<F>(&mut self, mut finalize: F) -> usize
    where
        F: FnMut(Object),
    {
        self.gray_queue.clear();
        let mut freed = 0;
        for entry in self.entries.iter_mut() {
            if let Some(obj) = entry.object.take() {
                entry.generation = entry.generation.wrapping_add(1);
                freed += 1;
                finalize(obj);
            }
        }
        self.entries.clear();
        self.free.clear();
        self.live = 0;
        self.total_bytes = 0;
        self.allocated_since = 0;
        freed
    }

    /// Suppresses collection until the matching `resume_gc`. Nests.
    #[inline]
    pub fn pause_gc(&mut self) {
        self.pause_count += 1;
    }

    #[inline]
    pub fn resume_gc(&mut self) {
        debug_assert!(self.pause_count > 0, "resume_gc without pause_gc");
        self.pause_count = self.pause_count.saturating_sub(1);
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.pause_count > 0
    }

    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    #[inline]
    pub fn allocated_since(&self) -> usize {
        self.allocated_since
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Replaces the minimum threshold and resets the current threshold to it.
    pub fn set_threshold(&mut self, min_threshold: usize) {
        self.min_threshold = min_threshold;
        self.threshold = min_threshold;
    }

    /// Completed collection cycles.
    #[inline]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

impl Default for Gc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectData;
    use crate::value::Value;
    use vela_common_core::TypeId;

    fn str_obj(s: &str) -> Object {
        Object::new(TypeId::STR, ObjectData::Str(s.to_string()))
    }

    #[test]
    fn test_unmarked_objects_are_swept() {
        let mut gc = Gc::new();
        let keep = gc.alloc(str_obj("keep"));
        let drop = gc.alloc(str_obj("drop"));
        gc.mark_gray(keep);
        let mut finalized = Vec::new();
        let freed = gc.collect(|obj| finalized.push(obj.as_str().unwrap().to_string()));
        assert_eq!(freed, 1);
        assert_eq!(finalized, vec!["drop".to_string()]);
        assert!(gc.is_alive(keep));
        assert!(!gc.is_alive(drop));
        assert_eq!(gc.try_get(drop).unwrap_err(), RefError::Collected);
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut gc = Gc::new();
        let a = gc.alloc(Object::with_slots(TypeId::TUPLE, 1, ObjectData::Plain));
        let b = gc.alloc(Object::with_slots(TypeId::TUPLE, 1, ObjectData::Plain));
        gc.get_mut(a).slots[0] = Value::Object(b);
        gc.get_mut(b).slots[0] = Value::Object(a);

        gc.mark_gray(a);
        assert_eq!(gc.collect(|_| {}), 0);
        assert_eq!(gc.object_count(), 2);

        assert_eq!(gc.collect(|_| {}), 2);
        assert_eq!(gc.object_count(), 0);
        assert_eq!(gc.total_bytes(), 0);
    }

    #[test]
    fn test_reused_entry_rejects_old_handle() {
        let mut gc = Gc::new();
        let old = gc.alloc(str_obj("old"));
        gc.collect(|_| {});
        let new = gc.alloc(str_obj("new"));
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(gc.try_get(old).is_err());
        assert_eq!(gc.get(new).as_str(), Some("new"));
    }

    #[test]
    fn test_threshold_and_pause() {
        let mut gc = Gc::with_threshold(256, 100);
        assert!(!gc.should_collect());
        for i in 0..16 {
            gc.alloc(str_obj(&i.to_string()));
        }
        assert!(gc.should_collect());
        gc.pause_gc();
        assert!(!gc.should_collect());
        gc.resume_gc();
        assert!(gc.should_collect());
        gc.collect(|_| {});
        assert_eq!(gc.allocated_since(), 0);
        assert_eq!(gc.threshold(), 256);
        assert_eq!(gc.cycles(), 1);
    }

    #[test]
    fn test_growth_in_place_counts_toward_threshold() {
        let mut gc = Gc::with_threshold(4096, 100);
        let list = gc.alloc(Object::new(TypeId::LIST, ObjectData::List(crate::object::List::default())));
        let before = gc.allocated_since();
        for i in 0..1000 {
            gc.get_mut(list).as_list_mut().unwrap().push(Value::Int(i));
            gc.resize(list);
        }
        assert!(gc.allocated_since() >= before + 1000 * core::mem::size_of::<Value>());
        assert_eq!(gc.total_bytes(), gc.get(list).size());
        assert!(gc.should_collect());

        gc.get_mut(list).as_list_mut().unwrap().items = Vec::new();
        let since = gc.allocated_since();
        gc.resize(list);
        assert_eq!(gc.allocated_since(), since);
        assert_eq!(gc.total_bytes(), gc.get(list).size());
    }

    #[test]
    fn test_finalize_all() {
        let mut gc = Gc::new();
        let a = gc.alloc(str_obj("a"));
        gc.alloc(str_obj("b"));
        gc.mark_gray(a);
        let mut n = 0;
        assert_eq!(gc.finalize_all(|_| n += 1), 2);
        assert_eq!(n, 2);
        assert_eq!(gc.object_count(), 0);
    }
}
