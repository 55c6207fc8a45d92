//! The hash table proper.

use crate::hasher::{KeyHasher, XxKeyHasher};
use crate::sizes::{SizeClass, SIZE_CLASSES};
use crate::{Result, StoreError};
use motesim_metrics::metric_defs;
use std::fmt;
use tracing::{debug, warn};

// ============================================================================
// Slots
// ============================================================================

/// Index table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexSlot {
    Empty,
    Dense(u32),
}

/// Dense array cell. A dense slot that was never filled is simply past the end
/// of the vector, so the full tagged state is `Empty | Tombstone | Occupied`
/// across both tables.
#[derive(Debug, Clone)]
enum Slot<K, V> {
    Tombstone,
    Occupied { hash: u32, key: K, value: V },
}

/// Handle to a live dense slot, valid until the next insertion that grows
/// the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryRef(usize);

impl EntryRef {
    /// Position in the dense array.
    pub fn index(&self) -> usize {
        self.0
    }
}

// ============================================================================
// Probe Sequence
// ============================================================================

/// Double-hash probe over an index table; visits every position once.
struct Probe {
    start: u64,
    pos: u64,
    step: u64,
    size: u64,
    started: bool,
}

impl Probe {
    fn new(class: &SizeClass, hash: u32) -> Self {
        let size = class.index_size as u64;
        let start = hash as u64 % size;
        Probe {
            start,
            pos: start,
            step: class.step(hash) as u64,
            size,
            started: false,
        }
    }
}

impl Iterator for Probe {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.started {
            self.pos = (self.pos + self.step) % self.size;
            if self.pos == self.start {
                return None;
            }
        }
        self.started = true;
        Some(self.pos as usize)
    }
}

// ============================================================================
// Hash Table
// ============================================================================

/// Open-addressing hash table with insertion-ordered dense storage.
///
/// Keys are compared with a [`KeyHasher`]; a match requires both the cached
/// 32-bit hash and the equality function to agree.
pub struct HashTable<K, V, H = XxKeyHasher> {
    hasher: H,
    class_index: usize,
    index: Vec<IndexSlot>,
    slots: Vec<Slot<K, V>>,
    live: usize,
    rehashes: u64,
}

impl<K, V> HashTable<K, V, XxKeyHasher>
where
    K: std::hash::Hash + Eq,
{
    /// Create an empty table in the smallest size class.
    pub fn new() -> Self {
        Self::with_hasher(XxKeyHasher)
    }
}

impl<K, V> Default for HashTable<K, V, XxKeyHasher>
where
    K: std::hash::Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H: KeyHasher<K>> HashTable<K, V, H> {
    /// Create an empty table using a custom hash/equality strategy.
    pub fn with_hasher(hasher: H) -> Self {
        let class = SIZE_CLASSES[0];
        HashTable {
            hasher,
            class_index: 0,
            index: vec![IndexSlot::Empty; class.index_size as usize],
            slots: Vec::with_capacity(class.max_entries as usize),
            live: 0,
            rehashes: 0,
        }
    }

    /// The hash/equality strategy.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Hash a key with this table's strategy.
    pub fn hash_key(&self, key: &K) -> u32 {
        self.hasher.hash(key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Dense slots in use, tombstones included.
    pub fn dense_len(&self) -> usize {
        self.slots.len()
    }

    /// The active size class.
    pub fn size_class(&self) -> SizeClass {
        SIZE_CLASSES[self.class_index]
    }

    /// Position of the active size class in [`SIZE_CLASSES`].
    pub fn size_class_index(&self) -> usize {
        self.class_index
    }

    /// Number of times the table has grown.
    pub fn rehash_count(&self) -> u64 {
        self.rehashes
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    fn find(&self, hash: u32, key: &K) -> Option<usize> {
        for pos in Probe::new(&self.size_class(), hash) {
            match self.index[pos] {
                IndexSlot::Empty => return None,
                IndexSlot::Dense(i) => {
                    if let Slot::Occupied {
                        hash: h, key: k, ..
                    } = &self.slots[i as usize]
                    {
                        if *h == hash && self.hasher.eq(k, key) {
                            return Some(i as usize);
                        }
                    }
                }
            }
        }
        None
    }

    /// Look up `key`.
    pub fn search(&self, key: &K) -> Option<&V> {
        self.search_pre_hashed(self.hasher.hash(key), key)
    }

    /// Look up `key` with a hash the caller already computed.
    pub fn search_pre_hashed(&self, hash: u32, key: &K) -> Option<&V> {
        let i = self.find(hash, key)?;
        match &self.slots[i] {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Tombstone => None,
        }
    }

    /// Mutable lookup.
    pub fn search_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hasher.hash(key);
        let i = self.find(hash, key)?;
        match &mut self.slots[i] {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Tombstone => None,
        }
    }

    /// Whether `key` has a live entry.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entry_ref(key).is_some()
    }

    /// Handle to the live slot holding `key`.
    pub fn entry_ref(&self, key: &K) -> Option<EntryRef> {
        self.find(self.hasher.hash(key), key).map(EntryRef)
    }

    // ------------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------------

    /// Insert `key -> value`.
    ///
    /// Returns the previous value when the key was already present. Growing
    /// past the current size class rebuilds the table first; if that fails the
    /// table is left unchanged and [`StoreError::Exhausted`] is returned.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        let hash = self.hasher.hash(&key);
        self.insert_pre_hashed(hash, key, value)
    }

    /// Insert with a hash the caller already computed.
    pub fn insert_pre_hashed(&mut self, hash: u32, key: K, value: V) -> Result<Option<V>> {
        if let Some(i) = self.find(hash, &key) {
            if let Slot::Occupied { value: old, .. } = &mut self.slots[i] {
                return Ok(Some(std::mem::replace(old, value)));
            }
        }

        let max_entries = self.size_class().max_entries as usize;
        if self.slots.len() >= max_entries {
            // Mostly tombstones: reclaim them without moving up a class.
            if self.live * 2 < max_entries {
                self.rebuild(self.class_index);
            } else {
                self.grow();
            }
            if self.slots.len() >= self.size_class().max_entries as usize {
                return Err(self.exhausted());
            }
        }

        let pos = Probe::new(&self.size_class(), hash)
            .find(|&pos| self.index[pos] == IndexSlot::Empty)
            .ok_or_else(|| self.exhausted())?;

        let dense = self.slots.len();
        self.index[pos] = IndexSlot::Dense(dense as u32);
        self.slots.push(Slot::Occupied { hash, key, value });
        self.live += 1;
        Ok(None)
    }

    fn exhausted(&self) -> StoreError {
        StoreError::Exhausted {
            size_class: self.class_index,
            max_entries: self.size_class().max_entries,
        }
    }

    /// Move up one size class. Leaves the table untouched at the largest class.
    fn grow(&mut self) {
        let next = self.class_index + 1;
        if next >= SIZE_CLASSES.len() {
            warn!(
                max_entries = self.size_class().max_entries,
                "Hash table at largest size class"
            );
            return;
        }
        self.rebuild(next);
    }

    /// Rebuild the index and dense array for size class `class_index`,
    /// dropping tombstones. Leaves the table untouched if allocation fails.
    fn rebuild(&mut self, class_index: usize) {
        let Some(class) = SIZE_CLASSES.get(class_index).copied() else {
            return;
        };

        let mut index: Vec<IndexSlot> = Vec::new();
        let mut slots: Vec<Slot<K, V>> = Vec::new();
        if index.try_reserve_exact(class.index_size as usize).is_err()
            || slots.try_reserve_exact(class.max_entries as usize).is_err()
        {
            warn!(
                size_class = class_index,
                index_size = class.index_size,
                "Hash table rehash allocation failed"
            );
            return;
        }
        index.resize(class.index_size as usize, IndexSlot::Empty);

        for slot in self.slots.drain(..) {
            if let Slot::Occupied { hash, key, value } = slot {
                // Keys are unique here, so the first empty cell is the home.
                if let Some(pos) =
                    Probe::new(&class, hash).find(|&pos| index[pos] == IndexSlot::Empty)
                {
                    index[pos] = IndexSlot::Dense(slots.len() as u32);
                    slots.push(Slot::Occupied { hash, key, value });
                }
            }
        }

        debug!(
            from = SIZE_CLASSES[self.class_index].max_entries,
            to = class.max_entries,
            live = slots.len(),
            "Hash table rehashed"
        );

        self.index = index;
        self.slots = slots;
        self.live = self.slots.len();
        self.class_index = class_index;
        self.rehashes += 1;
        metrics::counter!(metric_defs::STORE_REHASHES.name).increment(1);
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    /// Remove `key`, returning its value. Absent keys are a no-op.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entry_ref(key)?;
        self.remove_entry(entry).map(|(_, v)| v)
    }

    /// Tombstone the slot behind `entry`, returning its key and value.
    ///
    /// Safe to call while walking [`entry_refs`](Self::entry_refs); the dense
    /// positions of other entries do not move.
    pub fn remove_entry(&mut self, entry: EntryRef) -> Option<(K, V)> {
        let slot = self.slots.get_mut(entry.0)?;
        match std::mem::replace(slot, Slot::Tombstone) {
            Slot::Occupied { key, value, .. } => {
                self.live -= 1;
                Some((key, value))
            }
            Slot::Tombstone => None,
        }
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        for slot in self.slots.iter_mut() {
            let remove = match slot {
                Slot::Occupied { key, value, .. } => !keep(key, value),
                Slot::Tombstone => false,
            };
            if remove {
                *slot = Slot::Tombstone;
                self.live -= 1;
            }
        }
    }

    /// Drop the table, handing every live entry to `destructor` in dense order.
    pub fn destroy(self, mut destructor: impl FnMut(K, V)) {
        for slot in self.slots {
            if let Slot::Occupied { key, value, .. } = slot {
                destructor(key, value);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------------

    /// Live entries in dense (insertion) order. Reversible.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.slots.iter(),
        }
    }

    /// Handles to live entries, for removal during a walk.
    pub fn entry_refs(&self) -> Vec<EntryRef> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Slot::Occupied { .. }))
            .map(|(i, _)| EntryRef(i))
            .collect()
    }

    /// Key and value behind a handle, if it is still live.
    pub fn get_entry(&self, entry: EntryRef) -> Option<(&K, &V)> {
        match self.slots.get(entry.0)? {
            Slot::Occupied { key, value, .. } => Some((key, value)),
            Slot::Tombstone => None,
        }
    }

    /// Live values, mutably, in dense order.
    pub fn values_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut V> {
        self.slots.iter_mut().filter_map(|s| match s {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Tombstone => None,
        })
    }
}

impl<K: fmt::Debug, V: fmt::Debug, H: KeyHasher<K>> fmt::Debug for HashTable<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Clone, V: Clone, H: Clone> Clone for HashTable<K, V, H> {
    fn clone(&self) -> Self {
        HashTable {
            hasher: self.hasher.clone(),
            class_index: self.class_index,
            index: self.index.clone(),
            slots: self.slots.clone(),
            live: self.live,
            rehashes: self.rehashes,
        }
    }
}

/// Iterator over live entries in dense order.
pub struct Iter<'a, K, V> {
    inner: std::slice::Iter<'a, Slot<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.inner.by_ref() {
            if let Slot::Occupied { key, value, .. } = slot {
                return Some((key, value));
            }
        }
        None
    }
}

impl<'a, K, V> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while let Some(slot) = self.inner.next_back() {
            if let Slot::Occupied { key, value, .. } = slot {
                return Some((key, value));
            }
        }
        None
    }
}

impl<'a, K, V, H: KeyHasher<K>> IntoIterator for &'a HashTable<K, V, H> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
