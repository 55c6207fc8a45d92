//! # motesim-store
//!
//! Generic open-addressing hash table backing the motesim channel and noise
//! models.
//!
//! ## Layout
//!
//! Entries live in a dense array in insertion order. A separate index table,
//! sized to a prime roughly 10% above the entry limit, maps probe positions to
//! dense indices. Collisions are resolved with double hashing: the probe starts
//! at `hash % index_size` and steps by `1 + hash % rehash_modulus`, where the
//! two moduli are twin primes.
//!
//! Removal tombstones the dense slot instead of compacting, so removal is safe
//! to interleave with walking the dense array. Growth happens in fixed size
//! classes (see [`SIZE_CLASSES`]); crossing a class limit rebuilds the whole
//! table and drops tombstones.
//!
//! ## Example
//!
//! ```rust
//! use motesim_store::HashTable;
//!
//! let mut table: HashTable<u32, f64> = HashTable::new();
//! table.insert(7, -54.5).unwrap();
//! assert_eq!(table.search(&7), Some(&-54.5));
//!
//! table.remove(&7);
//! assert!(table.search(&7).is_none());
//! ```

mod hasher;
mod sizes;
mod table;

pub use hasher::{FnKeyHasher, KeyHasher, XxKeyHasher};
pub use sizes::{SizeClass, SIZE_CLASSES};
pub use table::{EntryRef, HashTable, Iter};

use thiserror::Error;

/// Errors reported by the hash table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No free slot could be found, either because the largest size class is
    /// full or because allocating the next class failed.
    #[error("hash table exhausted in size class {size_class} (max {max_entries} entries)")]
    Exhausted {
        /// Index of the active size class.
        size_class: usize,
        /// Entry limit of the active size class.
        max_entries: u32,
    },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
