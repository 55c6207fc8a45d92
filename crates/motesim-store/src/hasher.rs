//! Pluggable hashing and key equality.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use xxhash_rust::xxh64::Xxh64;

/// Hash and equality strategy for table keys.
pub trait KeyHasher<K: ?Sized> {
    /// 32-bit hash of `key`.
    fn hash(&self, key: &K) -> u32;

    /// Whether two keys are the same key.
    fn eq(&self, a: &K, b: &K) -> bool;
}

/// Default strategy: xxHash64 over the key's `Hash` impl, folded to 32 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct XxKeyHasher;

impl<K: Hash + Eq + ?Sized> KeyHasher<K> for XxKeyHasher {
    fn hash(&self, key: &K) -> u32 {
        let mut hasher = Xxh64::new(0);
        key.hash(&mut hasher);
        let h = hasher.finish();
        (h ^ (h >> 32)) as u32
    }

    fn eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Strategy built from a pair of plain functions.
pub struct FnKeyHasher<K: ?Sized> {
    hash: fn(&K) -> u32,
    eq: fn(&K, &K) -> bool,
    _key: PhantomData<fn(&K)>,
}

impl<K: ?Sized> FnKeyHasher<K> {
    /// Create a strategy from hash and equality functions.
    pub fn new(hash: fn(&K) -> u32, eq: fn(&K, &K) -> bool) -> Self {
        FnKeyHasher {
            hash,
            eq,
            _key: PhantomData,
        }
    }
}

impl<K: ?Sized> Clone for FnKeyHasher<K> {
    fn clone(&self) -> Self {
        FnKeyHasher::new(self.hash, self.eq)
    }
}

impl<K: ?Sized> std::fmt::Debug for FnKeyHasher<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnKeyHasher").finish_non_exhaustive()
    }
}

impl<K: ?Sized> KeyHasher<K> for FnKeyHasher<K> {
    fn hash(&self, key: &K) -> u32 {
        (self.hash)(key)
    }

    fn eq(&self, a: &K, b: &K) -> bool {
        (self.eq)(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xx_hasher_deterministic() {
        let h = XxKeyHasher;
        assert_eq!(KeyHasher::<u32>::hash(&h, &42), KeyHasher::<u32>::hash(&h, &42));
        assert!(KeyHasher::<str>::eq(&h, "gain", "gain"));
        assert!(!KeyHasher::<str>::eq(&h, "gain", "noise"));
    }

    #[test]
    fn test_fn_hasher() {
        let h: FnKeyHasher<u32> = FnKeyHasher::new(|k| *k % 4, |a, b| a == b);
        assert_eq!(h.hash(&9), 1);
        assert!(h.eq(&3, &3));
    }
}
