//! Probabilistic set-membership filter used to skip SSTables that cannot
//! contain a key.
//!
//! Fixed-width bit array sized at construction (`10 × expected_keys` bits),
//! with `k` independent-ish positions per key produced by double hashing:
//! `h_i = (h1 + i·h2) mod m`, where `h1` is a host string hash and
//! `h2 = h1.wrapping_mul(0x9e3779b9)`. No false negatives; false positives
//! are permitted and expected. Never serialized to disk — every SSTable
//! rebuilds its filter by scanning its own keys, either while it is written
//! ([`crate::sstable::writer`]) or while it is loaded back at
//! [`crate::store::Store::open`] time ([`crate::sstable::reader::load_index`]).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Golden-ratio constant used to derive the second hash from the first.
const GOLDEN_RATIO: u64 = 0x9e3779b9;

/// Number of hash positions used for SSTable filters (spec default).
pub const K_SSTABLE: u32 = 7;

/// Number of hash positions used for transient, in-memory filters.
pub const K_TRANSIENT: u32 = 3;

/// A fixed-size Bloom filter over arbitrary byte-string keys.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<bool>,
    k: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_keys` entries, using `k` hash
    /// positions per key.
    ///
    /// `expected_keys` is clamped to at least 1 so that a filter can always
    /// be constructed, even for an empty batch (the writer still needs a
    /// filter to build even though it will never be queried).
    pub fn new(expected_keys: usize, k: u32) -> Self {
        let bits = expected_keys.max(1) * 10;
        Self {
            bits: vec![false; bits],
            k: k.max(1),
        }
    }

    /// Sets the `k` bits derived from `key`.
    pub fn add(&mut self, key: &[u8]) {
        for idx in self.hash_indices(key) {
            self.bits[idx] = true;
        }
    }

    /// Returns `false` iff any of the `k` derived bits is unset — i.e. `key`
    /// is *definitely not* present. Returns `true` for both "present" and
    /// "false positive".
    pub fn contains(&self, key: &[u8]) -> bool {
        self.hash_indices(key).all(|idx| self.bits[idx])
    }

    fn hash_indices(&self, key: &[u8]) -> impl Iterator<Item = usize> + '_ {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let h1 = hasher.finish();
        let h2 = h1.wrapping_mul(GOLDEN_RATIO);
        let m = self.bits.len() as u64;

        (0..self.k).map(move |i| {
            let idx = h1.wrapping_add((i as u64).wrapping_mul(h2)) % m;
            idx as usize
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_after_add() {
        let mut bf = BloomFilter::new(100, K_SSTABLE);
        bf.add(b"hello");
        assert!(bf.contains(b"hello"));
    }

    #[test]
    fn absent_key_usually_reported_absent() {
        let mut bf = BloomFilter::new(1000, K_SSTABLE);
        for i in 0..500u32 {
            bf.add(format!("key_{i}").as_bytes());
        }
        // Never a false negative for any key actually added.
        for i in 0..500u32 {
            assert!(bf.contains(format!("key_{i}").as_bytes()));
        }
        // A key far outside the inserted range should (almost always) be
        // reported absent given the 10x sizing; this is a sanity check, not
        // a proof, so we just assert it isn't universally true.
        let absent = (1000..2000)
            .filter(|i| !bf.contains(format!("key_{i}").as_bytes()))
            .count();
        assert!(absent > 0, "bloom filter reported every absent key present");
    }

    #[test]
    fn no_false_negatives_across_many_keys() {
        let mut bf = BloomFilter::new(5000, K_SSTABLE);
        let keys: Vec<String> = (0..5000).map(|i| format!("k{i}")).collect();
        for k in &keys {
            bf.add(k.as_bytes());
        }
        for k in &keys {
            assert!(bf.contains(k.as_bytes()), "false negative for {k}");
        }
    }

    #[test]
    fn transient_k_differs_from_sstable_k() {
        assert_ne!(K_TRANSIENT, K_SSTABLE);
        let bf = BloomFilter::new(10, K_TRANSIENT);
        assert_eq!(bf.k, K_TRANSIENT);
    }
}
