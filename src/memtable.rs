//! The mutable, in-memory buffer of recent writes. Every `put`/`remove` lands
//! here first (after the WAL); reads consult it before falling through to
//! on-disk SSTables.

use std::collections::BTreeMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::record::Record;

#[derive(Debug, Error)]
pub enum MemtableError {
    #[error("memtable lock poisoned")]
    Poisoned,
}

/// An ordered, thread-safe buffer of `(key, record)` pairs.
///
/// Reads (`get`, `size`) take a shared lock; writes (`put`, `remove`) and
/// `flush` take an exclusive one. `flush` is a single critical section that
/// drains the whole map at once, so a concurrent reader never observes a
/// state where the memtable has been partially drained.
#[derive(Debug)]
pub struct MemTable {
    inner: RwLock<BTreeMap<Vec<u8>, Record>>,
}

impl MemTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    /// Inserts or overwrites `key` with a live value.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), MemtableError> {
        let mut guard = self.inner.write().map_err(|_| MemtableError::Poisoned)?;
        guard.insert(key, Record::Live(value));
        Ok(())
    }

    /// Marks `key` as deleted with a tombstone, shadowing any earlier value
    /// for that key (in this memtable or in older SSTables).
    pub fn remove(&self, key: Vec<u8>) -> Result<(), MemtableError> {
        let mut guard = self.inner.write().map_err(|_| MemtableError::Poisoned)?;
        guard.insert(key, Record::Dead);
        Ok(())
    }

    /// Looks up `key`. `Ok(None)` means the key is absent from this memtable
    /// entirely (the caller must still check older SSTables); `Ok(Some(Record::Dead))`
    /// means the key is known-deleted and the search must stop here.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>, MemtableError> {
        let guard = self.inner.read().map_err(|_| MemtableError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    /// Number of distinct keys currently buffered.
    pub fn len(&self) -> Result<usize, MemtableError> {
        let guard = self.inner.read().map_err(|_| MemtableError::Poisoned)?;
        Ok(guard.len())
    }

    pub fn is_empty(&self) -> Result<bool, MemtableError> {
        Ok(self.len()? == 0)
    }

    /// Atomically drains every entry out of the memtable in key order,
    /// leaving it empty. Used by the store immediately before writing a
    /// flushed SSTable.
    pub fn drain(&self) -> Result<Vec<(Vec<u8>, Record)>, MemtableError> {
        let mut guard = self.inner.write().map_err(|_| MemtableError::Poisoned)?;
        Ok(std::mem::take(&mut *guard).into_iter().collect())
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_live_record() {
        let mt = MemTable::new();
        mt.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        assert_eq!(mt.get(b"a").unwrap(), Some(Record::Live(b"1".to_vec())));
    }

    #[test]
    fn missing_key_returns_none() {
        let mt = MemTable::new();
        assert_eq!(mt.get(b"missing").unwrap(), None);
    }

    #[test]
    fn remove_shadows_prior_put_with_tombstone() {
        let mt = MemTable::new();
        mt.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        mt.remove(b"a".to_vec()).unwrap();
        assert_eq!(mt.get(b"a").unwrap(), Some(Record::Dead));
    }

    #[test]
    fn put_overwrites_prior_value_for_same_key() {
        let mt = MemTable::new();
        mt.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        mt.put(b"a".to_vec(), b"2".to_vec()).unwrap();
        assert_eq!(mt.get(b"a").unwrap(), Some(Record::Live(b"2".to_vec())));
        assert_eq!(mt.len().unwrap(), 1);
    }

    #[test]
    fn drain_returns_sorted_entries_and_empties_table() {
        let mt = MemTable::new();
        mt.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        mt.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        mt.remove(b"c".to_vec()).unwrap();

        let drained = mt.drain().unwrap();
        assert_eq!(
            drained,
            vec![
                (b"a".to_vec(), Record::Live(b"1".to_vec())),
                (b"b".to_vec(), Record::Live(b"2".to_vec())),
                (b"c".to_vec(), Record::Dead),
            ]
        );
        assert!(mt.is_empty().unwrap());
    }
}
