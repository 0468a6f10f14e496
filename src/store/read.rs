//! `get`: memtable first, then L0 newest-first, then each level `>= 1` in
//! order via binary search over its disjoint key ranges.

use crate::error::StoreError;
use crate::record::Record;
use crate::sstable::reader::search;
use crate::store::Store;

impl Store {
    /// Looks up `key`, returning its current value, or `None` if the key is
    /// absent or has been deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(record) = self.memtable.get(key)? {
            return Ok(resolve(record));
        }

        let guard = self
            .levels
            .read()
            .map_err(|_| StoreError::Internal("levels lock poisoned".into()))?;

        for (level, tables) in guard.levels.iter().enumerate() {
            if level == 0 {
                // L0 ranges can overlap; tables are already ordered
                // newest-first (descending file_id), so the first match
                // found is the most recent write.
                for meta in tables {
                    if !meta.may_contain_range(key) || !meta.bloom.contains(key) {
                        continue;
                    }
                    if let Some(record) = search(meta, key)? {
                        return Ok(resolve(record));
                    }
                }
            } else {
                // Disjoint ranges: at most one table can contain the key.
                let idx = tables.partition_point(|m| m.max_key.as_slice() < key);
                if let Some(meta) = tables.get(idx) {
                    if meta.may_contain_range(key) && meta.bloom.contains(key) {
                        if let Some(record) = search(meta, key)? {
                            return Ok(resolve(record));
                        }
                    }
                }
            }
        }

        Ok(None)
    }
}

fn resolve(record: Record) -> Option<Vec<u8>> {
    record.into_option()
}

#[cfg(test)]
mod tests {
    use crate::store::{Store, StoreConfig};
    use tempfile::TempDir;

    #[test]
    fn get_after_put_returns_value_from_memtable() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path(), StoreConfig::default()).unwrap();
        store.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn get_after_remove_returns_none() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path(), StoreConfig::default()).unwrap();
        store.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        store.remove(b"a".to_vec()).unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn get_survives_flush_to_l0() {
        let tmp = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.memtable_limit = 4;
        let store = Store::open(tmp.path(), config).unwrap();

        for i in 0..10u32 {
            store
                .put(format!("k{i}").into_bytes(), format!("v{i}").into_bytes())
                .unwrap();
        }

        for i in 0..10u32 {
            assert_eq!(
                store.get(format!("k{i}").as_bytes()).unwrap(),
                Some(format!("v{i}").into_bytes())
            );
        }
    }

    #[test]
    fn reopen_recovers_state_from_wal_and_sstables() {
        let tmp = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.memtable_limit = 4;

        {
            let store = Store::open(tmp.path(), config.clone()).unwrap();
            for i in 0..6u32 {
                store
                    .put(format!("k{i}").into_bytes(), format!("v{i}").into_bytes())
                    .unwrap();
            }
            store.remove(b"k0".to_vec()).unwrap();
        }

        let reopened = Store::open(tmp.path(), config).unwrap();
        assert_eq!(reopened.get(b"k0").unwrap(), None);
        for i in 1..6u32 {
            assert_eq!(
                reopened.get(format!("k{i}").as_bytes()).unwrap(),
                Some(format!("v{i}").into_bytes())
            );
        }
    }
}
