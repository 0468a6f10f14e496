//! `put`/`remove`, and the memtable-limit flush they trigger.

use tracing::info;

use crate::error::StoreError;
use crate::record::Record;
use crate::sstable::writer::write_sstable;
use crate::store::Store;

impl Store {
    /// Writes `key`/`value`, durable once this call returns.
    ///
    /// Ordering discipline: the WAL is appended and fsynced *before* the
    /// memtable is updated, so a crash between the two leaves the WAL with
    /// the authoritative copy of the write, replayed on the next
    /// [`Store::open`].
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.wal.write(&key, &Record::Live(value.clone()))?;
        self.memtable.put(key, value)?;
        self.maybe_flush()?;
        Ok(())
    }

    /// Marks `key` as deleted. Shadows any earlier value for that key in
    /// this memtable or in older SSTables; the tombstone itself is only
    /// dropped once compaction reaches the bottom level.
    pub fn remove(&self, key: Vec<u8>) -> Result<(), StoreError> {
        self.wal.write(&key, &Record::Dead)?;
        self.memtable.remove(key)?;
        self.maybe_flush()?;
        Ok(())
    }

    fn maybe_flush(&self) -> Result<(), StoreError> {
        if self.memtable.len()? < self.config().memtable_limit {
            return Ok(());
        }
        self.flush()
    }

    /// Flushes the current memtable to a new L0 SSTable, regardless of its
    /// size. Safe to call on an empty memtable (a no-op).
    ///
    /// Recovery ordering: the WAL is rotated to a staging file *before* the
    /// drained records are written to an SSTable, and the staging file is
    /// only cleared *after* that SSTable is durably renamed into place. A
    /// crash at any point in between leaves the staging file as the
    /// authoritative record of what must still be flushed.
    pub fn flush(&self) -> Result<(), StoreError> {
        // Rotate before draining: any put()/remove() that lands in between
        // goes to the fresh active log and the fresh (still-draining)
        // memtable, so the staging file ends up with exactly the records
        // this flush is about to write out, not a mix of this batch and the
        // next one.
        self.wal.rotate()?;
        let entries = self.memtable.drain()?;
        if entries.is_empty() {
            self.wal.clear_temp()?;
            return Ok(());
        }

        let file_id = self.next_file_id();
        let meta = write_sstable(
            self.dir(),
            0,
            file_id,
            &entries,
            self.config().bloom_k_sstable,
        )?;

        {
            let mut guard = self
                .levels
                .write()
                .map_err(|_| StoreError::Internal("levels lock poisoned".into()))?;
            guard.level_mut(0).insert(0, meta);
        }

        self.wal.clear_temp()?;

        info!(file_id, records = entries.len(), "flushed memtable to L0");

        self.maybe_compact()?;
        Ok(())
    }
}
