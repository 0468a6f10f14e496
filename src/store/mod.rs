//! The top-level embeddable store: ties the write-ahead log, memtable, and
//! on-disk SSTable levels together behind `put`/`get`/`remove`.
//!
//! # Concurrency model
//!
//! Three independently-scoped locks, not one coarse lock over the whole
//! store:
//!
//! - [`crate::wal::Wal`] holds its own `Mutex<File>`.
//! - [`crate::memtable::MemTable`] holds its own `RwLock` over the sorted
//!   map.
//! - [`Store::levels`] is an `RwLock<LevelsState>` covering the on-disk
//!   level lists plus the set of levels currently mid-compaction.
//!
//! This split matters specifically for compaction: the expensive k-way
//! merge runs with the levels lock released, and only re-acquires it
//! (exclusively) to swap in the merged output. A single lock over the whole
//! store would force every read and write to block for the duration of a
//! compaction; three independent locks let reads and writes proceed against
//! the memtable and WAL while a compaction elsewhere is merging SSTables.

pub mod compaction;
pub mod read;
pub mod write;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::info;

use crate::bloom::{K_SSTABLE, K_TRANSIENT};
use crate::error::StoreError;
use crate::memtable::MemTable;
use crate::sstable::reader::load_all;
use crate::sstable::{SstMeta, MAX_SSTABLE_SIZE};
use crate::wal::Wal;

const WAL_FILE_NAME: &str = "wal.log";

/// Tuning knobs for a [`Store`], modeled on the teacher engine's
/// `EngineConfig`. Unlike that engine (which selects among several
/// compaction strategies), `Store` implements exactly one leveled
/// compaction algorithm, so there is no strategy-selection field here.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of distinct keys the memtable may hold before it is flushed
    /// to a new L0 SSTable.
    pub memtable_limit: usize,

    /// Number of Bloom filter hash positions used for SSTable filters.
    pub bloom_k_sstable: u32,

    /// Number of Bloom filter hash positions used for transient,
    /// non-persisted filters (reserved for callers outside the store
    /// itself; `Store` always uses `bloom_k_sstable` for its own tables).
    pub bloom_k_transient: u32,

    /// Compaction triggers when L0 holds more than this many SSTables.
    pub l0_compaction_trigger: usize,

    /// Compaction triggers when any level `>= 1` holds more than this many
    /// SSTables.
    pub ln_compaction_trigger: usize,

    /// An SSTable output by compaction is sealed once it would exceed this
    /// many bytes on disk, starting a fresh output file instead.
    pub max_sstable_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memtable_limit: 1000,
            bloom_k_sstable: K_SSTABLE,
            bloom_k_transient: K_TRANSIENT,
            l0_compaction_trigger: 4,
            ln_compaction_trigger: 10,
            max_sstable_bytes: MAX_SSTABLE_SIZE,
        }
    }
}

/// On-disk SSTables, grouped by level, plus which levels currently have a
/// compaction in flight.
///
/// `levels[0]` (L0) holds overlapping key ranges ordered by `file_id`
/// descending (newest first), since a flush can overlap the range of any
/// earlier flush. `levels[n >= 1]` hold disjoint key ranges sorted by
/// `min_key` ascending, which is what makes binary search over a level
/// possible.
pub(crate) struct LevelsState {
    pub(crate) levels: Vec<Vec<SstMeta>>,
    pub(crate) active_compactions: HashSet<usize>,
}

impl LevelsState {
    fn level_mut(&mut self, level: usize) -> &mut Vec<SstMeta> {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Vec::new);
        }
        &mut self.levels[level]
    }
}

/// An embedded, persistent, ordered key-value store backed by an LSM-tree.
pub struct Store {
    dir: PathBuf,
    wal: Wal,
    memtable: MemTable,
    levels: RwLock<LevelsState>,
    next_file_id: AtomicU64,
    config: StoreConfig,
}

impl Store {
    /// Opens a store rooted at `dir`, creating it if it doesn't exist, and
    /// replaying the write-ahead log (including any leftover staging file
    /// from a flush interrupted by a crash) to reconstruct the last durable
    /// state.
    pub fn open<P: AsRef<Path>>(dir: P, config: StoreConfig) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let wal = Wal::open(dir.join(WAL_FILE_NAME))?;
        let memtable = MemTable::new();

        // Replay order matters: a staging file is strictly older than
        // whatever is in the active log (rotation always precedes new
        // writes to the fresh active log), so staging entries are applied
        // first.
        for (key, record) in wal.read_staging_if_present()? {
            apply_record(&memtable, key, record)?;
        }
        wal.clear_temp()?;

        for (key, record) in wal.read_all()? {
            apply_record(&memtable, key, record)?;
        }

        let mut flat = load_all(&dir, config.bloom_k_sstable)?;
        let max_level = flat.iter().map(|m| m.level).max().unwrap_or(0);
        let next_file_id = flat.iter().map(|m| m.file_id).max().map_or(0, |id| id + 1);

        let mut levels: Vec<Vec<SstMeta>> = (0..=max_level).map(|_| Vec::new()).collect();
        flat.sort_by(|a, b| a.level.cmp(&b.level));
        for meta in flat {
            levels[meta.level].push(meta);
        }
        for (level, tables) in levels.iter_mut().enumerate() {
            if level == 0 {
                tables.sort_by(|a, b| b.file_id.cmp(&a.file_id));
            } else {
                tables.sort_by(|a, b| a.min_key.cmp(&b.min_key));
            }
        }

        info!(
            path = %dir.display(),
            levels = levels.len(),
            memtable_keys = memtable.len()?,
            "opened store"
        );

        Ok(Self {
            dir,
            wal,
            memtable,
            levels: RwLock::new(LevelsState {
                levels,
                active_compactions: HashSet::new(),
            }),
            next_file_id: AtomicU64::new(next_file_id),
            config,
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn next_file_id(&self) -> u64 {
        self.next_file_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Closes the store: fsyncs and closes the WAL. Does not force a flush
    /// of the memtable to an SSTable — whatever hasn't crossed
    /// [`StoreConfig::memtable_limit`] yet is recovered from the WAL on the
    /// next [`Store::open`], the same as after an unclean shutdown.
    ///
    /// Unlike the teacher engine's `close` (which drains every frozen
    /// memtable to an SSTable before returning), this deliberately leaves
    /// the memtable as-is; an explicit [`Store::flush`] is the way to force
    /// that.
    pub fn close(&self) -> Result<(), StoreError> {
        self.wal.close()?;
        info!(path = %self.dir.display(), "closed store");
        Ok(())
    }
}

fn apply_record(
    memtable: &MemTable,
    key: Vec<u8>,
    record: crate::record::Record,
) -> Result<(), StoreError> {
    match record {
        crate::record::Record::Live(value) => memtable.put(key, value)?,
        crate::record::Record::Dead => memtable.remove(key)?,
    }
    Ok(())
}
