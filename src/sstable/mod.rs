//! Immutable, sorted, on-disk tables. Each SSTable is written once by
//! [`writer`] and never modified again; [`reader`] rebuilds its sparse index
//! and Bloom filter by scanning it once at open time, and [`iterator`]
//! provides the forward cursor compaction needs to merge tables together.
//!
//! # On-disk layout
//!
//! ```text
//! [key_len: u32 LE][key_bytes][tag: u8][value_len: u32 LE][value_bytes]
//! [key_len: u32 LE][key_bytes][tag: u8][value_len: u32 LE][value_bytes]
//! ...
//! ```
//!
//! Records appear in ascending key order. There is no header, footer, block
//! index, or checksum on disk — the sparse index and Bloom filter are pure
//! in-memory structures, rebuilt by a linear scan every time a table is
//! opened. This keeps the format and the write path as simple as possible at
//! the cost of a scan on every process restart; see `DESIGN.md`.

pub mod iterator;
pub mod reader;
pub mod writer;

use std::path::PathBuf;

/// Number of records between consecutive sparse index entries.
pub const BLOCK_SIZE: usize = 100;

/// An SSTable is sealed (and compaction starts a new output file) once its
/// on-disk size would exceed this many bytes.
pub const MAX_SSTABLE_SIZE: u64 = 2 * 1024 * 1024;

/// One entry in an SSTable's sparse index: the first key of a block and the
/// byte offset in the file where that block's first record begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub offset: u64,
}

/// Everything needed to serve reads against one on-disk SSTable without
/// re-reading it from scratch: its file handle location, the level and
/// monotonic id used to order it against siblings, and the in-memory
/// structures rebuilt at open time.
#[derive(Debug, Clone)]
pub struct SstMeta {
    pub path: PathBuf,
    pub level: usize,
    pub file_id: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub index: Vec<IndexEntry>,
    pub bloom: crate::bloom::BloomFilter,
}

impl SstMeta {
    /// Quick range check before consulting the Bloom filter or the index:
    /// a key outside `[min_key, max_key]` cannot be in this table.
    pub fn may_contain_range(&self, key: &[u8]) -> bool {
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}

/// Builds the on-disk filename for an SSTable at `level` with id `file_id`:
/// `level_<L>_<file_id>.sst`. Higher `file_id` values within the same level
/// are newer.
pub fn sst_filename(level: usize, file_id: u64) -> String {
    format!("level_{level}_{file_id}.sst")
}

/// Parses a filename produced by [`sst_filename`] back into `(level,
/// file_id)`. Returns `None` for anything that doesn't match the pattern,
/// which lets callers ignore unrelated files in the data directory.
pub fn parse_sst_filename(name: &str) -> Option<(usize, u64)> {
    let rest = name.strip_prefix("level_")?;
    let rest = rest.strip_suffix(".sst")?;
    let (level_str, file_id_str) = rest.split_once('_')?;
    let level = level_str.parse().ok()?;
    let file_id = file_id_str.parse().ok()?;
    Some((level, file_id))
}
