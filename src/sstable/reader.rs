//! Rebuilds an SSTable's sparse index and Bloom filter by scanning the file
//! once, and serves point lookups against an already-loaded table.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::bloom::BloomFilter;
use crate::record::{self, Record};
use crate::sstable::{IndexEntry, SstMeta, BLOCK_SIZE};

#[derive(Debug, Error)]
pub enum SstReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SSTable at {0} has no records")]
    Empty(std::path::PathBuf),
}

/// Scans `path` once, rebuilding its sparse index and Bloom filter.
///
/// Values are skipped rather than read (see [`crate::record::skip_record`]),
/// since neither the index nor the filter need them. Called once per table
/// when the store opens, never again for the lifetime of that table.
///
/// A file that ends mid-record (a crash during an SSTable write that
/// happened to survive the writer's atomic rename — e.g. a partially
/// flushed filesystem) is treated as unreadable: the caller should skip it
/// with a warning rather than fail the whole open.
pub fn load_index(
    path: &Path,
    level: usize,
    file_id: u64,
    bloom_k: u32,
) -> Result<SstMeta, SstReadError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut index = Vec::new();
    let mut min_key: Option<Vec<u8>> = None;
    let mut max_key: Option<Vec<u8>> = None;
    let mut keys = Vec::new();

    let mut count = 0usize;
    loop {
        let offset = reader.stream_position()?;
        match record::skip_record(&mut reader)? {
            Some(key) => {
                if count % BLOCK_SIZE == 0 {
                    index.push(IndexEntry {
                        key: key.clone(),
                        offset,
                    });
                }
                if min_key.is_none() {
                    min_key = Some(key.clone());
                }
                max_key = Some(key.clone());
                keys.push(key);
                count += 1;
            }
            None => break,
        }
    }

    let (min_key, max_key) = match (min_key, max_key) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(SstReadError::Empty(path.to_path_buf())),
    };

    let mut bloom = BloomFilter::new(keys.len(), bloom_k);
    for key in &keys {
        bloom.add(key);
    }

    Ok(SstMeta {
        path: path.to_path_buf(),
        level,
        file_id,
        min_key,
        max_key,
        index,
        bloom,
    })
}

/// Scans every `.sst` file directly under `dir`, rebuilding an [`SstMeta`]
/// for each. Files whose name doesn't match the `level_<L>_<file_id>.sst`
/// pattern are ignored; files that fail to decode (a torn write) are
/// skipped with a warning rather than aborting the whole open.
pub fn load_all(dir: &Path, bloom_k: u32) -> Result<Vec<SstMeta>, SstReadError> {
    let mut metas = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some((level, file_id)) = crate::sstable::parse_sst_filename(name) else {
            continue;
        };

        match load_index(&entry.path(), level, file_id, bloom_k) {
            Ok(meta) => metas.push(meta),
            Err(e) => {
                warn!(file = name, error = %e, "skipping unreadable SSTable at open");
            }
        }
    }

    Ok(metas)
}

/// Looks up `key` within an already-loaded SSTable, returning its current
/// [`Record`] if present.
///
/// Callers are expected to have already consulted `meta.bloom` and
/// `meta.may_contain_range` before calling this, since it always performs at
/// least one seek and a forward scan.
pub fn search(meta: &SstMeta, key: &[u8]) -> Result<Option<Record>, SstReadError> {
    if !meta.may_contain_range(key) {
        return Ok(None);
    }

    // Binary search the sparse index for the last entry whose key is <= the
    // target; that entry's offset starts a block that may contain `key`.
    let start_offset = match meta.index.partition_point(|e| e.key.as_slice() <= key) {
        0 => 0,
        n => meta.index[n - 1].offset,
    };

    let file = File::open(&meta.path)?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(start_offset))?;

    while let Some((found_key, record)) = record::read_record(&mut reader)? {
        if found_key.as_slice() == key {
            return Ok(Some(record));
        }
        if found_key.as_slice() > key {
            // Keys are sorted; once we've passed the target, it isn't here.
            break;
        }
    }

    Ok(None)
}
