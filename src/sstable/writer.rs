//! Flushes a sorted stream of `(key, record)` pairs into a new, immutable
//! SSTable file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::bloom::BloomFilter;
use crate::record::{self, Record};
use crate::sstable::{sst_filename, IndexEntry, SstMeta, BLOCK_SIZE};

#[derive(Debug, Error)]
pub enum SstWriteError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot write an empty SSTable")]
    EmptyInput,
}

/// Writes `entries` (already sorted by key, one entry per distinct key) as a
/// new SSTable at `level`/`file_id` under `dir`, via an atomic
/// write-to-temp-then-rename.
///
/// `bloom_k` selects the number of Bloom filter hash positions
/// ([`crate::bloom::K_SSTABLE`] in production use;
/// [`crate::bloom::K_TRANSIENT`] is reserved for transient, non-SSTable
/// filters and never passed here).
pub fn write_sstable(
    dir: &Path,
    level: usize,
    file_id: u64,
    entries: &[(Vec<u8>, Record)],
    bloom_k: u32,
) -> Result<SstMeta, SstWriteError> {
    if entries.is_empty() {
        return Err(SstWriteError::EmptyInput);
    }

    let final_path = dir.join(sst_filename(level, file_id));
    let tmp_path = tmp_path_for(&final_path);

    let mut bloom = BloomFilter::new(entries.len(), bloom_k);
    let mut index = Vec::new();

    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);

        for (i, (key, record)) in entries.iter().enumerate() {
            if i % BLOCK_SIZE == 0 {
                let offset = writer.stream_position()?;
                index.push(IndexEntry {
                    key: key.clone(),
                    offset,
                });
            }
            bloom.add(key);
            record::write_record(&mut writer, key, record)?;
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, &final_path)?;

    info!(
        path = %final_path.display(),
        level,
        file_id,
        records = entries.len(),
        "wrote SSTable"
    );

    Ok(SstMeta {
        path: final_path,
        level,
        file_id,
        min_key: entries.first().unwrap().0.clone(),
        max_key: entries.last().unwrap().0.clone(),
        index,
        bloom,
    })
}

fn tmp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    final_path.with_file_name(name)
}
