//! The on-disk record format shared by the WAL and SSTables.
//!
//! Both [`crate::wal::Wal`] and [`crate::sstable`] persist the same framing:
//!
//! ```text
//! [key_len: u32 LE][key_bytes][tag: u8][value_len: u32 LE][value_bytes]
//! ```
//!
//! `tag == 0` is a live value (`value_len`/`value_bytes` follow); `tag == 1`
//! is a tombstone, and the value fields are omitted entirely. This replaces
//! the original design's sentinel value `TOMBSTONE`, which collides with a
//! live value that happens to equal that literal string — see `SPEC_FULL.md`.
//!
//! There is no header, no footer, and no checksum: on-disk integrity and
//! forward-compatible versioning are both explicitly out of scope.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

const TAG_LIVE: u8 = 0;
const TAG_DEAD: u8 = 1;

/// A single key's current value, as stored in the memtable, the WAL, and
/// SSTables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A live value.
    Live(Vec<u8>),
    /// A tombstone: the key has been deleted.
    Dead,
}

impl Record {
    /// Converts to the public `get` result: `None` for absent or dead,
    /// `Some(value)` for live.
    pub fn into_option(self) -> Option<Vec<u8>> {
        match self {
            Record::Live(v) => Some(v),
            Record::Dead => None,
        }
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Record::Dead)
    }
}

/// Writes `[key_len][key][tag][value_len?][value?]` to `w`.
pub fn write_record<W: Write>(w: &mut W, key: &[u8], record: &Record) -> io::Result<()> {
    w.write_u32::<LittleEndian>(key.len() as u32)?;
    w.write_all(key)?;
    match record {
        Record::Live(value) => {
            w.write_u8(TAG_LIVE)?;
            w.write_u32::<LittleEndian>(value.len() as u32)?;
            w.write_all(value)?;
        }
        Record::Dead => {
            w.write_u8(TAG_DEAD)?;
        }
    }
    Ok(())
}

/// Reads one `(key, record)` pair from `r`.
///
/// Returns `Ok(None)` on a clean EOF at a record boundary (no bytes could be
/// read for the key length at all). Any other short read is a genuine
/// `UnexpectedEof` I/O error, since it means a record was torn mid-write.
pub fn read_record<R: Read>(r: &mut R) -> io::Result<Option<(Vec<u8>, Record)>> {
    let key_len = match r.read_u32::<LittleEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut key = vec![0u8; key_len as usize];
    r.read_exact(&mut key)?;

    let tag = r.read_u8()?;
    let record = match tag {
        TAG_LIVE => {
            let value_len = r.read_u32::<LittleEndian>()?;
            let mut value = vec![0u8; value_len as usize];
            r.read_exact(&mut value)?;
            Record::Live(value)
        }
        TAG_DEAD => Record::Dead,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown record tag {other}"),
            ));
        }
    };

    Ok(Some((key, record)))
}

/// Skips one record in `r` without reading its value payload, returning the
/// decoded key. Used by [`crate::sstable::reader::load_index`], which only
/// needs keys (for the Bloom filter and sparse index), not values.
pub fn skip_record<R: Read + io::Seek>(r: &mut R) -> io::Result<Option<Vec<u8>>> {
    let key_len = match r.read_u32::<LittleEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut key = vec![0u8; key_len as usize];
    r.read_exact(&mut key)?;

    let tag = r.read_u8()?;
    match tag {
        TAG_LIVE => {
            let value_len = r.read_u32::<LittleEndian>()?;
            r.seek(io::SeekFrom::Current(value_len as i64))?;
        }
        TAG_DEAD => {}
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown record tag {other}"),
            ));
        }
    }

    Ok(Some(key))
}
