//! A single-pass forward cursor over one SSTable's records, used by
//! compaction to drive its k-way merge without loading whole tables into
//! memory.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::record::{self, Record};

/// Walks an SSTable's records from front to back in key order. Holds one
/// buffered record ahead of the cursor so `key()`/`value()` can be peeked
/// without consuming it.
pub struct SstIterator {
    reader: BufReader<File>,
    current: Option<(Vec<u8>, Record)>,
}

impl SstIterator {
    /// Opens `path` and primes the cursor on its first record.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let current = record::read_record(&mut reader)?;
        Ok(Self { reader, current })
    }

    /// `true` while there is a record to read.
    pub fn has_next(&self) -> bool {
        self.current.is_some()
    }

    /// The key at the current cursor position.
    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    /// The record at the current cursor position.
    pub fn record(&self) -> Option<&Record> {
        self.current.as_ref().map(|(_, r)| r)
    }

    /// Consumes the current record and advances to the next one.
    pub fn advance(&mut self) -> io::Result<()> {
        self.current = record::read_record(&mut self.reader)?;
        Ok(())
    }

    /// Consumes and returns the current `(key, record)` pair, advancing the
    /// cursor past it.
    pub fn take(&mut self) -> io::Result<Option<(Vec<u8>, Record)>> {
        let taken = self.current.take();
        self.current = record::read_record(&mut self.reader)?;
        Ok(taken)
    }
}
