//! The error type returned at the public API boundary, wrapping every
//! subsystem's own error enum.

use thiserror::Error;

use crate::memtable::MemtableError;
use crate::sstable::reader::SstReadError;
use crate::sstable::writer::SstWriteError;
use crate::wal::WalError;

/// Errors that can occur during [`crate::store::Store`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error originating from the write-ahead log.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// Error originating from the memtable.
    #[error("memtable error: {0}")]
    Memtable(#[from] MemtableError),

    /// Error writing a new SSTable.
    #[error("SSTable write error: {0}")]
    SstWrite(#[from] SstWriteError),

    /// Error reading an existing SSTable.
    #[error("SSTable read error: {0}")]
    SstRead(#[from] SstReadError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation (poisoned lock, unexpected state, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}
