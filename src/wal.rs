//! The write-ahead log: every mutation is appended here before it is applied
//! to the memtable, so a crash between the two can always be recovered from
//! by replaying the log.
//!
//! Records use the same framing as SSTables (see [`crate::record`]), with no
//! checksum, header, or footer. Durability against torn writes comes from
//! ordering discipline in [`crate::store`], not from on-disk integrity
//! metadata: the store rotates the log to a staging file before writing a
//! fresh SSTable, and only removes the staging file once that SSTable is
//! durable on disk, so a staging file left behind after a crash is always
//! safe (and necessary) to replay.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{info, trace, warn};

use crate::record::{self, Record};

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("WAL lock poisoned")]
    Poisoned,
}

/// An append-only log of `(key, record)` pairs backed by a single active
/// file plus, transiently, a staging file left over from an in-progress
/// rotation.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Wal {
    /// Opens (creating if necessary) the WAL file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        info!(path = %path.display(), "opened WAL");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Appends one `(key, record)` pair and flushes it to disk before
    /// returning, so a successful call guarantees the write survives a
    /// crash.
    pub fn write(&self, key: &[u8], record: &Record) -> Result<(), WalError> {
        let mut guard = self.file.lock().map_err(|_| WalError::Poisoned)?;
        record::write_record(&mut *guard, key, record)?;
        guard.sync_all()?;
        trace!(key_len = key.len(), "appended WAL record");
        Ok(())
    }

    /// Reads every `(key, record)` pair currently in the active log, in
    /// append order.
    pub fn read_all(&self) -> Result<Vec<(Vec<u8>, Record)>, WalError> {
        let mut guard = self.file.lock().map_err(|_| WalError::Poisoned)?;
        guard.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut *guard);

        let mut out = Vec::new();
        while let Some(pair) = record::read_record(&mut reader)? {
            out.push(pair);
        }
        Ok(out)
    }

    /// Rotates the active log out of the way into a staging file and opens a
    /// fresh, empty active log in its place. Called before a memtable flush
    /// begins writing a new SSTable, so that the records being flushed stay
    /// recoverable (from the staging file) until the SSTable is durable.
    ///
    /// If a staging file already exists, this is a logic error in the
    /// caller: rotation must not be attempted again until [`Wal::clear_temp`]
    /// has been called for the previous one.
    pub fn rotate(&self) -> Result<(), WalError> {
        let staging = self.staging_path();
        if staging.exists() {
            warn!(path = %staging.display(), "rotate called with a staging file already present");
        }

        let mut guard = self.file.lock().map_err(|_| WalError::Poisoned)?;
        std::fs::rename(&self.path, &staging)?;
        *guard = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        info!(staging = %staging.display(), "rotated WAL");
        Ok(())
    }

    /// Removes the staging file left behind by [`Wal::rotate`], once its
    /// contents have been durably flushed into an SSTable. Idempotent: a
    /// missing staging file is not an error.
    pub fn clear_temp(&self) -> Result<(), WalError> {
        match std::fs::remove_file(self.staging_path()) {
            Ok(()) => {
                trace!("cleared WAL staging file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads every `(key, record)` pair from the staging file left behind by
    /// a rotation that never completed (a crash between [`Wal::rotate`] and
    /// [`Wal::clear_temp`]). Returns an empty vec if no staging file exists.
    pub fn read_staging_if_present(&self) -> Result<Vec<(Vec<u8>, Record)>, WalError> {
        let staging = self.staging_path();
        let file = match File::open(&staging) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        warn!(path = %staging.display(), "recovering from WAL staging file left by an interrupted flush");

        let mut reader = BufReader::new(file);
        let mut out = Vec::new();
        while let Some(pair) = record::read_record(&mut reader)? {
            out.push(pair);
        }
        Ok(out)
    }

    /// Fsyncs the active log one last time. Does not remove or truncate
    /// anything — a closed [`Wal`] can still be reopened (or replayed via a
    /// fresh [`Wal::open`]) exactly like one that was never explicitly
    /// closed; this just guarantees nothing is left buffered in the OS page
    /// cache rather than on disk.
    pub fn close(&self) -> Result<(), WalError> {
        let guard = self.file.lock().map_err(|_| WalError::Poisoned)?;
        guard.sync_all()?;
        info!(path = %self.path.display(), "closed WAL");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Writes `records` to a fresh file at `path`, used by tests to seed a WAL
/// without going through [`Wal::write`] one record at a time.
#[cfg(test)]
fn write_all_for_test(path: &Path, records: &[(Vec<u8>, Record)]) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    for (key, record) in records {
        record::write_record(&mut writer, key, record)?;
    }
    Ok(())
}
