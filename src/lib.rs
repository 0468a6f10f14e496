//! # kvforge
//!
//! An embeddable, persistent, ordered key-value store built on a
//! **Log-Structured Merge Tree (LSM-tree)** architecture. Designed for
//! fast writes and crash-safe operation on a single process, single node.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      Store                           │
//! │  ┌────────────┐                   ┌─────────────┐   │
//! │  │  MemTable   │                   │  SSTables   │   │
//! │  │  + WAL      │   memtable_limit  │  L0 .. Ln   │   │
//! │  └─────┬───────┘ ───────flush────► └──────┬──────┘   │
//! │        │                                   │          │
//! │        │                                   ▼          │
//! │        │                       ┌───────────────────┐ │
//! │        │                       │    Compaction      │ │
//! │        │                       │  (leveled k-way    │ │
//! │        │                       │   merge)            │ │
//! │        │                       └───────────────────┘ │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`store`] | The `Store` handle — open, get, put, remove, compaction |
//! | [`memtable`] | In-memory sorted write buffer |
//! | [`wal`] | Write-ahead log for crash recovery |
//! | [`sstable`] | Immutable, sorted, on-disk tables with Bloom filters |
//! | [`bloom`] | Probabilistic set-membership filter |
//! | [`record`] | The on-disk record codec shared by the WAL and SSTables |
//! | [`error`] | The store-wide error type |
//!
//! ## Key properties
//!
//! - **Write-ahead logging** — every mutation is persisted to the WAL
//!   before being acknowledged, guaranteeing durability and crash recovery.
//! - **Tombstone deletes** — `remove` writes a tombstone rather than
//!   erasing data in place; the tombstone is only dropped once compaction
//!   reaches the level with no older data left to shadow.
//! - **Bloom filter lookups** — each SSTable carries a Bloom filter,
//!   rebuilt from a scan at open time, for fast negative point lookups.
//! - **Leveled compaction** — L0 holds overlapping flush output; L1 and
//!   below hold disjoint, sorted ranges, merged by a k-way compaction pass.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kvforge::store::{Store, StoreConfig};
//!
//! let store = Store::open("/tmp/my_db", StoreConfig::default()).unwrap();
//!
//! store.put(b"hello".to_vec(), b"world".to_vec()).unwrap();
//! assert_eq!(store.get(b"hello").unwrap(), Some(b"world".to_vec()));
//!
//! store.remove(b"hello".to_vec()).unwrap();
//! assert_eq!(store.get(b"hello").unwrap(), None);
//! ```

pub mod bloom;
pub mod error;
pub mod memtable;
pub mod record;
pub mod sstable;
pub mod store;
pub mod wal;

pub use error::StoreError;
pub use store::{Store, StoreConfig};
