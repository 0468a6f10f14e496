//! Compaction trigger policy and the leveled k-way merge that moves data
//! from one level down into the next.
//!
//! # Trigger policy
//!
//! L0 compacts once it holds more than [`StoreConfig::l0_compaction_trigger`]
//! tables (it alone may exceed that count, since every flush lands there and
//! nothing else removes tables from it). Otherwise the first level `>= 1`
//! that holds more than [`StoreConfig::ln_compaction_trigger`] tables
//! compacts. Checked after every flush, and repeated until no level is over
//! its trigger, so one large flush can cascade through several levels in a
//! single call.
//!
//! # Merge
//!
//! All of the source level's tables (L0 tables can overlap arbitrarily, so
//! the whole level participates) plus any table in the next level down whose
//! key range overlaps them are merged with a min-heap k-way merge. Ties
//! (same key present in more than one input table) are broken
//! recency-first: a table from the source level always wins over a table
//! from the target level (the source is newer), and within the same level a
//! higher `file_id` wins (L0 is the only level where this can happen, since
//! every other level's tables hold disjoint ranges). A tombstone is dropped
//! from the output only when the target level is the deepest level that
//! currently exists — compacting into any shallower level must keep it, so
//! it continues to shadow the same key in a level further down.
//!
//! The merged output is re-chunked into fresh SSTables, sealing each one
//! once it would exceed [`StoreConfig::max_sstable_bytes`] on disk.
//!
//! # Locking
//!
//! The levels lock is taken exclusively twice, briefly, rather than once for
//! the whole operation: once to snapshot the inputs *by cloning their
//! metadata* and mark the source level as compacting (so a concurrent call
//! doesn't pick the same level twice), and once more, after the merge, to
//! remove exactly the cloned inputs and insert the merged output. Between
//! those two critical sections — while the expensive k-way merge runs with
//! no lock held — `levels` still holds the original, untouched entries for
//! both the source and target level, so a concurrent `get` sees the
//! pre-compaction state exactly as if no compaction were in progress. Only
//! the final, atomic remove-and-insert makes the new state visible.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use tracing::info;

use crate::error::StoreError;
use crate::record::Record;
use crate::sstable::iterator::SstIterator;
use crate::sstable::writer::write_sstable;
use crate::sstable::SstMeta;
use crate::store::Store;

impl Store {
    /// Runs compaction until no level is over its trigger threshold.
    /// Recursive by construction: compacting L0 into L1 can push L1 over
    /// its own threshold, which this loop catches on the next iteration.
    pub(crate) fn maybe_compact(&self) -> Result<(), StoreError> {
        while let Some(level) = self.pick_compaction_level()? {
            self.compact_level(level)?;
        }
        Ok(())
    }

    fn pick_compaction_level(&self) -> Result<Option<usize>, StoreError> {
        let guard = self
            .levels
            .read()
            .map_err(|_| StoreError::Internal("levels lock poisoned".into()))?;

        if guard.levels.first().map_or(0, |l0| l0.len()) > self.config().l0_compaction_trigger
            && !guard.active_compactions.contains(&0)
        {
            return Ok(Some(0));
        }

        for (level, tables) in guard.levels.iter().enumerate().skip(1) {
            if tables.len() > self.config().ln_compaction_trigger
                && !guard.active_compactions.contains(&level)
            {
                return Ok(Some(level));
            }
        }

        Ok(None)
    }

    fn compact_level(&self, source_level: usize) -> Result<(), StoreError> {
        let target_level = source_level + 1;

        let (source_tables, target_tables) = {
            let mut guard = self
                .levels
                .write()
                .map_err(|_| StoreError::Internal("levels lock poisoned".into()))?;

            if guard.active_compactions.contains(&source_level) {
                // Lost a race with another thread: both saw this level over
                // its trigger in pick_compaction_level before either of them
                // registered it here. Whichever got here first owns the
                // compaction; this call is a no-op.
                return Ok(());
            }

            // Snapshot by cloning, never by removing: the originals stay in
            // `levels` — visible to concurrent reads — until the merge below
            // has finished and this level's tables are swapped in atomically.
            let source_tables: Vec<SstMeta> = guard.level_mut(source_level).clone();
            if source_tables.is_empty() {
                // Nothing to do. Can't happen from a fresh trigger check, but
                // guards key_range below against an empty slice regardless.
                return Ok(());
            }
            guard.active_compactions.insert(source_level);

            let (lo, hi) = key_range(&source_tables);
            let target_tables: Vec<SstMeta> = guard
                .level_mut(target_level)
                .iter()
                .filter(|meta| !(meta.max_key < lo || meta.min_key > hi))
                .cloned()
                .collect();

            (source_tables, target_tables)
        };

        // The deepest level overall determines whether this merge is the
        // last chance to drop a tombstone permanently.
        let deepest_level = {
            let guard = self
                .levels
                .read()
                .map_err(|_| StoreError::Internal("levels lock poisoned".into()))?;
            guard.levels.len().saturating_sub(1).max(target_level)
        };
        let is_bottom = target_level >= deepest_level;

        let merged = merge_tables(&source_tables, source_level, &target_tables, target_level)?;
        let elided: Vec<(Vec<u8>, Record)> = merged
            .into_iter()
            .filter(|(_, record)| !(is_bottom && record.is_dead()))
            .collect();

        let mut new_tables = Vec::new();
        for batch in chunk_by_size(&elided, self.config().max_sstable_bytes) {
            if batch.is_empty() {
                continue;
            }
            let file_id = self.next_file_id();
            let meta = write_sstable(
                self.dir(),
                target_level,
                file_id,
                batch,
                self.config().bloom_k_sstable,
            )?;
            new_tables.push(meta);
        }

        let mut to_delete: Vec<std::path::PathBuf> =
            source_tables.iter().map(|m| m.path.clone()).collect();
        to_delete.extend(target_tables.iter().map(|m| m.path.clone()));

        let source_ids: HashSet<u64> = source_tables.iter().map(|m| m.file_id).collect();
        let target_ids: HashSet<u64> = target_tables.iter().map(|m| m.file_id).collect();

        {
            let mut guard = self
                .levels
                .write()
                .map_err(|_| StoreError::Internal("levels lock poisoned".into()))?;

            // Remove exactly the tables this merge consumed and insert the
            // output, together, under the one lock acquisition: this is the
            // only point where the pre- and post-compaction views of these
            // two levels differ for a concurrent reader.
            guard
                .level_mut(source_level)
                .retain(|m| !source_ids.contains(&m.file_id));
            let target = guard.level_mut(target_level);
            target.retain(|m| !target_ids.contains(&m.file_id));
            target.extend(new_tables);
            target.sort_by(|a, b| a.min_key.cmp(&b.min_key));

            guard.active_compactions.remove(&source_level);
        }

        for path in &to_delete {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove compacted SSTable");
            }
        }

        info!(
            source_level,
            target_level,
            inputs = source_tables.len() + target_tables.len(),
            "compacted level"
        );
        Ok(())
    }
}

fn key_range(tables: &[SstMeta]) -> (Vec<u8>, Vec<u8>) {
    let mut lo = tables[0].min_key.clone();
    let mut hi = tables[0].max_key.clone();
    for t in &tables[1..] {
        if t.min_key < lo {
            lo = t.min_key.clone();
        }
        if t.max_key > hi {
            hi = t.max_key.clone();
        }
    }
    (lo, hi)
}

/// One input table's current position in the merge, ordered so that
/// [`BinaryHeap`] (a max-heap) pops the entry that should come *first* in
/// the output: smallest key, and among equal keys, the most recent source.
struct HeapEntry {
    key: Vec<u8>,
    record: Record,
    level: usize,
    file_id: u64,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse key order so the heap pops the smallest key first.
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.recency_rank().cmp(&other.recency_rank()))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl HeapEntry {
    /// Higher rank wins ties on the same key: a lower source level is newer
    /// (source always outranks target), and within the same level a higher
    /// `file_id` is newer.
    fn recency_rank(&self) -> (std::cmp::Reverse<usize>, u64) {
        (std::cmp::Reverse(self.level), self.file_id)
    }
}

/// Merges `source` (from `source_level`) and `target` (from `target_level`)
/// into a single sorted, de-duplicated stream, keeping only the most recent
/// record for each distinct key.
fn merge_tables(
    source: &[SstMeta],
    source_level: usize,
    target: &[SstMeta],
    target_level: usize,
) -> Result<Vec<(Vec<u8>, Record)>, StoreError> {
    let mut iters: Vec<SstIterator> = Vec::with_capacity(source.len() + target.len());
    let mut levels = Vec::with_capacity(iters.capacity());
    let mut file_ids = Vec::with_capacity(iters.capacity());

    for meta in source {
        iters.push(SstIterator::open(&meta.path)?);
        levels.push(source_level);
        file_ids.push(meta.file_id);
    }
    for meta in target {
        iters.push(SstIterator::open(&meta.path)?);
        levels.push(target_level);
        file_ids.push(meta.file_id);
    }

    let mut heap = BinaryHeap::new();
    for (i, it) in iters.iter().enumerate() {
        if let Some(key) = it.key() {
            heap.push(HeapEntry {
                key: key.to_vec(),
                record: it.record().unwrap().clone(),
                level: levels[i],
                file_id: file_ids[i],
                source: i,
            });
        }
    }

    let mut out: Vec<(Vec<u8>, Record)> = Vec::new();
    while let Some(top) = heap.pop() {
        let source_idx = top.source;
        iters[source_idx].advance()?;
        if let Some(key) = iters[source_idx].key() {
            heap.push(HeapEntry {
                key: key.to_vec(),
                record: iters[source_idx].record().unwrap().clone(),
                level: levels[source_idx],
                file_id: file_ids[source_idx],
                source: source_idx,
            });
        }

        match out.last() {
            Some((last_key, _)) if *last_key == top.key => {
                // Same key already emitted by a more recent source; later
                // (older) duplicates are dropped.
            }
            _ => out.push((top.key, top.record)),
        }
    }

    Ok(out)
}

/// Splits `entries` into batches, sealing a batch once its accumulated
/// on-disk size (estimated from key and value lengths) would exceed
/// `max_bytes`.
fn chunk_by_size(entries: &[(Vec<u8>, Record)], max_bytes: u64) -> Vec<&[(Vec<u8>, Record)]> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut running: u64 = 0;

    for (i, (key, record)) in entries.iter().enumerate() {
        let size = record_size(key, record);
        if running + size > max_bytes && i > start {
            batches.push(&entries[start..i]);
            start = i;
            running = 0;
        }
        running += size;
    }
    if start < entries.len() {
        batches.push(&entries[start..]);
    }
    batches
}

fn record_size(key: &[u8], record: &Record) -> u64 {
    let value_len = match record {
        Record::Live(v) => v.len(),
        Record::Dead => 0,
    };
    (4 + key.len() + 1 + 4 + value_len) as u64
}

#[cfg(test)]
mod tests {
    use crate::store::{Store, StoreConfig};
    use tempfile::TempDir;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn l0_compaction_triggers_and_preserves_latest_values() {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.memtable_limit = 2;
        config.l0_compaction_trigger = 2;
        let store = Store::open(tmp.path(), config).unwrap();

        for batch in 0..6 {
            for i in 0..2u32 {
                let key = format!("k{}", batch * 2 + i);
                store.put(key.into_bytes(), format!("v{batch}").into_bytes()).unwrap();
            }
        }

        for batch in 0..6 {
            for i in 0..2u32 {
                let key = format!("k{}", batch * 2 + i);
                assert_eq!(
                    store.get(key.as_bytes()).unwrap(),
                    Some(format!("v{batch}").into_bytes())
                );
            }
        }
    }

    #[test]
    fn deleted_key_stays_invisible_across_compaction() {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.memtable_limit = 2;
        config.l0_compaction_trigger = 1;
        let store = Store::open(tmp.path(), config).unwrap();

        store.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        store.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        store.remove(b"a".to_vec()).unwrap();
        store.put(b"c".to_vec(), b"3".to_vec()).unwrap();
        store.put(b"d".to_vec(), b"4".to_vec()).unwrap();

        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn compact_level_already_claimed_by_another_caller_is_a_no_op() {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.memtable_limit = 2;
        config.l0_compaction_trigger = 1;
        let store = Store::open(tmp.path(), config).unwrap();

        store.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        store.put(b"b".to_vec(), b"2".to_vec()).unwrap();

        // Simulate the race from pick_compaction_level: another thread has
        // already registered level 0 as mid-compaction by the time this
        // caller takes the write lock.
        {
            let mut guard = store.levels.write().unwrap();
            guard.active_compactions.insert(0);
        }

        // Must return cleanly rather than re-claiming and double-draining
        // the level out from under the first caller.
        store.compact_level(0).unwrap();

        {
            let guard = store.levels.read().unwrap();
            assert_eq!(guard.levels[0].len(), 1, "a no-op must not touch L0's tables");
        }
    }

    #[test]
    fn compact_level_on_an_empty_level_does_not_panic() {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path(), StoreConfig::default()).unwrap();

        // Level 0 is empty (nothing has ever been flushed); key_range must
        // never be reached with an empty slice.
        store.compact_level(0).unwrap();

        let guard = store.levels.read().unwrap();
        assert!(!guard.active_compactions.contains(&0));
    }
}
