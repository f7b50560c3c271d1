//! Pending-push log.
//!
//! Every mutation of an item, auth or provision record is first appended to
//! `push/<seq>/<canonical path>` and only then applied to the store, so a
//! crash between the two loses nothing that was acknowledged.

use std::sync::Arc;

use kv_core::paths::canonical_path;
use kv_core::{Collection, SyncedKind, VaultResult};

use crate::db::Db;
use crate::sequence::Sequencer;

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Store key of the log entry
    pub key: String,
    pub seq: String,
    /// Canonical path of the mutated record
    pub path: String,
    /// New bytes; empty for a delete
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct PendingQueue {
    db: Db,
    seq: Arc<Sequencer>,
}

impl PendingQueue {
    pub fn new(db: Db, seq: Arc<Sequencer>) -> Self {
        Self { db, seq }
    }

    /// Append one mutation by canonical path.
    pub fn record(&self, canonical: &str, data: &[u8]) -> VaultResult<String> {
        let seq = self.seq.increment()?;
        let key = self.db.layout().log_path(Collection::Push, &seq, canonical);
        self.db.store().set(&key, data)?;
        Ok(key)
    }

    /// Queue then apply a write.
    pub fn mirror_set(&self, kind: SyncedKind, id: &str, data: &[u8]) -> VaultResult<()> {
        self.record(&canonical_path(kind, id), data)?;
        self.db.set(kind.entity(id), data)
    }

    /// Queue then apply a delete.
    pub fn mirror_delete(&self, kind: SyncedKind, id: &str) -> VaultResult<bool> {
        self.record(&canonical_path(kind, id), &[])?;
        self.db.delete(kind.entity(id))
    }

    /// All queued mutations in sequence order.
    pub fn list(&self) -> VaultResult<Vec<PendingEntry>> {
        let layout = self.db.layout();
        Ok(self
            .db
            .log(Collection::Push)?
            .into_iter()
            .filter_map(|e| {
                let (seq, path) = layout.split_log(Collection::Push, &e.path)?;
                Some(PendingEntry {
                    seq: seq.to_string(),
                    path: path.to_string(),
                    data: e.data.clone().unwrap_or_default(),
                    key: e.path,
                })
            })
            .collect())
    }

    pub fn len(&self) -> VaultResult<usize> {
        Ok(self.list()?.len())
    }

    pub fn is_empty(&self) -> VaultResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop consumed entries.
    pub fn remove(&self, entries: &[PendingEntry]) -> VaultResult<()> {
        for entry in entries {
            self.db.store().delete(&entry.key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_core::{Hierarchical, LegacyFlat, PathLayout};
    use kv_store::{MemoryStore, Store};

    fn queue(layout: Arc<dyn PathLayout>) -> (Arc<MemoryStore>, PendingQueue) {
        let store = Arc::new(MemoryStore::new());
        let db = Db::new(store.clone(), layout);
        let seq = Arc::new(Sequencer::new(db.clone()));
        (store, PendingQueue::new(db, seq))
    }

    #[test]
    fn test_mirror_writes_log_then_record() {
        let (store, q) = queue(Arc::new(Hierarchical));
        q.mirror_set(SyncedKind::Item, "a", b"enc").unwrap();
        q.mirror_delete(SyncedKind::Item, "a").unwrap();

        assert_eq!(store.get("/item/a").unwrap(), None);
        let entries = q.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "/push/000000000000001/item/a");
        assert_eq!(entries[0].data, b"enc");
        assert_eq!(entries[1].path, "/item/a");
        assert!(entries[1].data.is_empty());
    }

    #[test]
    fn test_remove_consumed() {
        let (_, q) = queue(Arc::new(Hierarchical));
        q.mirror_set(SyncedKind::Auth, "p1", b"wrapped").unwrap();
        q.mirror_set(SyncedKind::Provision, "p1", b"{}").unwrap();
        let entries = q.list().unwrap();
        q.remove(&entries[..1]).unwrap();
        assert_eq!(q.list().unwrap(), entries[1..].to_vec());
    }

    #[test]
    fn test_legacy_layout_keeps_canonical_paths() {
        let (store, q) = queue(Arc::new(LegacyFlat));
        q.mirror_set(SyncedKind::Item, "github", b"enc").unwrap();
        assert_eq!(store.get("github").unwrap(), Some(b"enc".to_vec()));
        let entries = q.list().unwrap();
        assert_eq!(entries[0].key, "#push/000000000000001/item/github");
        assert_eq!(entries[0].path, "/item/github");
    }
}
