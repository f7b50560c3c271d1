//! RocksDB-backed store. Writes go straight to the database; RocksDB's WAL
//! handles durability.

use std::path::Path;

use anyhow::{Context, Result};
use rocksdb::{Direction, IteratorMode, Options, DB};

use crate::{Entry, Store};

pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    /// Open or create a RocksDB store at the given directory.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, db_path)
            .with_context(|| format!("opening RocksDB: {}", db_path.display()))?;
        tracing::debug!(path = %db_path.display(), "opened rocksdb store");
        Ok(Self { db })
    }
}

impl Store for RocksDbStore {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .get(path.as_bytes())
            .with_context(|| format!("RocksDB get: {path}"))
    }

    fn set(&self, path: &str, data: &[u8]) -> Result<()> {
        self.db
            .put(path.as_bytes(), data)
            .with_context(|| format!("RocksDB put: {path}"))
    }

    fn delete(&self, path: &str) -> Result<bool> {
        let existed = self.exists(path)?;
        if existed {
            self.db
                .delete(path.as_bytes())
                .with_context(|| format!("RocksDB delete: {path}"))?;
        }
        Ok(existed)
    }

    fn list(&self, prefix: &str, limit: Option<usize>, with_data: bool) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
            let (key, value) = item.context("iterating RocksDB entries")?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let path = String::from_utf8(key.to_vec()).context("non-UTF-8 key in store")?;
            out.push(Entry {
                path,
                data: with_data.then(|| value.to_vec()),
            });
        }
        Ok(out)
    }

    fn backend(&self) -> &'static str {
        "rocksdb"
    }
}
