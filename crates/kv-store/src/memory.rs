use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;

use crate::{scan, Entry, Store};

/// Process-local store. Used by tests and `backend = "memory"`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("memory store lock poisoned")
}

impl Store for MemoryStore {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().map_err(poisoned)?.get(path).cloned())
    }

    fn set(&self, path: &str, data: &[u8]) -> Result<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<bool> {
        Ok(self.entries.write().map_err(poisoned)?.remove(path).is_some())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.entries.read().map_err(poisoned)?.contains_key(path))
    }

    fn list(&self, prefix: &str, limit: Option<usize>, with_data: bool) -> Result<Vec<Entry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(scan(
            entries.range(prefix.to_string()..),
            prefix,
            limit,
            with_data,
        ))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
