//! JSON file store.
//!
//! The whole map lives in memory and every mutation is written through to
//! disk atomically (write temp, then rename). Values are base64 so the file
//! stays valid JSON for binary ciphertext.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::{scan, Entry, Store};

pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl FileStore {
    /// Load or create a store at the given path.
    /// If the file doesn't exist, starts empty; it is created on first write.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading store: {}", path.display()))?;
            let encoded: BTreeMap<String, String> = serde_json::from_str(&content)
                .with_context(|| format!("parsing store: {}", path.display()))?;
            encoded
                .into_iter()
                .map(|(k, v)| {
                    let bytes = STANDARD
                        .decode(&v)
                        .with_context(|| format!("decoding value for {k}"))?;
                    Ok((k, bytes))
                })
                .collect::<Result<BTreeMap<_, _>>>()?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "opened file store");

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, Vec<u8>>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store dir: {}", parent.display()))?;
        }

        let encoded: BTreeMap<&str, String> = entries
            .iter()
            .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
            .collect();
        let json = serde_json::to_string_pretty(&encoded).context("serializing store")?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)
            .with_context(|| format!("writing store temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming store: {}", self.path.display()))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("file store lock poisoned"))
    }
}

impl Store for FileStore {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(path).cloned())
    }

    fn set(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut entries = self.lock()?;
        let previous = entries.insert(path.to_string(), data.to_vec());
        if let Err(e) = self.flush(&entries) {
            // keep memory consistent with disk
            match previous {
                Some(v) => entries.insert(path.to_string(), v),
                None => entries.remove(path),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<bool> {
        let mut entries = self.lock()?;
        let Some(previous) = entries.remove(path) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&entries) {
            entries.insert(path.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(path))
    }

    fn list(&self, prefix: &str, limit: Option<usize>, with_data: bool) -> Result<Vec<Entry>> {
        let entries = self.lock()?;
        Ok(scan(
            entries.range(prefix.to_string()..),
            prefix,
            limit,
            with_data,
        ))
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/vault.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set("/item/a", &[0, 159, 146, 150]).unwrap();
            store.set("/push/000000000000001/item/a", b"").unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("/item/a").unwrap(), Some(vec![0, 159, 146, 150]));
        assert_eq!(
            store.get("/push/000000000000001/item/a").unwrap(),
            Some(Vec::new())
        );
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_delete_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let store = FileStore::open(&path).unwrap();
        store.set("/a", b"1").unwrap();
        assert!(store.delete("/a").unwrap());
        assert!(!store.delete("/a").unwrap());
        drop(store);

        let store = FileStore::open(&path).unwrap();
        assert!(!store.exists("/a").unwrap());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileStore::open(&path).is_err());
    }
}
