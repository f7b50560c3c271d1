//! kv-store: the vault's only persistence interface
//!
//! Three backends implement [`Store`]:
//!   - **memory**: a `BTreeMap`, lost on exit.
//!   - **file** (default): the same map, written through to a JSON file via temp+rename.
//!   - **rocksdb** (behind the `rocksdb` feature): write-through to RocksDB.
//!
//! No transactionality is offered across keys. Callers order their writes.

pub mod file;
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

use std::sync::Arc;

use anyhow::Result;
use kv_core::config::{expand_tilde, StoreBackend, VaultConfig};

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

/// One listed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    /// Present only when listed with data
    pub data: Option<Vec<u8>>,
}

/// Ordered key/value storage with prefix scans.
///
/// Paths are UTF-8 and compared bytewise, so zero-padded sequence numbers
/// list in application order.
pub trait Store: Send + Sync {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Remove a path. Returns whether it existed.
    fn delete(&self, path: &str) -> Result<bool>;

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.get(path)?.is_some())
    }

    /// Entries whose path starts with `prefix`, ordered by path.
    fn list(&self, prefix: &str, limit: Option<usize>, with_data: bool) -> Result<Vec<Entry>>;

    /// Short backend name for status output.
    fn backend(&self) -> &'static str;
}

/// Open the store described by `[vault]` config.
pub fn open_store(config: &VaultConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::File => Ok(Arc::new(FileStore::open(&expand_tilde(&config.path))?)),
        #[cfg(feature = "rocksdb")]
        StoreBackend::Rocksdb => Ok(Arc::new(RocksDbStore::open(&expand_tilde(&config.path))?)),
        #[cfg(not(feature = "rocksdb"))]
        StoreBackend::Rocksdb => {
            anyhow::bail!("rocksdb store requested but kv-store was built without the `rocksdb` feature")
        }
    }
}

/// Scan a sorted map, shared by the in-memory backends.
pub(crate) fn scan<'a, I>(iter: I, prefix: &str, limit: Option<usize>, with_data: bool) -> Vec<Entry>
where
    I: Iterator<Item = (&'a String, &'a Vec<u8>)>,
{
    iter.skip_while(|(k, _)| k.as_str() < prefix)
        .take_while(|(k, _)| k.starts_with(prefix))
        .take(limit.unwrap_or(usize::MAX))
        .map(|(k, v)| Entry {
            path: k.clone(),
            data: with_data.then(|| v.clone()),
        })
        .collect()
}
