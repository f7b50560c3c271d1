//! Typed access to the store through the active path layout.

use std::sync::Arc;

use kv_core::{Collection, Entity, PathLayout, VaultError, VaultResult};
use kv_store::{Entry, Store};

#[derive(Clone)]
pub struct Db {
    store: Arc<dyn Store>,
    layout: Arc<dyn PathLayout>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("store", &self.store.backend())
            .field("layout", &self.layout.name())
            .finish()
    }
}

impl Db {
    pub fn new(store: Arc<dyn Store>, layout: Arc<dyn PathLayout>) -> Self {
        Self { store, layout }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn layout(&self) -> &dyn PathLayout {
        self.layout.as_ref()
    }

    pub fn path(&self, entity: Entity<'_>) -> String {
        self.layout.path_for(entity)
    }

    pub fn get(&self, entity: Entity<'_>) -> VaultResult<Option<Vec<u8>>> {
        Ok(self.store.get(&self.path(entity))?)
    }

    pub fn set(&self, entity: Entity<'_>, data: &[u8]) -> VaultResult<()> {
        Ok(self.store.set(&self.path(entity), data)?)
    }

    pub fn delete(&self, entity: Entity<'_>) -> VaultResult<bool> {
        Ok(self.store.delete(&self.path(entity))?)
    }

    pub fn exists(&self, entity: Entity<'_>) -> VaultResult<bool> {
        Ok(self.store.exists(&self.path(entity))?)
    }

    /// Ids in a collection, in path order.
    pub fn ids(&self, collection: Collection) -> VaultResult<Vec<String>> {
        let entries = self
            .store
            .list(&self.layout.prefix(collection), None, false)?;
        Ok(entries
            .into_iter()
            .filter_map(|e| self.layout.id_from(collection, &e.path))
            .collect())
    }

    /// `(id, data)` pairs in a collection, in path order.
    pub fn entries(&self, collection: Collection) -> VaultResult<Vec<(String, Vec<u8>)>> {
        let entries = self
            .store
            .list(&self.layout.prefix(collection), None, true)?;
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                let id = self.layout.id_from(collection, &e.path)?;
                Some((id, e.data.unwrap_or_default()))
            })
            .collect())
    }

    /// Raw entries of a push or pull log, in sequence order.
    pub fn log(&self, log: Collection) -> VaultResult<Vec<Entry>> {
        Ok(self.store.list(&self.layout.prefix(log), None, true)?)
    }

    pub fn get_u64(&self, entity: Entity<'_>) -> VaultResult<Option<u64>> {
        let path = self.path(entity);
        match self.store.get(&path)? {
            None => Ok(None),
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .map(Some)
                .ok_or_else(|| VaultError::corrupt(&path, "expected a decimal integer")),
        }
    }

    pub fn set_u64(&self, entity: Entity<'_>, value: u64) -> VaultResult<()> {
        self.set(entity, value.to_string().as_bytes())
    }
}
