#![allow(dead_code)]

use std::sync::Arc;

use kv_core::{Hierarchical, PathLayout};
use kv_crypto::KdfParams;
use kv_remote::{MemoryRemote, Remote};
use kv_store::MemoryStore;
use kv_vault::{Vault, VaultOptions};
use secrecy::SecretString;

/// Argon2id parameters small enough for tests.
pub fn fast_kdf() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

pub fn password(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

pub fn device(remote: &Arc<MemoryRemote>) -> Vault {
    device_with(remote, Arc::new(Hierarchical)).1
}

/// A vault on its own store sharing `remote`. The store is returned so tests
/// can inspect raw records.
pub fn device_with(
    remote: &Arc<MemoryRemote>,
    layout: Arc<dyn PathLayout>,
) -> (Arc<MemoryStore>, Vault) {
    let store = Arc::new(MemoryStore::new());
    let vault = Vault::open(
        store.clone(),
        VaultOptions {
            layout,
            remote: Some(remote.clone() as Arc<dyn Remote>),
            kdf: fast_kdf(),
        },
    );
    (store, vault)
}

pub fn data(vault: &Vault, id: &str) -> Option<Vec<u8>> {
    vault.get(id).unwrap().map(|item| item.data.clone())
}
