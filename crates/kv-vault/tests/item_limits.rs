//! Item validation at the vault boundary.

mod common;

use std::sync::Arc;

use common::{data, device_with, password};
use kv_core::types::{MAX_DATA_LEN, MAX_ID_LEN, MAX_TYPE_LEN};
use kv_core::{Hierarchical, Item, VaultError};
use kv_remote::MemoryRemote;
use kv_store::{MemoryStore, Store};

fn paths(store: &MemoryStore) -> Vec<String> {
    store
        .list("", None, false)
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .collect()
}

#[test]
fn oversized_items_never_reach_the_store() {
    let remote = Arc::new(MemoryRemote::new());
    let (store, vault) = device_with(&remote, Arc::new(Hierarchical));
    vault.setup_password(&password("p1")).unwrap();
    let before = paths(&store);
    let pending = vault.sync_status().unwrap().pending;

    let oversized = [
        Item::new("big", vec![0u8; MAX_DATA_LEN + 1], ""),
        Item::new("i".repeat(MAX_ID_LEN + 1), "v", ""),
        Item::new("kind", "v", "t".repeat(MAX_TYPE_LEN + 1)),
    ];
    for item in &oversized {
        let err = vault.set(item).unwrap_err();
        assert!(matches!(err.root(), VaultError::ItemTooLarge(_)), "{err}");
    }

    assert_eq!(paths(&store), before);
    assert_eq!(vault.sync_status().unwrap().pending, pending);
    assert_eq!(data(&vault, "big"), None);

    vault
        .set(&Item::new("big", vec![0u8; MAX_DATA_LEN], ""))
        .unwrap();
    assert_eq!(data(&vault, "big").map(|d| d.len()), Some(MAX_DATA_LEN));
}

#[test]
fn empty_value_is_not_a_deletion() {
    let remote = Arc::new(MemoryRemote::new());
    let (_, vault) = device_with(&remote, Arc::new(Hierarchical));
    vault.setup_password(&password("p1")).unwrap();

    vault.set(&Item::new("note", Vec::new(), "text")).unwrap();
    assert_eq!(data(&vault, "note"), Some(Vec::new()));
    vault.delete("note").unwrap();

    let history = vault.history("note").unwrap();
    assert_eq!(history.len(), 2);
    assert!(!history[0].deleted);
    assert_eq!(history[0].item.kind, "text");
    assert!(history[1].deleted);
}
