//! Deleting the remote log and republishing the local history.

mod common;

use std::sync::Arc;

use common::{data, device, password};
use kv_core::{Item, RemoteError};
use kv_remote::{MemoryRemote, Remote};

async fn log_of(remote: &MemoryRemote, vault_id: &str) -> Vec<(String, Vec<u8>)> {
    remote
        .events(vault_id)
        .await
        .into_iter()
        .map(|e| (e.event.path.clone(), e.event.data.clone()))
        .collect()
}

#[tokio::test]
async fn resync_republishes_the_same_history() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device(&remote);
    a.setup_password(&password("p1")).unwrap();
    a.set(&Item::new("k1", "v1", "")).unwrap();
    a.set(&Item::new("k2", "v2", "")).unwrap();
    a.sync().await.unwrap();
    a.delete("k2").unwrap();
    a.set(&Item::new("k3", "v3", "")).unwrap();
    a.sync().await.unwrap();

    let old_id = a.remote_identity().unwrap().unwrap().vault_id();
    let old_log = log_of(&remote, &old_id).await;
    assert_eq!(old_log.len(), 6);

    assert_eq!(a.unsync().await.unwrap(), 6);
    let status = a.sync_status().unwrap();
    assert_eq!(status.vault_id, None);
    assert_eq!(status.synced_at, None);
    assert_eq!(status.index, 0);
    assert_eq!(status.pending, 6);
    assert!(matches!(
        remote.fetch(&old_id, 0).await,
        Err(RemoteError::Deleted)
    ));

    // local records are untouched
    assert_eq!(data(&a, "k1").as_deref(), Some(&b"v1"[..]));
    assert_eq!(data(&a, "k2"), None);
    assert_eq!(a.history("k2").unwrap().len(), 2);

    let report = a.sync().await.unwrap();
    assert_eq!(report.pushed, 6);
    let new_id = a.remote_identity().unwrap().unwrap().vault_id();
    assert_ne!(new_id, old_id);
    assert_eq!(log_of(&remote, &new_id).await, old_log);
    assert_eq!(a.sync_status().unwrap().pending, 0);
}

#[tokio::test]
async fn unsync_keeps_unpushed_changes_after_history() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device(&remote);
    a.setup_password(&password("p1")).unwrap();
    a.set(&Item::new("k1", "v1", "")).unwrap();
    a.sync().await.unwrap();
    a.set(&Item::new("k1", "v2", "")).unwrap();

    assert_eq!(a.unsync().await.unwrap(), 4);
    a.sync().await.unwrap();

    let history = a.history("k1").unwrap();
    let values: Vec<&[u8]> = history.iter().map(|v| v.item.data.as_slice()).collect();
    let expected: [&[u8]; 2] = [b"v1", b"v2"];
    assert_eq!(values, expected);
    assert_eq!(data(&a, "k1").as_deref(), Some(&b"v2"[..]));

    let b = device(&remote);
    b.clone_from(&a.remote_identity().unwrap().unwrap())
        .await
        .unwrap();
    b.unlock_password(&password("p1")).unwrap();
    assert_eq!(data(&b, "k1").as_deref(), Some(&b"v2"[..]));
}

#[tokio::test]
async fn other_devices_see_the_deleted_log() {
    let remote = Arc::new(MemoryRemote::new());
    let a = device(&remote);
    a.setup_password(&password("p1")).unwrap();
    a.sync().await.unwrap();

    let b = device(&remote);
    b.clone_from(&a.remote_identity().unwrap().unwrap())
        .await
        .unwrap();
    a.unsync().await.unwrap();

    let err = b.sync().await.unwrap_err();
    assert_eq!(err.op(), Some("sync"));
    assert!(matches!(
        err.root(),
        kv_core::VaultError::Remote(RemoteError::Deleted)
    ));
}
