//! Both remotes must honour the same log contract.

use std::sync::Arc;

use kv_core::{Event, RemoteError};
use kv_remote::{MemoryRemote, OpendalRemote, Remote};
use opendal::Operator;

fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

fn remotes(page_limit: usize) -> Vec<(&'static str, Arc<dyn Remote>)> {
    vec![
        ("memory", Arc::new(MemoryRemote::with_page_limit(page_limit))),
        (
            "opendal",
            Arc::new(OpendalRemote::new(memory_operator(), "vaults", page_limit)),
        ),
    ]
}

fn batch(n: usize) -> Vec<Event> {
    (0..n)
        .map(|i| Event::new(format!("/item/k{i}"), format!("v{i}").into_bytes(), None))
        .collect()
}

#[tokio::test]
async fn append_assigns_increasing_indices() {
    for (name, remote) in remotes(100) {
        assert!(!remote.exists("v1").await.unwrap(), "{name}");
        remote.send("v1", batch(3)).await.unwrap();
        remote.send("v1", batch(2)).await.unwrap();
        assert!(remote.exists("v1").await.unwrap(), "{name}");

        let page = remote.fetch("v1", 0).await.unwrap();
        let indices: Vec<u64> = page.events.iter().map(|e| e.index).collect();
        assert_eq!(indices, [1, 2, 3, 4, 5], "{name}");
        assert_eq!(page.index, 5);
        assert!(!page.truncated);
        assert!(page
            .events
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));

        let rest = remote.fetch("v1", 3).await.unwrap();
        assert_eq!(rest.events.len(), 2, "{name}");
        assert_eq!(rest.events[0].event.path, "/item/k0");
    }
}

#[tokio::test]
async fn unknown_vault_fetches_empty() {
    for (name, remote) in remotes(100) {
        let page = remote.fetch("nobody", 0).await.unwrap();
        assert!(page.events.is_empty(), "{name}");
        assert_eq!(page.index, 0);
    }
}

#[tokio::test]
async fn pages_are_truncated() {
    for (name, remote) in remotes(2) {
        remote.send("v1", batch(5)).await.unwrap();

        let mut since = 0;
        let mut pages = 0;
        let mut seen = 0;
        loop {
            let page = remote.fetch("v1", since).await.unwrap();
            seen += page.events.len();
            since = page.index;
            pages += 1;
            if !page.truncated {
                break;
            }
        }
        assert_eq!((seen, pages, since), (5, 3, 5), "{name}");
    }
}

#[tokio::test]
async fn duplicate_nonces_are_dropped() {
    for (name, remote) in remotes(100) {
        let events = batch(2);
        remote.send("v1", events.clone()).await.unwrap();
        remote.send("v1", events).await.unwrap();
        let page = remote.fetch("v1", 0).await.unwrap();
        assert_eq!(page.events.len(), 2, "{name}");
    }
}

#[tokio::test]
async fn deleted_log_rejects_send_and_fetch() {
    for (name, remote) in remotes(100) {
        remote.send("v1", batch(2)).await.unwrap();
        remote.delete("v1").await.unwrap();

        assert!(!remote.exists("v1").await.unwrap(), "{name}");
        assert!(matches!(
            remote.send("v1", batch(1)).await,
            Err(RemoteError::Deleted)
        ));
        assert!(matches!(
            remote.fetch("v1", 0).await,
            Err(RemoteError::Deleted)
        ));

        remote.send("v2", batch(1)).await.unwrap();
        assert_eq!(remote.fetch("v2", 0).await.unwrap().events.len(), 1);
    }
}

#[tokio::test]
async fn fs_backend_persists_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = kv_core::config::RemoteConfig {
        backend: kv_core::config::RemoteBackend::Fs,
        root: dir.path().to_path_buf(),
        ..Default::default()
    };

    let remote = kv_remote::build_remote(&config, None).unwrap();
    remote.send("v1", batch(2)).await.unwrap();
    drop(remote);

    let reopened = kv_remote::build_remote(&config, None).unwrap();
    let page = reopened.fetch("v1", 0).await.unwrap();
    assert_eq!(page.events.len(), 2);
    assert!(dir.path().join("vaults/v1/head").exists());
}

#[tokio::test]
async fn resend_after_failed_append_keeps_every_event() {
    let dir = tempfile::tempdir().unwrap();
    let op = Operator::new(opendal::services::Fs::default().root(&dir.path().to_string_lossy()))
        .unwrap()
        .finish();
    let remote = OpendalRemote::new(op, "vaults", 100);

    // a directory where the second event object belongs makes that write fail
    let blocker = dir.path().join("vaults/v1/events/000000000000002");
    std::fs::create_dir_all(&blocker).unwrap();

    let events = vec![
        Event::new("/item/a", b"1".to_vec(), None),
        Event::new("/item/b", b"2".to_vec(), None),
    ];
    assert!(remote.send("v1", events.clone()).await.is_err());

    std::fs::remove_dir(&blocker).unwrap();
    remote.send("v1", events.clone()).await.unwrap();
    remote.send("v1", events).await.unwrap();

    let page = remote.fetch("v1", 0).await.unwrap();
    let log: Vec<(u64, &str)> = page
        .events
        .iter()
        .map(|e| (e.index, e.event.path.as_str()))
        .collect();
    assert_eq!(log, [(1, "/item/a"), (2, "/item/b")]);
}

#[tokio::test]
async fn stale_nonce_marker_does_not_hide_a_new_event() {
    let remote = OpendalRemote::new(memory_operator(), "vaults", 100);
    let lost = Event::new("/item/a", b"1".to_vec(), None);

    // marker from an append whose head commit never happened
    let name = lost.nonce.replace('/', "_").replace('+', "-");
    remote
        .operator()
        .write(&format!("vaults/v1/nonces/{name}"), b"1".to_vec())
        .await
        .unwrap();
    remote
        .send("v1", vec![Event::new("/item/c", b"3".to_vec(), None)])
        .await
        .unwrap();

    remote.send("v1", vec![lost]).await.unwrap();
    let page = remote.fetch("v1", 0).await.unwrap();
    let paths: Vec<&str> = page.events.iter().map(|e| e.event.path.as_str()).collect();
    assert_eq!(paths, ["/item/c", "/item/a"]);
}
