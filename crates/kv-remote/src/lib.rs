//! kv-remote: the server side of vault sync, seen from the client
//!
//! A remote keeps one append-only event log per vault id. It assigns each
//! accepted event an increasing `index` and a `timestamp`, drops events whose
//! nonce it has already stored, and pages results with `truncated`.

pub mod health;
pub mod memory;
pub mod opendal_log;
pub mod operator;

use std::sync::Arc;

use async_trait::async_trait;
use kv_core::config::{RemoteBackend, RemoteConfig};
use kv_core::{Event, Events};

pub use health::check_health;
pub use kv_core::RemoteError;
pub use memory::MemoryRemote;
pub use opendal_log::OpendalRemote;
pub use operator::{build_from_config, build_operator, S3Credentials, StorageConfig};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// An append-only, per-vault event log.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Append events in order. Fails with `Deleted` if the log was deleted.
    async fn send(&self, vault_id: &str, events: Vec<Event>) -> RemoteResult<()>;

    /// Events with index greater than `since`, at most one page.
    async fn fetch(&self, vault_id: &str, since: u64) -> RemoteResult<Events>;

    /// Remove the log. Later `send`/`fetch` on this id fail with `Deleted`.
    async fn delete(&self, vault_id: &str) -> RemoteResult<()>;

    async fn exists(&self, vault_id: &str) -> RemoteResult<bool>;
}

/// Build the remote described by `[remote]` config.
///
/// `credentials` are required for the s3 backend only.
pub fn build_remote(
    config: &RemoteConfig,
    credentials: Option<&S3Credentials>,
) -> anyhow::Result<Arc<dyn Remote>> {
    match config.backend {
        RemoteBackend::Memory => Ok(Arc::new(MemoryRemote::with_page_limit(config.page_limit))),
        RemoteBackend::Fs | RemoteBackend::S3 => {
            let op = build_from_config(config, credentials)?;
            Ok(Arc::new(OpendalRemote::new(
                op,
                &config.prefix,
                config.page_limit,
            )))
        }
    }
}
