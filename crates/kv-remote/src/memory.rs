use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use kv_core::{now_millis, Event, Events, RemoteError, RemoteEvent};
use tokio::sync::Mutex;

use crate::{Remote, RemoteResult};

#[derive(Debug, Default)]
struct Log {
    events: Vec<RemoteEvent>,
    nonces: HashSet<String>,
    deleted: bool,
}

/// In-process remote. Shared between vaults with `Arc` to simulate devices.
#[derive(Debug)]
pub struct MemoryRemote {
    logs: Mutex<HashMap<String, Log>>,
    page_limit: usize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::with_page_limit(1000)
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_limit(page_limit: usize) -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            page_limit: page_limit.max(1),
        }
    }

    /// Number of events stored for a vault.
    pub async fn len(&self, vault_id: &str) -> usize {
        self.logs
            .lock()
            .await
            .get(vault_id)
            .map(|l| l.events.len())
            .unwrap_or(0)
    }

    /// Raw stored events, for inspection in tests.
    pub async fn events(&self, vault_id: &str) -> Vec<RemoteEvent> {
        self.logs
            .lock()
            .await
            .get(vault_id)
            .map(|l| l.events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Remote for MemoryRemote {
    async fn send(&self, vault_id: &str, events: Vec<Event>) -> RemoteResult<()> {
        let mut logs = self.logs.lock().await;
        let log = logs.entry(vault_id.to_string()).or_default();
        if log.deleted {
            return Err(RemoteError::Deleted);
        }

        let mut accepted = 0usize;
        for event in events {
            if !log.nonces.insert(event.nonce.clone()) {
                tracing::debug!(vault_id, nonce = %event.nonce, "dropping duplicate event");
                continue;
            }
            let index = log.events.len() as u64 + 1;
            log.events.push(RemoteEvent {
                event,
                index,
                timestamp: now_millis(),
            });
            accepted += 1;
        }
        tracing::debug!(vault_id, accepted, head = log.events.len(), "events appended");
        Ok(())
    }

    async fn fetch(&self, vault_id: &str, since: u64) -> RemoteResult<Events> {
        let logs = self.logs.lock().await;
        let Some(log) = logs.get(vault_id) else {
            return Ok(Events {
                index: since,
                ..Events::default()
            });
        };
        if log.deleted {
            return Err(RemoteError::Deleted);
        }

        let start = (since as usize).min(log.events.len());
        let end = (start + self.page_limit).min(log.events.len());
        let events = log.events[start..end].to_vec();
        let index = events.last().map(|e| e.index).unwrap_or(since);
        Ok(Events {
            events,
            index,
            truncated: end < log.events.len(),
        })
    }

    async fn delete(&self, vault_id: &str) -> RemoteResult<()> {
        let mut logs = self.logs.lock().await;
        let log = logs.entry(vault_id.to_string()).or_default();
        log.events.clear();
        log.nonces.clear();
        log.deleted = true;
        tracing::info!(vault_id, "remote log deleted");
        Ok(())
    }

    async fn exists(&self, vault_id: &str) -> RemoteResult<bool> {
        let logs = self.logs.lock().await;
        Ok(logs
            .get(vault_id)
            .is_some_and(|l| !l.deleted && !l.events.is_empty()))
    }
}
