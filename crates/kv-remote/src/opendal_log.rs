//! Event log over any OpenDAL operator.
//!
//! Object layout per vault:
//! ```text
//! <prefix>/<vault_id>/head                 {"index": N, "deleted": bool}
//! <prefix>/<vault_id>/events/<015d-index>  one RemoteEvent (JSON)
//! <prefix>/<vault_id>/nonces/<nonce>       index the nonce was stored at
//! ```
//! A nonce marker only counts once `head` covers its index and the event
//! at that index carries the same nonce. Markers left by a send that failed
//! before its head commit are overwritten on the next attempt.
//! Appends from this process are serialized by a mutex. The log is not
//! safe for two writer processes sharing one bucket.

use async_trait::async_trait;
use kv_core::paths::format_seq;
use kv_core::{now_millis, Event, Events, RemoteError, RemoteEvent};
use opendal::Operator;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{Remote, RemoteResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Head {
    index: u64,
    #[serde(default)]
    deleted: bool,
}

pub struct OpendalRemote {
    op: Operator,
    prefix: String,
    page_limit: usize,
    write_lock: Mutex<()>,
}

fn storage(context: &str) -> impl Fn(opendal::Error) -> RemoteError + '_ {
    move |e| RemoteError::Storage(format!("{context}: {e}"))
}

impl OpendalRemote {
    pub fn new(op: Operator, prefix: &str, page_limit: usize) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
            page_limit: page_limit.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn base(&self, vault_id: &str) -> String {
        if self.prefix.is_empty() {
            vault_id.to_string()
        } else {
            format!("{}/{vault_id}", self.prefix)
        }
    }

    async fn read_head(&self, vault_id: &str) -> RemoteResult<Option<Head>> {
        let key = format!("{}/head", self.base(vault_id));
        match self.op.read(&key).await {
            Ok(data) => serde_json::from_slice(&data.to_vec())
                .map(Some)
                .map_err(|e| RemoteError::Codec(format!("parsing {key}: {e}"))),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage("reading head")(e)),
        }
    }

    async fn write_head(&self, vault_id: &str, head: &Head) -> RemoteResult<()> {
        let key = format!("{}/head", self.base(vault_id));
        let json = serde_json::to_vec(head).map_err(|e| RemoteError::Codec(e.to_string()))?;
        self.op
            .write(&key, json)
            .await
            .map_err(storage("writing head"))?;
        Ok(())
    }

    /// Whether `nonce` is already committed to the log under `head`.
    async fn committed(&self, base: &str, head: &Head, nonce: &str) -> RemoteResult<bool> {
        let marker = match self.op.read(&nonce_key(base, nonce)).await {
            Ok(data) => data.to_vec(),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(storage("reading nonce")(e)),
        };
        let Some(index) = std::str::from_utf8(&marker)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        else {
            return Ok(false);
        };
        if index == 0 || index > head.index {
            return Ok(false);
        }

        let key = format!("{base}/events/{}", format_seq(index));
        match self.op.read(&key).await {
            Ok(data) => Ok(RemoteEvent::from_bytes(&data.to_vec())
                .is_ok_and(|stored| stored.event.nonce == nonce)),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage("reading event")(e)),
        }
    }

    async fn clear_dir(&self, dir: &str) -> RemoteResult<usize> {
        let entries = match self.op.list(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(storage("listing log")(e)),
        };
        let mut removed = 0;
        for entry in entries {
            if entry.path().ends_with('/') {
                continue;
            }
            self.op
                .delete(entry.path())
                .await
                .map_err(storage("deleting log object"))?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Nonces are standard base64; keep them to a single path segment.
fn nonce_key(base: &str, nonce: &str) -> String {
    let name: String = nonce
        .chars()
        .map(|c| match c {
            '/' => '_',
            '+' => '-',
            c => c,
        })
        .collect();
    format!("{base}/nonces/{name}")
}

#[async_trait]
impl Remote for OpendalRemote {
    async fn send(&self, vault_id: &str, events: Vec<Event>) -> RemoteResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut head = self.read_head(vault_id).await?.unwrap_or_default();
        if head.deleted {
            return Err(RemoteError::Deleted);
        }

        let base = self.base(vault_id);
        let mut accepted = 0usize;
        for event in events {
            if self.committed(&base, &head, &event.nonce).await? {
                tracing::debug!(vault_id, nonce = %event.nonce, "dropping duplicate event");
                continue;
            }

            let index = head.index + 1;
            let marker = nonce_key(&base, &event.nonce);
            let stored = RemoteEvent {
                event,
                index,
                timestamp: now_millis(),
            };
            let bytes = stored
                .to_bytes()
                .map_err(|e| RemoteError::Codec(e.to_string()))?;
            self.op
                .write(&format!("{base}/events/{}", format_seq(index)), bytes)
                .await
                .map_err(storage("writing event"))?;
            self.op
                .write(&marker, index.to_string().into_bytes())
                .await
                .map_err(storage("writing nonce"))?;
            head.index = index;
            self.write_head(vault_id, &head).await?;
            accepted += 1;
        }

        tracing::debug!(vault_id, accepted, head = head.index, "events appended");
        Ok(())
    }

    async fn fetch(&self, vault_id: &str, since: u64) -> RemoteResult<Events> {
        let Some(head) = self.read_head(vault_id).await? else {
            return Ok(Events {
                index: since,
                ..Events::default()
            });
        };
        if head.deleted {
            return Err(RemoteError::Deleted);
        }

        let base = self.base(vault_id);
        let last = head.index.min(since.saturating_add(self.page_limit as u64));
        let mut events = Vec::new();
        for index in (since + 1)..=last {
            let key = format!("{base}/events/{}", format_seq(index));
            let data = self.op.read(&key).await.map_err(storage("reading event"))?;
            let event = RemoteEvent::from_bytes(&data.to_vec())
                .map_err(|e| RemoteError::Codec(format!("{key}: {e}")))?;
            events.push(event);
        }

        Ok(Events {
            index: events.last().map(|e| e.index).unwrap_or(since),
            truncated: last < head.index,
            events,
        })
    }

    async fn delete(&self, vault_id: &str) -> RemoteResult<()> {
        let _guard = self.write_lock.lock().await;
        let base = self.base(vault_id);
        let events = self.clear_dir(&format!("{base}/events/")).await?;
        let nonces = self.clear_dir(&format!("{base}/nonces/")).await?;
        self.write_head(
            vault_id,
            &Head {
                index: 0,
                deleted: true,
            },
        )
        .await?;
        tracing::info!(vault_id, events, nonces, "remote log deleted");
        Ok(())
    }

    async fn exists(&self, vault_id: &str) -> RemoteResult<bool> {
        Ok(self
            .read_head(vault_id)
            .await?
            .is_some_and(|h| !h.deleted && h.index > 0))
    }
}
