//! Push/pull synchronization with a remote event log.
//!
//! Push drains the pending log into one hash-chained batch. Pull fetches
//! events after the last applied remote index and applies each one:
//!
//! 1. reject an empty path (`InvalidEvent`)
//! 2. reject a nonce already committed (`ReplayDetected`)
//! 3. reject paths outside `/item`, `/auth` and `/provision` (`InvalidEvent`)
//! 4. set the record, or delete it when the payload is empty
//! 5. record the event at `pull/<seq>/<path>`
//! 6. commit the nonce
//!
//! The remote index is persisted after every applied event, so a pull that
//! stops half way resumes at the first event it did not apply.

use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kv_core::paths::parse_canonical;
use kv_core::{
    now_millis, Collection, Entity, Event, OpContext, RemoteError, RemoteEvent, SyncedKind,
    VaultError, VaultResult,
};
use kv_crypto::{RemoteKey, SALT_SIZE};
use kv_remote::Remote;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::db::Db;
use crate::pending::PendingQueue;
use crate::replay::NonceGuard;
use crate::sequence::Sequencer;

/// Stored at `/config/remote`.
#[derive(Serialize, Deserialize)]
struct RemoteRecord {
    key: String,
}

/// What another device needs to clone this vault: the remote key and the
/// password salt. Neither opens the vault on its own.
#[derive(Debug, Clone)]
pub struct RemoteIdentity {
    pub key: RemoteKey,
    pub salt: [u8; SALT_SIZE],
}

impl RemoteIdentity {
    pub fn vault_id(&self) -> String {
        self.key.vault_id()
    }

    /// `(key, salt)` as base64 strings.
    pub fn encode(&self) -> (String, String) {
        (self.key.to_base64(), STANDARD.encode(self.salt))
    }

    pub fn decode(key: &str, salt: &str) -> anyhow::Result<Self> {
        let key = RemoteKey::from_base64(key)?;
        let bytes = STANDARD
            .decode(salt.trim())
            .map_err(|e| anyhow::anyhow!("invalid salt encoding: {e}"))?;
        let salt: [u8; SALT_SIZE] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow::anyhow!("salt has wrong size: {} bytes", b.len()))?;
        Ok(Self { key, salt })
    }
}

/// Outcome of one sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    pub index: u64,
}

fn poisoned<T>(_: T) -> VaultError {
    VaultError::Store(anyhow::anyhow!("remote session lock poisoned"))
}

pub struct SyncEngine {
    db: Db,
    seq: Arc<Sequencer>,
    pending: Arc<PendingQueue>,
    nonces: NonceGuard,
    remote: Option<Arc<dyn Remote>>,
    session: RwLock<Option<RemoteKey>>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("db", &self.db)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(
        db: Db,
        seq: Arc<Sequencer>,
        pending: Arc<PendingQueue>,
        remote: Option<Arc<dyn Remote>>,
    ) -> Self {
        Self {
            nonces: NonceGuard::new(db.clone()),
            db,
            seq,
            pending,
            remote,
            session: RwLock::new(None),
            lock: Mutex::new(()),
        }
    }

    fn remote(&self) -> VaultResult<&Arc<dyn Remote>> {
        self.remote.as_ref().ok_or(VaultError::NoRemote)
    }

    /// Remote key, from the session cache or `/config/remote`.
    pub fn remote_key(&self) -> VaultResult<Option<RemoteKey>> {
        if let Some(key) = self.session.read().map_err(poisoned)?.as_ref() {
            return Ok(Some(key.clone()));
        }
        let path = self.db.path(Entity::Config("remote"));
        let Some(bytes) = self.db.store().get(&path)? else {
            return Ok(None);
        };
        let record: RemoteRecord =
            serde_json::from_slice(&bytes).map_err(|e| VaultError::corrupt(&path, e))?;
        let key = RemoteKey::from_base64(&record.key).map_err(|e| VaultError::corrupt(&path, e))?;
        *self.session.write().map_err(poisoned)? = Some(key.clone());
        Ok(Some(key))
    }

    fn set_remote_key(&self, key: &RemoteKey) -> VaultResult<()> {
        let record = RemoteRecord {
            key: key.to_base64(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| VaultError::Store(e.into()))?;
        self.db.set(Entity::Config("remote"), &bytes)?;
        *self.session.write().map_err(poisoned)? = Some(key.clone());
        Ok(())
    }

    /// Forget the cached remote key. It is re-read on next use.
    pub fn detach(&self) -> VaultResult<()> {
        self.session.write().map_err(poisoned)?.take();
        Ok(())
    }

    /// Push pending mutations.
    pub async fn push(&self) -> VaultResult<usize> {
        let _guard = self.lock.lock().await;
        let remote = self.remote()?;
        let key = self.remote_key()?.ok_or(VaultError::NoRemoteKey)?;
        self.push_locked(remote.as_ref(), &key.vault_id()).await.op("push")
    }

    /// Pull and apply remote events.
    pub async fn pull(&self) -> VaultResult<usize> {
        let _guard = self.lock.lock().await;
        let remote = self.remote()?;
        let key = self.remote_key()?.ok_or(VaultError::NoRemoteKey)?;
        self.pull_locked(remote.as_ref(), &key.vault_id()).await.op("pull")
    }

    /// Push then pull under one lock. Creates the remote key on first use.
    pub async fn sync(&self) -> VaultResult<SyncReport> {
        let _guard = self.lock.lock().await;
        let remote = self.remote()?;
        let key = match self.remote_key()? {
            Some(key) => key,
            None => {
                let key = RemoteKey::generate();
                self.set_remote_key(&key)?;
                info!(vault_id = %key.vault_id(), "created remote identity");
                key
            }
        };
        let vault_id = key.vault_id();

        let pushed = self.push_locked(remote.as_ref(), &vault_id).await.op("push")?;
        let pulled = self.pull_locked(remote.as_ref(), &vault_id).await.op("pull")?;
        self.db.set_u64(Entity::Db("synced"), now_millis())?;

        let index = self.index()?;
        info!(vault_id = %vault_id, pushed, pulled, index, "sync complete");
        Ok(SyncReport {
            pushed,
            pulled,
            index,
        })
    }

    /// Attach an empty vault to an existing remote log and pull all of it.
    pub async fn clone_from(&self, identity: &RemoteIdentity) -> VaultResult<usize> {
        let _guard = self.lock.lock().await;
        let remote = self.remote()?;
        if !self.is_empty()? {
            return Err(VaultError::NotEmpty);
        }
        let vault_id = identity.vault_id();
        if !remote.exists(&vault_id).await? {
            return Err(RemoteError::NotFound.into());
        }

        self.db.set(Entity::Config("salt"), &identity.salt)?;
        self.set_remote_key(&identity.key)?;
        self.db.delete(Entity::Db("index"))?;

        let pulled = self.pull_locked(remote.as_ref(), &vault_id).await.op("pull")?;
        self.db.set_u64(Entity::Db("synced"), now_millis())?;
        info!(vault_id = %vault_id, pulled, "vault cloned");
        Ok(pulled)
    }

    /// Delete the remote log and requeue the whole local history for the
    /// next sync. Local records are untouched.
    pub async fn unsync(&self) -> VaultResult<usize> {
        let _guard = self.lock.lock().await;
        let remote = self.remote()?;
        let key = self.remote_key()?.ok_or(VaultError::NoRemoteKey)?;
        let vault_id = key.vault_id();

        remote.delete(&vault_id).await?;

        let layout = self.db.layout();
        let pulled = self.db.log(Collection::Pull)?;
        let pushed = self.db.log(Collection::Push)?;
        let mut requeued = 0usize;

        for entry in &pulled {
            let Some((_, path)) = layout.split_log(Collection::Pull, &entry.path) else {
                continue;
            };
            let event = RemoteEvent::from_bytes(entry.data.as_deref().unwrap_or_default())
                .map_err(|e| VaultError::corrupt(&entry.path, e))?;
            self.pending.record(path, &event.event.data)?;
            self.db.store().delete(&entry.path)?;
            requeued += 1;
        }
        for entry in &pushed {
            let Some((_, path)) = layout.split_log(Collection::Push, &entry.path) else {
                continue;
            };
            self.pending
                .record(path, entry.data.as_deref().unwrap_or_default())?;
            self.db.store().delete(&entry.path)?;
            requeued += 1;
        }

        self.db.delete(Entity::Config("remote"))?;
        self.db.delete(Entity::Db("index"))?;
        self.db.delete(Entity::Db("synced"))?;
        self.detach()?;

        warn!(vault_id = %vault_id, requeued, "remote log deleted, history requeued");
        Ok(requeued)
    }

    /// Apply fetched events in order. Stops at the first failure; events
    /// already applied stay applied.
    pub fn apply(&self, events: &[RemoteEvent]) -> VaultResult<usize> {
        let mut applied = 0;
        for event in events {
            self.apply_one(event)?;
            if event.index > self.index()? {
                self.db.set_u64(Entity::Db("index"), event.index)?;
            }
            applied += 1;
        }
        Ok(applied)
    }

    fn apply_one(&self, remote: &RemoteEvent) -> VaultResult<()> {
        let event = &remote.event;
        if event.path.is_empty() {
            return Err(VaultError::InvalidEvent("empty path".into()));
        }
        self.nonces.check(&event.nonce)?;

        let (kind, id) = parse_canonical(&event.path)
            .ok_or_else(|| VaultError::InvalidEvent(format!("unsupported path: {}", event.path)))?;
        if kind == SyncedKind::Item && !self.db.layout().accepts_item_id(id) {
            return Err(VaultError::InvalidEvent(format!(
                "item id not representable in {} layout: {id}",
                self.db.layout().name()
            )));
        }

        if event.is_delete() {
            self.db.delete(kind.entity(id))?;
        } else {
            self.db.set(kind.entity(id), &event.data)?;
        }

        let seq = self.seq.increment()?;
        let key = self.db.layout().log_path(Collection::Pull, &seq, &event.path);
        self.db.store().set(&key, &remote.to_bytes()?)?;

        self.nonces.commit(&event.nonce)?;
        debug!(path = %event.path, index = remote.index, delete = event.is_delete(), "applied remote event");
        Ok(())
    }

    async fn push_locked(&self, remote: &dyn Remote, vault_id: &str) -> VaultResult<usize> {
        let entries = self.pending.list()?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut events = Vec::with_capacity(entries.len());
        let mut prev: Option<String> = None;
        for entry in &entries {
            let event = Event::new(entry.path.clone(), entry.data.clone(), prev.take());
            prev = Some(event.hash());
            events.push(event);
        }

        remote.send(vault_id, events).await?;
        self.pending.remove(&entries)?;
        info!(vault_id, count = entries.len(), "pushed pending mutations");
        Ok(entries.len())
    }

    async fn pull_locked(&self, remote: &dyn Remote, vault_id: &str) -> VaultResult<usize> {
        let mut total = 0;
        loop {
            let since = self.index()?;
            let page = remote.fetch(vault_id, since).await?;
            total += self.apply(&page.events)?;
            if page.index > self.index()? {
                self.db.set_u64(Entity::Db("index"), page.index)?;
            } else if self.db.get_u64(Entity::Db("index"))?.is_none() {
                self.db.set_u64(Entity::Db("index"), since)?;
            }
            debug!(vault_id, since, index = page.index, events = page.events.len(), truncated = page.truncated, "pulled page");
            if !page.truncated || page.events.is_empty() {
                break;
            }
        }
        Ok(total)
    }

    /// Last applied remote index.
    pub fn index(&self) -> VaultResult<u64> {
        Ok(self.db.get_u64(Entity::Db("index"))?.unwrap_or(0))
    }

    pub fn synced_at(&self) -> VaultResult<Option<u64>> {
        self.db.get_u64(Entity::Db("synced"))
    }

    /// Identity to hand to another device, if this vault has synced.
    pub fn identity(&self) -> VaultResult<Option<RemoteIdentity>> {
        let Some(key) = self.remote_key()? else {
            return Ok(None);
        };
        let path = self.db.path(Entity::Config("salt"));
        let salt = match self.db.store().get(&path)? {
            Some(bytes) => <[u8; SALT_SIZE]>::try_from(bytes.as_slice())
                .map_err(|_| VaultError::corrupt(&path, "salt has wrong size"))?,
            None => return Err(VaultError::corrupt(&path, "missing salt")),
        };
        Ok(Some(RemoteIdentity { key, salt }))
    }

    fn is_empty(&self) -> VaultResult<bool> {
        Ok(self.db.ids(Collection::Auths)?.is_empty()
            && self.db.ids(Collection::Items)?.is_empty()
            && self.pending.is_empty()?)
    }
}
