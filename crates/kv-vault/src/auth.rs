//! Provisions and the master key.
//!
//! Each provision holds its own 32-byte key. The master key is wrapped once
//! per provision and stored at `/auth/<provision id>`, with the provision's
//! public metadata at `/provision/<provision id>`. Unlocking tries the
//! supplied key against every auth entry in turn: the caller does not say
//! which provision the key belongs to, so this is O(provisions).

use std::sync::{Arc, RwLock};

use kv_core::{
    Collection, Entity, Provision, ProvisionKind, SyncedKind, VaultError, VaultResult,
    VaultStatus,
};
use kv_crypto::{generate_master_key, unwrap_master_key, wrap_master_key, MasterKey, ProvisionKey};

use crate::db::Db;
use crate::pending::PendingQueue;

fn poisoned<T>(_: T) -> VaultError {
    VaultError::Store(anyhow::anyhow!("master key lock poisoned"))
}

#[derive(Debug)]
pub struct AuthManager {
    db: Db,
    pending: Arc<PendingQueue>,
    mk: RwLock<Option<MasterKey>>,
}

impl AuthManager {
    pub fn new(db: Db, pending: Arc<PendingQueue>) -> Self {
        Self {
            db,
            pending,
            mk: RwLock::new(None),
        }
    }

    pub fn status(&self) -> VaultResult<VaultStatus> {
        if self.is_unlocked()? {
            return Ok(VaultStatus::Unlocked);
        }
        if self.db.ids(Collection::Auths)?.is_empty() {
            Ok(VaultStatus::SetupNeeded)
        } else {
            Ok(VaultStatus::Locked)
        }
    }

    pub fn is_unlocked(&self) -> VaultResult<bool> {
        Ok(self.mk.read().map_err(poisoned)?.is_some())
    }

    /// Run `f` with the master key, failing with `Locked` while there is none.
    pub fn with_unlocked<R>(&self, f: impl FnOnce(&MasterKey) -> VaultResult<R>) -> VaultResult<R> {
        let guard = self.mk.read().map_err(poisoned)?;
        f(guard.as_ref().ok_or(VaultError::Locked)?)
    }

    /// Create the master key and its first provision.
    pub fn setup(&self, key: &ProvisionKey, provision: &Provision) -> VaultResult<()> {
        if !self.db.ids(Collection::Auths)?.is_empty() {
            return Err(VaultError::AlreadySetup);
        }

        let mk = generate_master_key();
        self.store_provision(key, provision, &mk)?;
        *self.mk.write().map_err(poisoned)? = Some(mk);

        tracing::info!(provision = %provision.id, kind = %provision.kind, "vault setup");
        Ok(())
    }

    /// Find the auth entry `key` opens and load the master key from it.
    /// Fails with `InvalidAuth` when none does, including when there are none.
    pub fn unlock(&self, key: &ProvisionKey) -> VaultResult<String> {
        let entries = self.db.entries(Collection::Auths)?;
        for (id, wrapped) in &entries {
            match unwrap_master_key(key, wrapped) {
                Ok(mk) => {
                    *self.mk.write().map_err(poisoned)? = Some(mk);
                    tracing::info!(provision = %id, "vault unlocked");
                    return Ok(id.clone());
                }
                Err(e) => tracing::trace!(provision = %id, "auth entry did not open: {e}"),
            }
        }

        tracing::debug!(tried = entries.len(), "no auth entry matched");
        Err(VaultError::InvalidAuth)
    }

    /// Drop the master key. Its buffer is zeroed on drop.
    pub fn lock(&self) -> VaultResult<()> {
        let mk = self.mk.write().map_err(poisoned)?.take();
        if mk.is_some() {
            tracing::info!("vault locked");
        }
        drop(mk);
        Ok(())
    }

    /// Wrap the current master key under an additional provision.
    pub fn provision(&self, key: &ProvisionKey, provision: &Provision) -> VaultResult<()> {
        let guard = self.mk.read().map_err(poisoned)?;
        let mk = guard.as_ref().ok_or(VaultError::Locked)?;
        self.store_provision(key, provision, mk)?;
        tracing::info!(provision = %provision.id, kind = %provision.kind, "provision added");
        Ok(())
    }

    /// Remove a provision. The last one is only removed with `force`, and
    /// removing it drops the master key: nothing could open it again.
    pub fn deprovision(&self, id: &str, force: bool) -> VaultResult<()> {
        let ids = self.db.ids(Collection::Auths)?;
        if !ids.iter().any(|p| p == id) {
            return Err(VaultError::ProvisionNotFound(id.to_string()));
        }
        if ids.len() == 1 && !force {
            return Err(VaultError::LastAuth);
        }

        self.pending.mirror_delete(SyncedKind::Auth, id)?;
        if self.db.exists(Entity::Provision(id))? {
            self.pending.mirror_delete(SyncedKind::Provision, id)?;
        }
        tracing::info!(provision = %id, forced = force, "provision removed");
        if ids.len() == 1 {
            self.lock()?;
        }
        Ok(())
    }

    /// Every provision able to unlock the vault. Auth entries without
    /// metadata are listed as `Unknown`.
    pub fn provisions(&self) -> VaultResult<Vec<Provision>> {
        let mut out = Vec::new();
        for id in self.db.ids(Collection::Auths)? {
            let provision = match self.db.get(Entity::Provision(&id))? {
                Some(bytes) => match Provision::from_bytes(&bytes) {
                    Ok(mut p) => {
                        p.id = id;
                        p
                    }
                    Err(e) => {
                        tracing::warn!(provision = %id, "unreadable provision metadata: {e}");
                        unknown(id)
                    }
                },
                None => unknown(id),
            };
            out.push(provision);
        }
        Ok(out)
    }

    fn store_provision(
        &self,
        key: &ProvisionKey,
        provision: &Provision,
        mk: &MasterKey,
    ) -> VaultResult<()> {
        if provision.id.is_empty() {
            return Err(VaultError::InvalidItem("empty provision id".into()));
        }
        let wrapped = wrap_master_key(key, mk).map_err(|e| VaultError::Crypto(e.to_string()))?;
        self.pending
            .mirror_set(SyncedKind::Auth, &provision.id, &wrapped)?;
        self.pending
            .mirror_set(SyncedKind::Provision, &provision.id, &provision.to_bytes()?)?;
        Ok(())
    }
}

fn unknown(id: String) -> Provision {
    Provision {
        id,
        kind: ProvisionKind::Unknown,
        created_at: 0,
        hardware: None,
    }
}
