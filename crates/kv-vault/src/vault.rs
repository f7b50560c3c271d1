use std::sync::Arc;
use std::time::Duration;

use kv_core::{
    Collection, Entity, HardwareParams, Hierarchical, Item, OpContext, PathLayout, Provision,
    ProvisionKind, SyncStatus, SyncedKind, VaultError, VaultResult, VaultStatus,
};
use kv_crypto::{
    decrypt_item, derive_password_key, encrypt_item, generate_paper_key, generate_salt,
    hardware_key, paper_key_to_key, KdfParams, ProvisionKey, SALT_SIZE,
};
use kv_remote::Remote;
use kv_store::Store;
use secrecy::SecretString;

use crate::auth::AuthManager;
use crate::db::Db;
use crate::history::{item_history, ItemVersion};
use crate::pending::PendingQueue;
use crate::sequence::Sequencer;
use crate::sync::{RemoteIdentity, SyncEngine, SyncReport};

/// Construction options.
#[derive(Clone)]
pub struct VaultOptions {
    pub layout: Arc<dyn PathLayout>,
    pub remote: Option<Arc<dyn Remote>>,
    /// Argon2id parameters for password provisions
    pub kdf: KdfParams,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            layout: Arc::new(Hierarchical),
            remote: None,
            kdf: KdfParams::default(),
        }
    }
}

/// The vault: the single entry point for items, provisions and sync.
#[derive(Debug)]
pub struct Vault {
    db: Db,
    pending: Arc<PendingQueue>,
    auth: AuthManager,
    sync: SyncEngine,
    kdf: KdfParams,
}

impl Vault {
    /// Hierarchical layout, no remote, default KDF parameters.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::open(store, VaultOptions::default())
    }

    pub fn open(store: Arc<dyn Store>, options: VaultOptions) -> Self {
        let db = Db::new(store, options.layout);
        let seq = Arc::new(Sequencer::new(db.clone()));
        let pending = Arc::new(PendingQueue::new(db.clone(), seq.clone()));
        let auth = AuthManager::new(db.clone(), pending.clone());
        let sync = SyncEngine::new(db.clone(), seq, pending.clone(), options.remote);
        tracing::debug!(store = db.store().backend(), layout = db.layout().name(), "vault opened");
        Self {
            db,
            pending,
            auth,
            sync,
            kdf: options.kdf,
        }
    }

    pub fn layout_name(&self) -> &'static str {
        self.db.layout().name()
    }

    pub fn sync_engine(&self) -> &SyncEngine {
        &self.sync
    }

    // --- lock state ---------------------------------------------------------

    pub fn status(&self) -> VaultResult<VaultStatus> {
        self.auth.status()
    }

    /// Set up with an already derived provision key.
    pub fn setup(&self, key: &ProvisionKey, provision: &Provision) -> VaultResult<()> {
        self.ensure_salt().op("setup")?;
        self.auth.setup(key, provision).op("setup")
    }

    /// Set up with a password as the first provision.
    pub fn setup_password(&self, password: &SecretString) -> VaultResult<Provision> {
        if self.status()? != VaultStatus::SetupNeeded {
            return Err(VaultError::AlreadySetup.context("setup"));
        }
        let salt = self.ensure_salt().op("setup")?;
        let key = self.password_key(password, &salt).op("setup")?;
        let provision = Provision::new(ProvisionKind::Password);
        self.auth.setup(&key, &provision).op("setup")?;
        Ok(provision)
    }

    /// Unlock with any provision key. Returns the id of the provision it opened.
    pub fn unlock(&self, key: &ProvisionKey) -> VaultResult<String> {
        self.auth.unlock(key).op("unlock")
    }

    pub fn unlock_password(&self, password: &SecretString) -> VaultResult<String> {
        let salt = self
            .salt()?
            .ok_or(VaultError::InvalidAuth)
            .op("unlock")?;
        let key = self.password_key(password, &salt).op("unlock")?;
        self.unlock(&key)
    }

    pub fn unlock_paper_key(&self, words: &SecretString) -> VaultResult<String> {
        let key = paper_key_to_key(words)
            .map_err(|_| VaultError::InvalidAuth)
            .op("unlock")?;
        self.unlock(&key)
    }

    /// Unlock with the secret a hardware token returned for its provision salt.
    pub fn unlock_hardware(&self, secret: &[u8]) -> VaultResult<String> {
        let key = hardware_key(secret)
            .map_err(|_| VaultError::InvalidAuth)
            .op("unlock")?;
        self.unlock(&key)
    }

    /// Forget the master key and detach the remote session.
    pub fn lock(&self) -> VaultResult<()> {
        self.auth.lock()?;
        self.sync.detach()
    }

    // --- provisions ---------------------------------------------------------

    pub fn provision(&self, key: &ProvisionKey, provision: &Provision) -> VaultResult<()> {
        self.auth.provision(key, provision).op("provision")
    }

    pub fn provision_password(&self, password: &SecretString) -> VaultResult<Provision> {
        self.require_unlocked()?;
        let salt = self.ensure_salt()?;
        let key = self.password_key(password, &salt)?;
        let provision = Provision::new(ProvisionKind::Password);
        self.provision(&key, &provision)?;
        Ok(provision)
    }

    /// Create a paper key provision. The words are returned once and never stored.
    pub fn provision_paper_key(&self) -> VaultResult<(SecretString, Provision)> {
        self.require_unlocked()?;
        let (words, key) = generate_paper_key().map_err(|e| VaultError::Crypto(e.to_string()))?;
        let provision = Provision::new(ProvisionKind::PaperKey);
        self.provision(&key, &provision)?;
        Ok((words, provision))
    }

    pub fn provision_hardware(
        &self,
        secret: &[u8],
        params: HardwareParams,
    ) -> VaultResult<Provision> {
        self.require_unlocked()?;
        let key = hardware_key(secret).map_err(|e| VaultError::Crypto(e.to_string()))?;
        let provision = Provision::new(ProvisionKind::HardwareSecret).with_hardware(params);
        self.provision(&key, &provision)?;
        Ok(provision)
    }

    pub fn deprovision(&self, id: &str, force: bool) -> VaultResult<()> {
        self.auth.deprovision(id, force).op("deprovision")?;
        if !self.auth.is_unlocked()? {
            self.sync.detach()?;
        }
        Ok(())
    }

    pub fn provisions(&self) -> VaultResult<Vec<Provision>> {
        self.auth.provisions()
    }

    // --- items --------------------------------------------------------------

    pub fn set(&self, item: &Item) -> VaultResult<()> {
        self.require_unlocked()?;
        if !self.db.layout().accepts_item_id(&item.id) {
            return Err(VaultError::InvalidItem(format!(
                "id not allowed in {} layout: {}",
                self.db.layout().name(),
                item.id
            )));
        }
        let encrypted = self.auth.with_unlocked(|mk| encrypt_item(item, Some(mk)))?;
        self.pending
            .mirror_set(SyncedKind::Item, &item.id, &encrypted)?;
        tracing::debug!(id = %item.id, bytes = encrypted.len(), "item set");
        Ok(())
    }

    pub fn get(&self, id: &str) -> VaultResult<Option<Item>> {
        self.require_unlocked()?;
        let Some(bytes) = self.db.get(Entity::Item(id))? else {
            return Ok(None);
        };
        self.auth
            .with_unlocked(|mk| decrypt_item(&bytes, Some(mk)))
            .map(Some)
    }

    /// Delete an item, queueing a tombstone for sync.
    pub fn delete(&self, id: &str) -> VaultResult<()> {
        self.require_unlocked()?;
        if !self.db.exists(Entity::Item(id))? {
            return Err(VaultError::NotFound(id.to_string()));
        }
        self.pending.mirror_delete(SyncedKind::Item, id)?;
        tracing::debug!(id, "item deleted");
        Ok(())
    }

    /// All current items, ordered by id.
    pub fn items(&self) -> VaultResult<Vec<Item>> {
        self.require_unlocked()?;
        let entries = self.db.entries(Collection::Items)?;
        let mut items = self.auth.with_unlocked(|mk| {
            entries
                .iter()
                .map(|(_, bytes)| decrypt_item(bytes, Some(mk)))
                .collect::<VaultResult<Vec<_>>>()
        })?;
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    /// Every version of an item known locally, oldest first.
    pub fn history(&self, id: &str) -> VaultResult<Vec<ItemVersion>> {
        self.require_unlocked()?;
        self.auth
            .with_unlocked(|mk| item_history(&self.db, Some(mk), id))
    }

    // --- sync ---------------------------------------------------------------

    pub async fn sync(&self) -> VaultResult<SyncReport> {
        self.sync.sync().await.op("sync")
    }

    pub async fn push(&self) -> VaultResult<usize> {
        self.sync.push().await
    }

    pub async fn pull(&self) -> VaultResult<usize> {
        self.sync.pull().await
    }

    /// Populate an empty vault from another device's remote log. No unlock
    /// is needed; unlock afterwards with any synced provision.
    pub async fn clone_from(&self, identity: &RemoteIdentity) -> VaultResult<usize> {
        self.sync.clone_from(identity).await.op("clone")
    }

    /// Delete the remote log. Local records stay; the next sync republishes
    /// the full local history under a new identity.
    pub async fn unsync(&self) -> VaultResult<usize> {
        self.sync.unsync().await.op("unsync")
    }

    pub fn remote_identity(&self) -> VaultResult<Option<RemoteIdentity>> {
        self.sync.identity()
    }

    pub fn sync_status(&self) -> VaultResult<SyncStatus> {
        Ok(SyncStatus {
            vault_id: self.sync.remote_key()?.map(|k| k.vault_id()),
            synced_at: self.sync.synced_at()?,
            index: self.sync.index()?,
            auto_sync_disabled: self.auto_sync_disabled()?,
            pending: self.pending.len()?,
        })
    }

    pub fn set_auto_sync(&self, enabled: bool) -> VaultResult<()> {
        if enabled {
            self.db.delete(Entity::Config("autosync"))?;
        } else {
            self.db.set(Entity::Config("autosync"), b"off")?;
        }
        Ok(())
    }

    /// Whether a caller-side periodic sync should run now. Never due for a
    /// vault that has not synced before, or with auto-sync disabled.
    pub fn auto_sync_due(&self, now_ms: u64, interval: Duration) -> VaultResult<bool> {
        if self.auto_sync_disabled()? {
            return Ok(false);
        }
        let Some(synced_at) = self.sync.synced_at()? else {
            return Ok(false);
        };
        Ok(now_ms.saturating_sub(synced_at) >= interval.as_millis() as u64)
    }

    // --- internals ----------------------------------------------------------

    fn auto_sync_disabled(&self) -> VaultResult<bool> {
        Ok(self
            .db
            .get(Entity::Config("autosync"))?
            .is_some_and(|v| v == b"off"))
    }

    fn require_unlocked(&self) -> VaultResult<()> {
        if self.auth.is_unlocked()? {
            Ok(())
        } else {
            Err(VaultError::Locked)
        }
    }

    fn salt(&self) -> VaultResult<Option<[u8; SALT_SIZE]>> {
        let path = self.db.path(Entity::Config("salt"));
        match self.db.store().get(&path)? {
            None => Ok(None),
            Some(bytes) => <[u8; SALT_SIZE]>::try_from(bytes.as_slice())
                .map(Some)
                .map_err(|_| VaultError::corrupt(&path, "salt has wrong size")),
        }
    }

    fn ensure_salt(&self) -> VaultResult<[u8; SALT_SIZE]> {
        if let Some(salt) = self.salt()? {
            return Ok(salt);
        }
        let salt = generate_salt();
        self.db.set(Entity::Config("salt"), &salt)?;
        Ok(salt)
    }

    fn password_key(
        &self,
        password: &SecretString,
        salt: &[u8; SALT_SIZE],
    ) -> VaultResult<ProvisionKey> {
        derive_password_key(password, salt, &self.kdf).map_err(|e| VaultError::Crypto(e.to_string()))
    }
}
