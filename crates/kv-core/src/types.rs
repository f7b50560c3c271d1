use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum item id length in bytes.
pub const MAX_ID_LEN: usize = 254;
/// Maximum item type length in bytes.
pub const MAX_TYPE_LEN: usize = 32;
/// Maximum item data length in bytes.
pub const MAX_DATA_LEN: usize = 2048;
/// Hard cap on an encrypted item, sized for small secure-storage blobs.
pub const MAX_ENCRYPTED_LEN: usize = 2560;

/// Provision id used for auth entries written before provisions carried ids.
pub const LEGACY_PROVISION_ID: &str = "legacy";

/// State of the vault's lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VaultStatus {
    /// No auth entries exist yet
    SetupNeeded,
    /// Auth entries exist but the master key is not in memory
    Locked,
    /// Master key is in memory
    Unlocked,
}

/// A user secret. `data` is plaintext and only ever lives in memory.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Item {
    pub id: String,
    pub data: Vec<u8>,
    /// Free-form type tag
    pub kind: String,
    /// Unix timestamp (ms) of creation
    pub created_at: u64,
}

impl Item {
    pub fn new(id: impl Into<String>, data: impl Into<Vec<u8>>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            kind: kind.into(),
            created_at: crate::now_millis(),
        }
    }

    /// A deletion marker: same id, no data.
    pub fn tombstone(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Vec::new(),
            kind: String::new(),
            created_at: 0,
        }
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("data", &format_args!("[REDACTED; {} bytes]", self.data.len()))
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Kind of credential a provision represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProvisionKind {
    Password,
    PaperKey,
    HardwareSecret,
    #[default]
    Unknown,
}

impl ProvisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionKind::Password => "password",
            ProvisionKind::PaperKey => "paper-key",
            ProvisionKind::HardwareSecret => "hardware-secret",
            ProvisionKind::Unknown => "unknown",
        }
    }
}

impl From<String> for ProvisionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "password" => ProvisionKind::Password,
            "paper-key" => ProvisionKind::PaperKey,
            "hardware-secret" => ProvisionKind::HardwareSecret,
            _ => ProvisionKind::Unknown,
        }
    }
}

impl From<ProvisionKind> for String {
    fn from(kind: ProvisionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ProvisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public parameters of a hardware-secret provision. Never secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareParams {
    /// Salt sent to the device to produce the secret (base64)
    pub salt: String,
    /// Authenticator model identifier
    #[serde(default)]
    pub aaguid: String,
    /// Credential id registered on the device (base64)
    #[serde(default)]
    pub credential_id: String,
    #[serde(default)]
    pub no_pin: bool,
}

/// One independent credential able to unwrap the master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provision {
    /// Missing on legacy records
    #[serde(default = "legacy_id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: ProvisionKind,
    /// Unix timestamp (ms)
    #[serde(default)]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareParams>,
}

fn legacy_id() -> String {
    LEGACY_PROVISION_ID.to_string()
}

impl Provision {
    /// New provision with a random, unguessable id.
    pub fn new(kind: ProvisionKind) -> Self {
        Self {
            id: random_id(),
            kind,
            created_at: crate::now_millis(),
            hardware: None,
        }
    }

    pub fn with_hardware(mut self, params: HardwareParams) -> Self {
        self.hardware = Some(params);
        self
    }

    pub fn is_legacy(&self) -> bool {
        self.id == LEGACY_PROVISION_ID
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| anyhow::anyhow!("provision serialization: {e}"))
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| anyhow::anyhow!("provision deserialization: {e}"))
    }
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn random_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One outbound unit of a vault's remote log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Canonical path, e.g. `/item/github`
    pub path: String,
    /// Opaque payload; empty means delete
    #[serde(with = "b64", default)]
    pub data: Vec<u8>,
    /// Random per-event nonce (base64)
    pub nonce: String,
    /// Hash of the previous event in the same push batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

impl Event {
    pub fn new(path: impl Into<String>, data: Vec<u8>, prev: Option<String>) -> Self {
        Self {
            path: path.into(),
            data,
            nonce: random_id(),
            prev,
        }
    }

    /// BLAKE3 over `path || 0 || data || 0 || nonce`, hex encoded.
    pub fn hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&self.data);
        hasher.update(&[0]);
        hasher.update(self.nonce.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    pub fn is_delete(&self) -> bool {
        self.data.is_empty()
    }
}

/// An event as returned by the remote, with untrusted server metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    #[serde(flatten)]
    pub event: Event,
    /// Server-assigned, monotonically increasing per vault
    pub index: u64,
    /// Server-assigned unix timestamp (ms)
    pub timestamp: u64,
}

impl RemoteEvent {
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| anyhow::anyhow!("event serialization: {e}"))
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data).map_err(|e| anyhow::anyhow!("event deserialization: {e}"))
    }
}

/// One page of remote events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub events: Vec<RemoteEvent>,
    /// Index to resume from
    pub index: u64,
    /// More events are available after `index`
    pub truncated: bool,
}

/// Derived view of a vault's sync state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Remote log identity, if one has been set
    pub vault_id: Option<String>,
    /// Unix timestamp (ms) of the last successful sync
    pub synced_at: Option<u64>,
    /// Last applied remote index
    pub index: u64,
    pub auto_sync_disabled: bool,
    /// Number of local mutations waiting to be pushed
    pub pending: usize,
}

/// Serde helper: bytes as standard base64 strings.
pub mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
