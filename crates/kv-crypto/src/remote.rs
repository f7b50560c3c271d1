//! Remote identity key

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// Key that identifies a vault's remote event log. Anyone holding it can
/// clone the (still encrypted) vault.
#[derive(Clone)]
pub struct RemoteKey {
    bytes: [u8; KEY_SIZE],
}

impl RemoteKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    pub fn from_base64(s: &str) -> anyhow::Result<Self> {
        let mut decoded = STANDARD
            .decode(s.trim())
            .map_err(|e| anyhow::anyhow!("invalid remote key encoding: {e}"))?;
        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            anyhow::bail!("remote key has wrong size: {len} bytes (expected {KEY_SIZE})");
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { bytes })
    }

    /// Public name of the remote log: hex BLAKE3 of the key.
    pub fn vault_id(&self) -> String {
        blake3::hash(&self.bytes).to_hex().to_string()
    }
}

impl Drop for RemoteKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for RemoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteKey")
            .field("vault_id", &self.vault_id())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
