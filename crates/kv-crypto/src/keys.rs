//! The master key and its per-provision wrapped copies

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::envelope::{self, OpenError};
use crate::kdf::ProvisionKey;
use crate::KEY_SIZE;

/// Domain separation for keys derived from hardware-token secrets.
const HARDWARE_INFO: &[u8] = b"kv-hardware";

secret_key! {
    /// Encrypts every item. Only ever written to storage wrapped under a
    /// provision key.
    MasterKey
}

pub fn generate_master_key() -> MasterKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    MasterKey::from_bytes(bytes)
}

/// Turn the response a hardware token gave for its provision salt into a
/// provision key. Responses under 32 bytes are refused.
pub fn hardware_key(secret: &[u8]) -> anyhow::Result<ProvisionKey> {
    anyhow::ensure!(
        secret.len() >= KEY_SIZE,
        "hardware secret is {} bytes, need {KEY_SIZE} or more",
        secret.len()
    );
    let mut out = [0u8; KEY_SIZE];
    Hkdf::<Sha256>::new(None, secret)
        .expand(HARDWARE_INFO, &mut out)
        .map_err(|e| anyhow::anyhow!("hardware key expansion: {e}"))?;
    Ok(ProvisionKey::from_bytes(out))
}

/// Seal the master key for storage at `/auth/<provision id>`.
pub fn wrap_master_key(key: &ProvisionKey, master: &MasterKey) -> anyhow::Result<Vec<u8>> {
    envelope::seal(key.as_bytes(), master.as_bytes())
        .map_err(|e| anyhow::anyhow!("sealing master key: {e}"))
}

/// Open an auth entry. Any failure means this provision key does not belong
/// to the entry, or the entry is damaged.
pub fn unwrap_master_key(key: &ProvisionKey, wrapped: &[u8]) -> anyhow::Result<MasterKey> {
    let mut opened = envelope::open(key.as_bytes(), wrapped).map_err(|e| match e {
        OpenError::Truncated => {
            tracing::warn!(len = wrapped.len(), "truncated auth entry");
            anyhow::anyhow!("auth entry truncated ({} bytes)", wrapped.len())
        }
        OpenError::Rejected => anyhow::anyhow!("auth entry did not authenticate"),
    })?;

    let bytes = <[u8; KEY_SIZE]>::try_from(opened.as_slice());
    let len = opened.len();
    opened.zeroize();
    bytes
        .map(MasterKey::from_bytes)
        .map_err(|_| anyhow::anyhow!("auth entry holds {len} bytes, not a {KEY_SIZE}-byte key"))
}
