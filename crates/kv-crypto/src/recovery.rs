//! BIP-39 paper keys
//!
//! A paper key is a 24-word mnemonic shown once at provisioning time and
//! written down by the user. It is a full provision: it unwraps the master key
//! like any password does.

use bip39::Mnemonic;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::kdf::{derive_password_key, KdfParams, ProvisionKey};
use crate::SALT_SIZE;

/// Fixed salt: the mnemonic carries 256 bits of entropy on its own.
const PAPER_KEY_SALT: [u8; SALT_SIZE] = *b"kv-paper-key-v01";

/// Generate a 24-word paper key and its provision key.
pub fn generate_paper_key() -> anyhow::Result<(SecretString, ProvisionKey)> {
    let mut entropy = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy);
    entropy.zeroize();
    let mnemonic =
        mnemonic.map_err(|e| anyhow::anyhow!("BIP-39 mnemonic generation failed: {e}"))?;

    let words = SecretString::from(mnemonic.to_string());
    let key = paper_key_to_key(&words)?;
    Ok((words, key))
}

/// Derive the provision key for a paper key.
///
/// Whitespace between words is normalized before derivation.
pub fn paper_key_to_key(words: &SecretString) -> anyhow::Result<ProvisionKey> {
    let normalized = words
        .expose_secret()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let _mnemonic: Mnemonic = normalized.parse().map_err(|e| {
        tracing::debug!(words = normalized.split(' ').count(), "paper key rejected");
        anyhow::anyhow!("invalid paper key: {e}")
    })?;

    // Lighter params, since the input has high entropy
    let params = KdfParams {
        mem_cost_kib: 16384,
        time_cost: 2,
        parallelism: 1,
    };

    derive_password_key(&SecretString::from(normalized), &PAPER_KEY_SALT, &params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_paper_key() {
        let (words, key) = generate_paper_key().unwrap();
        assert_eq!(words.expose_secret().split_whitespace().count(), 24);
        assert_ne!(key.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_paper_key_roundtrip_with_sloppy_spacing() {
        let (words, key) = generate_paper_key().unwrap();
        let sloppy = SecretString::from(format!("  {}\n", words.expose_secret().replace(' ', "   ")));
        let again = paper_key_to_key(&sloppy).unwrap();
        assert_eq!(key.as_bytes(), again.as_bytes());
    }

    #[test]
    fn test_invalid_paper_key() {
        assert!(paper_key_to_key(&SecretString::from("not a paper key")).is_err());
    }
}
