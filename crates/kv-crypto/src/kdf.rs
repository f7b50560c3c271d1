//! Password provisions: Argon2id over the password and the vault salt

use argon2::{Algorithm, Argon2, Params, Version};
use kv_core::config::CryptoConfig;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};

use crate::{KEY_SIZE, SALT_SIZE};

secret_key! {
    /// What a single provision unlocks with. Its only use is opening the
    /// provision's copy of the master key.
    #[derive(Clone)]
    ProvisionKey
}

/// Cost settings for password derivation. Changing them orphans every
/// existing password provision, so they come from config rather than
/// being tuned per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    pub mem_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::from(&CryptoConfig::default())
    }
}

impl From<&CryptoConfig> for KdfParams {
    fn from(c: &CryptoConfig) -> Self {
        Self {
            mem_cost_kib: c.argon2_mem_cost_kib,
            time_cost: c.argon2_time_cost,
            parallelism: c.argon2_parallelism,
        }
    }
}

impl KdfParams {
    fn hasher(&self) -> anyhow::Result<Argon2<'static>> {
        let params = Params::new(
            self.mem_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| anyhow::anyhow!("argon2 cost settings rejected ({self:?}): {e}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Fresh vault salt. Stored in the clear at `/config/salt`.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

pub fn derive_password_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> anyhow::Result<ProvisionKey> {
    let started = std::time::Instant::now();
    let mut out = [0u8; KEY_SIZE];
    params
        .hasher()?
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut out)
        .map_err(|e| anyhow::anyhow!("password derivation: {e}"))?;
    tracing::debug!(
        mem_cost_kib = params.mem_cost_kib,
        time_cost = params.time_cost,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "argon2id key derived"
    );
    Ok(ProvisionKey::from_bytes(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHEAP: KdfParams = KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    };

    fn derive(pw: &str, salt: u8) -> [u8; KEY_SIZE] {
        *derive_password_key(&SecretString::from(pw), &[salt; SALT_SIZE], &CHEAP)
            .unwrap()
            .as_bytes()
    }

    #[test]
    fn test_same_inputs_same_key() {
        assert_eq!(derive("tr0ub4dor", 7), derive("tr0ub4dor", 7));
    }

    #[test]
    fn test_password_and_salt_both_feed_the_key() {
        let base = derive("tr0ub4dor", 7);
        assert_ne!(base, derive("tr0ub4dor&3", 7));
        assert_ne!(base, derive("tr0ub4dor", 8));
    }

    #[test]
    fn test_zero_time_cost_is_an_error() {
        let params = KdfParams {
            time_cost: 0,
            ..CHEAP
        };
        let err = derive_password_key(&SecretString::from("pw"), &[0; SALT_SIZE], &params)
            .unwrap_err();
        assert!(err.to_string().contains("argon2 cost settings"), "{err}");
    }

    #[test]
    fn test_defaults_track_config() {
        let mut config = CryptoConfig::default();
        assert_eq!(KdfParams::from(&config), KdfParams::default());
        config.argon2_time_cost = 9;
        assert_eq!(KdfParams::from(&config).time_cost, 9);
    }

    #[test]
    fn test_salts_are_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
