//! kv-crypto: client-side encryption for keyvault
//!
//! Key hierarchy:
//! ```text
//! Provision key (256-bit, one per credential)
//!   password         Argon2id(password, /config/salt)
//!   paper key        Argon2id(BIP-39 mnemonic, fixed salt)
//!   hardware secret  HKDF-SHA256(device secret, "kv-hardware")
//!   └── wraps Master Key (256-bit random, XChaCha20-Poly1305)
//!         └── encrypts every Item (XChaCha20-Poly1305, random 192-bit nonce)
//!
//! Remote Key (256-bit random, independent of the master key)
//!   └── Vault ID = BLAKE3(remote key), names the remote event log
//! ```

/// Fixed-size secret, zeroized on drop, `Debug` prints `[REDACTED]`.
macro_rules! secret_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name {
            bytes: [u8; $crate::KEY_SIZE],
        }

        impl $name {
            pub fn from_bytes(bytes: [u8; $crate::KEY_SIZE]) -> Self {
                Self { bytes }
            }

            pub fn as_bytes(&self) -> &[u8; $crate::KEY_SIZE] {
                &self.bytes
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                zeroize::Zeroize::zeroize(&mut self.bytes);
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(concat!(stringify!($name), "([REDACTED])"))
            }
        }
    };
}

pub mod envelope;
pub mod item;
pub mod kdf;
pub mod keys;
pub mod recovery;
pub mod remote;

pub use item::{decrypt_item, encrypt_item};
pub use kdf::{derive_password_key, generate_salt, KdfParams, ProvisionKey};
pub use keys::{generate_master_key, hardware_key, unwrap_master_key, wrap_master_key, MasterKey};
pub use recovery::{generate_paper_key, paper_key_to_key};
pub use remote::RemoteKey;

/// Size of every symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the password-derivation salt
pub const SALT_SIZE: usize = 16;
