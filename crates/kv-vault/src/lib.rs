//! kv-vault: local-first encrypted vault with push/pull sync
//!
//! Data flow:
//! ```text
//! set/delete ──▶ Cipher ──▶ PendingQueue (push/<seq>/…) ──▶ Store
//!                                   │
//!                  sync ── push ────┘──▶ Remote log ──▶ pull ──▶ NonceGuard ──▶ Store + pull/<seq>/…
//! ```
//!
//! Items are encrypted under a master key that is itself wrapped once per
//! provision. The remote only ever sees ciphertext and provision metadata.

pub mod auth;
pub mod db;
pub mod history;
pub mod migrate;
pub mod pending;
pub mod replay;
pub mod sequence;
pub mod sync;
pub mod vault;

pub use history::ItemVersion;
pub use migrate::migrate_legacy;
pub use sync::{RemoteIdentity, SyncReport};
pub use vault::{Vault, VaultOptions};
