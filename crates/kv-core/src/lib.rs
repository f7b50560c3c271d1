pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use error::{OpContext, RemoteError, VaultError, VaultResult};
pub use paths::{Collection, Entity, Hierarchical, LegacyFlat, PathLayout, SyncedKind};
pub use types::{
    Event, Events, HardwareParams, Item, Provision, ProvisionKind, RemoteEvent, SyncStatus,
    VaultStatus,
};

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
