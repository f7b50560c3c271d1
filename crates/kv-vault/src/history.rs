//! Item version history from the pull and push logs.
//!
//! Applied remote events come first, then mutations still waiting to be
//! pushed, each in sequence order. This scans both logs in full and is meant
//! for diagnostics.

use kv_core::paths::canonical_path;
use kv_core::{Collection, Item, RemoteEvent, SyncedKind, VaultError, VaultResult};
use kv_crypto::{decrypt_item, MasterKey};

use crate::db::Db;

/// One version of an item. A deletion carries a tombstone item and
/// `deleted`; an item stored with empty data is not a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemVersion {
    pub item: Item,
    pub deleted: bool,
    /// Not yet pushed
    pub pending: bool,
    /// Remote index, for synced versions
    pub index: Option<u64>,
    /// Remote timestamp (ms), for synced versions
    pub timestamp: Option<u64>,
}

pub fn item_history(db: &Db, mk: Option<&MasterKey>, id: &str) -> VaultResult<Vec<ItemVersion>> {
    let target = canonical_path(SyncedKind::Item, id);
    let layout = db.layout();
    let mut versions = Vec::new();

    for entry in db.log(Collection::Pull)? {
        if layout
            .split_log(Collection::Pull, &entry.path)
            .is_none_or(|(_, path)| path != target)
        {
            continue;
        }
        let event = RemoteEvent::from_bytes(entry.data.as_deref().unwrap_or_default())
            .map_err(|e| VaultError::corrupt(&entry.path, e))?;
        versions.push(ItemVersion {
            item: decode(id, &event.event.data, mk)?,
            deleted: event.event.data.is_empty(),
            pending: false,
            index: Some(event.index),
            timestamp: Some(event.timestamp),
        });
    }

    for entry in db.log(Collection::Push)? {
        if layout
            .split_log(Collection::Push, &entry.path)
            .is_none_or(|(_, path)| path != target)
        {
            continue;
        }
        let data = entry.data.as_deref().unwrap_or_default();
        versions.push(ItemVersion {
            item: decode(id, data, mk)?,
            deleted: data.is_empty(),
            pending: true,
            index: None,
            timestamp: None,
        });
    }

    Ok(versions)
}

fn decode(id: &str, data: &[u8], mk: Option<&MasterKey>) -> VaultResult<Item> {
    if data.is_empty() {
        Ok(Item::tombstone(id))
    } else {
        decrypt_item(data, mk)
    }
}
