//! One-way migration from the flat layout to the hierarchical one.

use kv_core::types::LEGACY_PROVISION_ID;
use kv_core::{Entity, Hierarchical, PathLayout, VaultResult};
use kv_store::Store;

/// Hierarchical path for a flat-layout key, or `None` if `path` is already
/// hierarchical.
pub fn legacy_to_hierarchical(path: &str) -> Option<String> {
    let h = Hierarchical;
    if path.starts_with('/') || path.is_empty() {
        return None;
    }
    let Some(name) = path.strip_prefix('#') else {
        return Some(h.path_for(Entity::Item(path)));
    };

    let mapped = if name == "auth" {
        h.path_for(Entity::Auth(LEGACY_PROVISION_ID))
    } else if let Some(id) = name.strip_prefix("auth-") {
        h.path_for(Entity::Auth(id))
    } else if let Some(id) = name.strip_prefix("provision-") {
        h.path_for(Entity::Provision(id))
    } else if name == "salt" {
        h.path_for(Entity::Config("salt"))
    } else if let Some(n) = name.strip_prefix("config/") {
        h.path_for(Entity::Config(n))
    } else if let Some(n) = name.strip_prefix("nonce/") {
        h.path_for(Entity::Nonce(n))
    } else if name.starts_with("push/") || name.starts_with("pull/") {
        format!("/{name}")
    } else {
        h.path_for(Entity::Db(name))
    };
    Some(mapped)
}

/// Move every flat-layout record to its hierarchical path. Each record is
/// copied before its old key is removed, so an interrupted migration can be
/// re-run. Returns the number of records moved.
pub fn migrate_legacy(store: &dyn Store) -> VaultResult<usize> {
    let mut moved = 0;
    for entry in store.list("", None, true)? {
        let Some(target) = legacy_to_hierarchical(&entry.path) else {
            continue;
        };
        let data = entry.data.unwrap_or_default();
        store.set(&target, &data)?;
        store.delete(&entry.path)?;
        tracing::debug!(from = %entry.path, to = %target, "migrated record");
        moved += 1;
    }
    if moved > 0 {
        tracing::info!(moved, "migrated legacy store layout");
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping() {
        let cases = [
            ("github", "/item/github"),
            ("#auth", "/auth/legacy"),
            ("#auth-p1", "/auth/p1"),
            ("#provision-p1", "/provision/p1"),
            ("#salt", "/config/salt"),
            ("#config/remote", "/config/remote"),
            ("#increment", "/db/increment"),
            ("#index", "/db/index"),
            ("#nonce/abc", "/db/nonce/abc"),
            (
                "#push/000000000000001/item/github",
                "/push/000000000000001/item/github",
            ),
        ];
        for (legacy, expected) in cases {
            assert_eq!(
                legacy_to_hierarchical(legacy).as_deref(),
                Some(expected),
                "{legacy}"
            );
        }
        assert_eq!(legacy_to_hierarchical("/item/github"), None);
    }
}
