//! Store path layouts.
//!
//! Two layouts coexist. [`Hierarchical`] is the current one:
//!
//! ```text
//! /item/<id>                    current item (encrypted)
//! /auth/<provisionID>           master key wrapped under that provision's key
//! /provision/<provisionID>      provision metadata
//! /config/salt                  password-derivation salt
//! /db/increment                 sequencer high-water mark
//! /db/index                     last-applied remote index
//! /db/nonce/<nonce>             replay markers
//! /push/<015d-seq>/<orig-path>  pending outbound mutations
//! /pull/<015d-seq>/<orig-path>  applied inbound events
//! ```
//!
//! [`LegacyFlat`] keeps item ids as bare keys and everything else under
//! reserved `#`-prefixed names. Paths inside the push/pull logs and on the
//! remote are always hierarchical ("canonical") whichever layout is active.

use crate::types::LEGACY_PROVISION_ID;

/// Width of the zero-padded sequence component in log paths.
pub const SEQ_WIDTH: usize = 15;

/// A single addressable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity<'a> {
    Item(&'a str),
    Auth(&'a str),
    Provision(&'a str),
    /// Named vault configuration (`salt`, `remote`, `autosync`)
    Config(&'a str),
    /// Named sync bookkeeping (`increment`, `index`, `synced`)
    Db(&'a str),
    Nonce(&'a str),
}

/// A listable group of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Items,
    Auths,
    Provisions,
    Nonces,
    Push,
    Pull,
}

/// Records that travel through the remote log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncedKind {
    Item,
    Auth,
    Provision,
}

impl SyncedKind {
    pub fn entity(self, id: &str) -> Entity<'_> {
        match self {
            SyncedKind::Item => Entity::Item(id),
            SyncedKind::Auth => Entity::Auth(id),
            SyncedKind::Provision => Entity::Provision(id),
        }
    }
}

/// Maps entities to store paths.
pub trait PathLayout: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn path_for(&self, entity: Entity<'_>) -> String;

    /// Prefix to list a collection with. May match more than the collection;
    /// filter with [`PathLayout::id_from`].
    fn prefix(&self, collection: Collection) -> String;

    /// Extract the id from a listed path, or `None` if it is not a member.
    fn id_from(&self, collection: Collection, path: &str) -> Option<String>;

    /// Whether an item id can be stored without colliding with reserved keys.
    fn accepts_item_id(&self, _id: &str) -> bool {
        true
    }

    /// Path of a push or pull log entry.
    fn log_path(&self, log: Collection, seq: &str, canonical: &str) -> String {
        format!("{}{seq}{canonical}", self.prefix(log))
    }

    /// Split a log entry path into `(seq, canonical path)`.
    fn split_log<'p>(&self, log: Collection, path: &'p str) -> Option<(&'p str, &'p str)> {
        let prefix = self.prefix(log);
        let rest = path.strip_prefix(prefix.as_str())?;
        if rest.len() <= SEQ_WIDTH || !rest.is_char_boundary(SEQ_WIDTH) {
            return None;
        }
        let (seq, canonical) = rest.split_at(SEQ_WIDTH);
        if !seq.bytes().all(|b| b.is_ascii_digit()) || !canonical.starts_with('/') {
            return None;
        }
        Some((seq, canonical))
    }
}

/// The current `/kind/id` layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hierarchical;

impl PathLayout for Hierarchical {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    fn path_for(&self, entity: Entity<'_>) -> String {
        match entity {
            Entity::Item(id) => format!("/item/{id}"),
            Entity::Auth(id) => format!("/auth/{id}"),
            Entity::Provision(id) => format!("/provision/{id}"),
            Entity::Config(name) => format!("/config/{name}"),
            Entity::Db(name) => format!("/db/{name}"),
            Entity::Nonce(nonce) => format!("/db/nonce/{nonce}"),
        }
    }

    fn prefix(&self, collection: Collection) -> String {
        match collection {
            Collection::Items => "/item/",
            Collection::Auths => "/auth/",
            Collection::Provisions => "/provision/",
            Collection::Nonces => "/db/nonce/",
            Collection::Push => "/push/",
            Collection::Pull => "/pull/",
        }
        .to_string()
    }

    fn id_from(&self, collection: Collection, path: &str) -> Option<String> {
        let id = path.strip_prefix(self.prefix(collection).as_str())?;
        (!id.is_empty()).then(|| id.to_string())
    }
}

/// The flat layout of older stores: bare item ids, `#`-prefixed reserved keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyFlat;

impl PathLayout for LegacyFlat {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn path_for(&self, entity: Entity<'_>) -> String {
        match entity {
            Entity::Item(id) => id.to_string(),
            Entity::Auth(id) if id == LEGACY_PROVISION_ID => "#auth".to_string(),
            Entity::Auth(id) => format!("#auth-{id}"),
            Entity::Provision(id) => format!("#provision-{id}"),
            Entity::Config("salt") => "#salt".to_string(),
            Entity::Config(name) => format!("#config/{name}"),
            Entity::Db(name) => format!("#{name}"),
            Entity::Nonce(nonce) => format!("#nonce/{nonce}"),
        }
    }

    fn prefix(&self, collection: Collection) -> String {
        match collection {
            Collection::Items => "",
            Collection::Auths => "#auth",
            Collection::Provisions => "#provision-",
            Collection::Nonces => "#nonce/",
            Collection::Push => "#push/",
            Collection::Pull => "#pull/",
        }
        .to_string()
    }

    fn id_from(&self, collection: Collection, path: &str) -> Option<String> {
        match collection {
            Collection::Items => {
                (!path.is_empty() && !path.starts_with('#')).then(|| path.to_string())
            }
            Collection::Auths => match path {
                "#auth" => Some(LEGACY_PROVISION_ID.to_string()),
                _ => path
                    .strip_prefix("#auth-")
                    .filter(|id| !id.is_empty())
                    .map(str::to_string),
            },
            _ => {
                let id = path.strip_prefix(self.prefix(collection).as_str())?;
                (!id.is_empty()).then(|| id.to_string())
            }
        }
    }

    fn accepts_item_id(&self, id: &str) -> bool {
        !id.starts_with('#')
    }
}

/// Canonical (remote) path of a synced record.
pub fn canonical_path(kind: SyncedKind, id: &str) -> String {
    Hierarchical.path_for(kind.entity(id))
}

/// Parse a canonical path into the kind of record it names.
pub fn parse_canonical(path: &str) -> Option<(SyncedKind, &str)> {
    let (kind, id) = if let Some(id) = path.strip_prefix("/item/") {
        (SyncedKind::Item, id)
    } else if let Some(id) = path.strip_prefix("/auth/") {
        (SyncedKind::Auth, id)
    } else if let Some(id) = path.strip_prefix("/provision/") {
        (SyncedKind::Provision, id)
    } else {
        return None;
    };
    (!id.is_empty()).then_some((kind, id))
}

/// Zero-padded sequence string for log paths.
pub fn format_seq(n: u64) -> String {
    format!("{n:0width$}", width = SEQ_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchical_paths() {
        let l = Hierarchical;
        assert_eq!(l.path_for(Entity::Item("github")), "/item/github");
        assert_eq!(l.path_for(Entity::Auth("p1")), "/auth/p1");
        assert_eq!(l.path_for(Entity::Provision("p1")), "/provision/p1");
        assert_eq!(l.path_for(Entity::Config("salt")), "/config/salt");
        assert_eq!(l.path_for(Entity::Db("increment")), "/db/increment");
        assert_eq!(l.path_for(Entity::Db("index")), "/db/index");
        assert_eq!(l.path_for(Entity::Nonce("n1")), "/db/nonce/n1");
        assert_eq!(
            l.log_path(Collection::Push, &format_seq(1), "/item/github"),
            "/push/000000000000001/item/github"
        );
    }

    #[test]
    fn hierarchical_ids_may_contain_slashes() {
        let l = Hierarchical;
        let path = l.path_for(Entity::Item("a/b"));
        assert_eq!(l.id_from(Collection::Items, &path).as_deref(), Some("a/b"));
        assert_eq!(l.id_from(Collection::Items, "/auth/x"), None);
    }

    #[test]
    fn split_log_entries() {
        let l = Hierarchical;
        let path = l.log_path(Collection::Pull, &format_seq(42), "/item/a/b");
        assert_eq!(
            l.split_log(Collection::Pull, &path),
            Some(("000000000000042", "/item/a/b"))
        );
        assert_eq!(l.split_log(Collection::Push, &path), None);
        assert_eq!(l.split_log(Collection::Pull, "/pull/12/item/a"), None);
    }

    #[test]
    fn legacy_paths() {
        let l = LegacyFlat;
        assert_eq!(l.path_for(Entity::Item("github")), "github");
        assert_eq!(l.path_for(Entity::Auth(LEGACY_PROVISION_ID)), "#auth");
        assert_eq!(l.path_for(Entity::Auth("p1")), "#auth-p1");
        assert_eq!(l.path_for(Entity::Config("salt")), "#salt");
        assert_eq!(l.path_for(Entity::Db("increment")), "#increment");
        assert_eq!(l.id_from(Collection::Items, "github").as_deref(), Some("github"));
        assert_eq!(l.id_from(Collection::Items, "#salt"), None);
        assert_eq!(
            l.id_from(Collection::Auths, "#auth").as_deref(),
            Some(LEGACY_PROVISION_ID)
        );
        assert_eq!(l.id_from(Collection::Auths, "#auth-p1").as_deref(), Some("p1"));
        assert!(!l.accepts_item_id("#salt"));
        assert_eq!(
            l.log_path(Collection::Push, &format_seq(3), "/item/github"),
            "#push/000000000000003/item/github"
        );
    }

    #[test]
    fn canonical_roundtrip() {
        let path = canonical_path(SyncedKind::Provision, "p1");
        assert_eq!(parse_canonical(&path), Some((SyncedKind::Provision, "p1")));
        assert_eq!(parse_canonical("/db/index"), None);
        assert_eq!(parse_canonical("/item/"), None);
        assert_eq!(parse_canonical(""), None);
    }
}
