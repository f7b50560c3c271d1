use kv_core::{now_millis, Entity, VaultError, VaultResult};

use crate::db::Db;

/// Per-event nonce markers. Check strictly before applying an event, commit
/// strictly after.
#[derive(Debug, Clone)]
pub struct NonceGuard {
    db: Db,
}

impl NonceGuard {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn check(&self, nonce: &str) -> VaultResult<()> {
        if nonce.is_empty() {
            return Err(VaultError::InvalidEvent("empty nonce".into()));
        }
        if self.db.exists(Entity::Nonce(nonce))? {
            tracing::warn!(nonce, "replayed event rejected");
            return Err(VaultError::ReplayDetected(nonce.to_string()));
        }
        Ok(())
    }

    pub fn commit(&self, nonce: &str) -> VaultResult<()> {
        self.db
            .set(Entity::Nonce(nonce), now_millis().to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_core::Hierarchical;
    use kv_store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_check_then_commit() {
        let guard = NonceGuard::new(Db::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Hierarchical),
        ));
        guard.check("n1").unwrap();
        guard.check("n1").unwrap();
        guard.commit("n1").unwrap();
        assert!(matches!(
            guard.check("n1"),
            Err(VaultError::ReplayDetected(n)) if n == "n1"
        ));
        guard.check("n2").unwrap();
        assert!(matches!(guard.check(""), Err(VaultError::InvalidEvent(_))));
    }
}
