//! Remote reachability check

use anyhow::Result;
use opendal::{ErrorKind, Operator};

/// List the directory vault logs live under. A prefix that does not exist
/// yet counts as healthy: the first push creates it.
pub async fn check_health(op: &Operator, prefix: &str) -> Result<()> {
    let dir = format!("{}/", prefix.trim_matches('/'));
    match op.list(&dir).await {
        Ok(entries) => {
            tracing::debug!(prefix = %dir, vaults = entries.len(), "remote reachable");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow::anyhow!("remote health check failed at {dir}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_memory_operator_is_healthy() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        assert!(check_health(&op, "vaults").await.is_ok());

        op.write("vaults/abc/head", b"{}".to_vec()).await.unwrap();
        assert!(check_health(&op, "/vaults/").await.is_ok());
    }
}
