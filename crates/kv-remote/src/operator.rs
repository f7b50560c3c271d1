//! OpenDAL Operator factory for remote event logs

use anyhow::{Context, Result};
use kv_core::config::{expand_tilde, RemoteBackend, RemoteConfig};
use opendal::Operator;

/// Minimal config needed to build an S3 operator
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// S3 access keys, loaded by the caller (usually from the environment).
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build an OpenDAL Operator for any S3-compatible endpoint
///
/// Uses path-style addressing (default in opendal 0.55), which SeaweedFS and
/// MinIO require.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build an operator from `[remote]` config.
///
/// For s3: if `enforce_tls` is true and the endpoint uses HTTP, this returns
/// an error. Otherwise a warning is logged for non-HTTPS endpoints.
pub fn build_from_config(
    remote: &RemoteConfig,
    credentials: Option<&S3Credentials>,
) -> Result<Operator> {
    match remote.backend {
        RemoteBackend::Fs => {
            let root = expand_tilde(&remote.root);
            let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
            Ok(Operator::new(builder)
                .with_context(|| format!("creating OpenDAL fs operator at {}", root.display()))?
                .layer(opendal::layers::LoggingLayer::default())
                .finish())
        }
        RemoteBackend::Memory => Ok(Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish()),
        RemoteBackend::S3 => {
            if remote.endpoint.starts_with("http://") {
                if remote.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set remote.enforce_tls = false for local development.",
                        remote.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %remote.endpoint,
                    "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted. \
                     Set remote.enforce_tls = true and use HTTPS in production."
                );
            }
            let creds = credentials.context(
                "S3 credentials not set: export AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY",
            )?;

            build_operator(&StorageConfig {
                endpoint: remote.endpoint.clone(),
                region: remote.region.clone(),
                bucket: remote.bucket.clone(),
                access_key_id: creds.access_key_id.clone(),
                secret_access_key: creds.secret_access_key.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> S3Credentials {
        S3Credentials {
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
        }
    }

    fn s3(endpoint: &str, enforce_tls: bool) -> RemoteConfig {
        RemoteConfig {
            backend: RemoteBackend::S3,
            endpoint: endpoint.into(),
            enforce_tls,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_operator_valid() {
        let cfg = StorageConfig {
            endpoint: "http://localhost:8333".to_string(),
            region: "us-east-1".to_string(),
            bucket: "test-bucket".to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
        };
        assert!(build_operator(&cfg).is_ok());
    }

    #[test]
    fn test_http_allowed_without_enforce_tls() {
        assert!(build_from_config(&s3("http://localhost:8333", false), Some(&creds())).is_ok());
    }

    #[test]
    fn test_http_rejected_with_enforce_tls() {
        let result = build_from_config(&s3("http://insecure:8333", true), Some(&creds()));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("enforce_tls"), "{err}");
    }

    #[test]
    fn test_https_with_enforce_tls() {
        assert!(build_from_config(&s3("https://s3.example.com", true), Some(&creds())).is_ok());
    }

    #[test]
    fn test_s3_requires_credentials() {
        assert!(build_from_config(&s3("https://s3.example.com", true), None).is_err());
    }

    #[test]
    fn test_fs_operator() {
        let dir = tempfile::tempdir().unwrap();
        let remote = RemoteConfig {
            backend: RemoteBackend::Fs,
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(build_from_config(&remote, None).is_ok());
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let dbg = format!("{:?}", creds());
        assert!(!dbg.contains("secret\""));
        assert!(dbg.contains("REDACTED"));
    }
}
