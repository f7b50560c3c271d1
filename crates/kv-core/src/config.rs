use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration (loaded from keyvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    pub vault: VaultConfig,
    pub remote: RemoteConfig,
    pub crypto: CryptoConfig,
    pub sync: SyncConfig,
    pub log: LogConfig,
}

/// Local store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// JSON file, written atomically on every mutation
    File,
    /// RocksDB directory (requires the `rocksdb` feature)
    Rocksdb,
    /// Process memory, lost on exit
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub backend: StoreBackend,
    /// Store file (file backend) or directory (rocksdb backend)
    pub path: PathBuf,
    /// Use the flat pre-hierarchical path layout
    pub legacy_layout: bool,
}

/// Remote event log backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteBackend {
    /// Local directory (shared folder, tests)
    Fs,
    /// S3-compatible object storage
    S3,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket
    pub bucket: String,
    /// Key prefix under which vault logs live
    pub prefix: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
    /// Maximum events returned per fetch
    pub page_limit: usize,
}

/// Argon2id parameters for password provisions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sync after mutating CLI commands when due
    pub auto_sync: bool,
    /// Minimum seconds between automatic syncs
    pub auto_sync_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: PathBuf::from("~/.local/share/keyvault/vault.json"),
            legacy_layout: false,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: RemoteBackend::Fs,
            root: PathBuf::from("~/.local/share/keyvault/remote"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "keyvault".into(),
            prefix: "vaults".into(),
            enforce_tls: false,
            page_limit: 1000,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            auto_sync_interval_secs: 3600,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl KvConfig {
    /// Load from a TOML file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[vault]
backend = "rocksdb"
path = "/var/lib/keyvault/db"
legacy_layout = true

[remote]
backend = "s3"
endpoint = "https://s3.example.com"
region = "eu-west-1"
bucket = "vaults"
prefix = "team"
enforce_tls = true
page_limit = 50

[crypto]
argon2_mem_cost_kib = 131072
argon2_time_cost = 4
argon2_parallelism = 8

[sync]
auto_sync = false
auto_sync_interval_secs = 60

[log]
level = "debug"
format = "json"
"#;
        let config: KvConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.vault.backend, StoreBackend::Rocksdb);
        assert_eq!(config.vault.path, PathBuf::from("/var/lib/keyvault/db"));
        assert!(config.vault.legacy_layout);
        assert_eq!(config.remote.backend, RemoteBackend::S3);
        assert_eq!(config.remote.bucket, "vaults");
        assert!(config.remote.enforce_tls);
        assert_eq!(config.remote.page_limit, 50);
        assert_eq!(config.crypto.argon2_mem_cost_kib, 131072);
        assert!(!config.sync.auto_sync);
        assert_eq!(config.sync.auto_sync_interval_secs, 60);
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: KvConfig = toml::from_str("").unwrap();

        assert_eq!(config.vault.backend, StoreBackend::File);
        assert!(!config.vault.legacy_layout);
        assert_eq!(config.remote.backend, RemoteBackend::Fs);
        assert_eq!(config.remote.region, "us-east-1");
        assert_eq!(config.remote.page_limit, 1000);
        assert_eq!(config.crypto.argon2_mem_cost_kib, 65536);
        assert!(config.sync.auto_sync);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[remote]
backend = "memory"
"#;
        let config: KvConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.remote.backend, RemoteBackend::Memory);
        assert_eq!(config.remote.bucket, "keyvault");
        assert_eq!(config.vault.backend, StoreBackend::File);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = KvConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: KvConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.vault.path, parsed.vault.path);
        assert_eq!(config.remote.endpoint, parsed.remote.endpoint);
        assert_eq!(config.sync.auto_sync_interval_secs, parsed.sync.auto_sync_interval_secs);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = KvConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.vault.backend, StoreBackend::File);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyvault.toml");
        std::fs::write(&path, "[sync]\nauto_sync = false\n").unwrap();
        let config = KvConfig::load(&path).unwrap();
        assert!(!config.sync.auto_sync);
    }

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(
            expand_tilde(Path::new("~/vault.json")),
            PathBuf::from(home).join("vault.json")
        );
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
