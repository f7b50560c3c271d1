//! kv: keyvault command-line interface
//!
//! Vault commands:
//!   setup                       - create the vault with a password
//!   unlock                      - check a credential
//!   set <id> [<value>]          - store a secret (prompts when no value given)
//!   get <id> | delete <id>      - read or remove a secret
//!   list | history <id>         - list secrets, show versions of one
//!
//! Provision commands:
//!   provision password|paper-key, provisions, deprovision <id> [--force]
//!
//! Sync commands:
//!   sync, clone --key <k> --salt <s>, unsync, remote show|check, autosync on|off
//!
//! Every command that reads or writes secrets unlocks the vault first, with
//! KV_PASSWORD (or KV_PAPER_KEY with --paper-key) or an interactive prompt.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use kv_core::config::{expand_tilde, KvConfig, RemoteBackend, StoreBackend};
use kv_core::{now_millis, Hierarchical, Item, LegacyFlat, PathLayout, VaultStatus};
use kv_crypto::KdfParams;
use kv_remote::{build_from_config, build_remote, check_health, S3Credentials};
use kv_vault::{migrate_legacy, RemoteIdentity, Vault, VaultOptions};
use secrecy::{ExposeSecret, SecretString};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "kv",
    version,
    about = "End-to-end encrypted secret vault",
    long_about = "kv: store secrets in a local encrypted vault and sync them between devices"
)]
struct Cli {
    /// Path to keyvault.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "KV_CONFIG",
        default_value = "~/.config/keyvault/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "KV_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "KV_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Unlock with a paper key instead of the password
    #[arg(long, global = true)]
    paper_key: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show lock state and sync status
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the vault, protected by a password
    Setup,

    /// Check a credential: unlock and report which provision it opened
    Unlock,

    /// Store a secret
    Set {
        id: String,
        /// Secret value (prompted without echo when omitted)
        value: Option<String>,
        /// Free-form type tag
        #[arg(long, short = 't', default_value = "")]
        kind: String,
    },

    /// Print a secret
    Get { id: String },

    /// Remove a secret
    Delete { id: String },

    /// List secret ids
    List,

    /// Show every known version of a secret
    History { id: String },

    /// Add a way to unlock the vault
    Provision {
        #[command(subcommand)]
        kind: ProvisionAction,
    },

    /// List provisions
    Provisions,

    /// Remove a provision
    Deprovision {
        id: String,
        /// Allow removing the last provision (locks the vault for good)
        #[arg(long)]
        force: bool,
    },

    /// Push local changes and pull remote ones
    Sync,

    /// Populate this empty vault from another device's remote log
    ///
    /// Get the key and salt by running `kv remote show` on the other device.
    Clone {
        #[arg(long, env = "KV_REMOTE_KEY")]
        key: String,
        #[arg(long, env = "KV_REMOTE_SALT")]
        salt: String,
    },

    /// Delete the remote log; the next sync republishes under a new identity
    Unsync {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Remote identity
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },

    /// Enable or disable sync after mutating commands
    Autosync { state: Toggle },

    /// Move a vault from the flat key layout to the hierarchical one
    Migrate,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ProvisionAction {
    /// An additional password
    Password,
    /// A 24-word recovery phrase, shown once
    PaperKey,
}

#[derive(Subcommand, Debug)]
enum RemoteAction {
    /// Print what another device needs for `kv clone`
    Show,
    /// Check that the configured remote storage is reachable
    Check,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = KvConfig::load(&config_path)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match &cli.log_format {
        Some(f) => f.clone(),
        None if config.log.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);

    // commands that do not need a vault
    match cli.command {
        Commands::Config {
            action: ConfigAction::Show,
        } => return cmd_config_show(&config, &config_path),
        Commands::Migrate => return cmd_migrate(&config),
        Commands::Remote {
            action: RemoteAction::Check,
        } => return cmd_remote_check(&config).await,
        _ => {}
    }

    let vault = open_vault(&config)?;
    let mutated = matches!(
        cli.command,
        Commands::Set { .. }
            | Commands::Delete { .. }
            | Commands::Provision { .. }
            | Commands::Deprovision { .. }
    );

    match cli.command {
        Commands::Status { json } => cmd_status(&vault, json)?,
        Commands::Setup => cmd_setup(&vault)?,
        Commands::Unlock => {
            let id = unlock(&vault, cli.paper_key)?;
            println!("Unlocked with provision {id}");
        }
        Commands::Set { id, value, kind } => {
            unlock(&vault, cli.paper_key)?;
            cmd_set(&vault, id, value, kind)?;
        }
        Commands::Get { id } => {
            unlock(&vault, cli.paper_key)?;
            cmd_get(&vault, &id)?;
        }
        Commands::Delete { id } => {
            unlock(&vault, cli.paper_key)?;
            vault.delete(&id)?;
            println!("Deleted: {id}");
        }
        Commands::List => {
            unlock(&vault, cli.paper_key)?;
            cmd_list(&vault)?;
        }
        Commands::History { id } => {
            unlock(&vault, cli.paper_key)?;
            cmd_history(&vault, &id)?;
        }
        Commands::Provision { kind } => {
            unlock(&vault, cli.paper_key)?;
            cmd_provision(&vault, kind)?;
        }
        Commands::Provisions => cmd_provisions(&vault)?,
        Commands::Deprovision { id, force } => {
            unlock(&vault, cli.paper_key)?;
            vault.deprovision(&id, force)?;
            println!("Removed provision {id}");
        }
        Commands::Sync => cmd_sync(&vault).await?,
        Commands::Clone { key, salt } => cmd_clone(&vault, &key, &salt).await?,
        Commands::Unsync { yes } => cmd_unsync(&vault, yes).await?,
        Commands::Remote {
            action: RemoteAction::Show,
        } => cmd_remote_show(&vault)?,
        Commands::Remote {
            action: RemoteAction::Check,
        } => {}
        Commands::Autosync { state } => {
            vault.set_auto_sync(matches!(state, Toggle::On))?;
            println!("Auto-sync {}", if matches!(state, Toggle::On) { "on" } else { "off" });
        }
        Commands::Migrate | Commands::Config { .. } => {}
    }

    if mutated && config.sync.auto_sync {
        auto_sync(&vault, Duration::from_secs(config.sync.auto_sync_interval_secs)).await;
    }
    Ok(())
}

// ── Setup helpers ─────────────────────────────────────────────────────────────

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(stderr.json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .init(),
    }
}

fn open_vault(config: &KvConfig) -> Result<Vault> {
    let store = kv_store::open_store(&config.vault).context("opening local store")?;
    let credentials = s3_credentials_from_env(config)?;
    let remote = build_remote(&config.remote, credentials.as_ref()).context("building remote")?;
    let layout: Arc<dyn PathLayout> = if config.vault.legacy_layout {
        Arc::new(LegacyFlat)
    } else {
        Arc::new(Hierarchical)
    };

    Ok(Vault::open(
        store,
        VaultOptions {
            layout,
            remote: Some(remote),
            kdf: KdfParams::from(&config.crypto),
        },
    ))
}

/// S3 credentials from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY. Only
/// required for the s3 remote backend.
fn s3_credentials_from_env(config: &KvConfig) -> Result<Option<S3Credentials>> {
    if config.remote.backend != RemoteBackend::S3 {
        return Ok(None);
    }
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("KV_ACCESS_KEY_ID"))
        .context(
            "S3 credentials not set\n\
             Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.",
        )?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("KV_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
    Ok(Some(S3Credentials {
        access_key_id,
        secret_access_key,
    }))
}

/// Read a secret from `var`, or prompt for it without echo.
fn read_secret(var: &str, prompt: &str) -> Result<SecretString> {
    if let Ok(value) = std::env::var(var) {
        return Ok(SecretString::from(value));
    }
    let value = rpassword::prompt_password(prompt).context("reading from terminal")?;
    Ok(SecretString::from(value))
}

/// Unlock the vault, returning the id of the provision that opened it.
fn unlock(vault: &Vault, paper_key: bool) -> Result<String> {
    match vault.status()? {
        VaultStatus::Unlocked => anyhow::bail!("vault is already unlocked"),
        VaultStatus::SetupNeeded => anyhow::bail!("vault is not set up yet: run `kv setup` or `kv clone`"),
        VaultStatus::Locked => {}
    }
    let id = if paper_key {
        let words = read_secret("KV_PAPER_KEY", "Paper key: ")?;
        vault.unlock_paper_key(&words)?
    } else {
        let password = read_secret("KV_PASSWORD", "Password: ")?;
        vault.unlock_password(&password)?
    };
    tracing::debug!(provision = %id, "unlocked");
    Ok(id)
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Sync after a mutation if the interval has passed. Failures only warn:
/// the change is already stored locally and will go out with the next sync.
async fn auto_sync(vault: &Vault, interval: Duration) {
    match vault.auto_sync_due(now_millis(), interval) {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            tracing::warn!("auto-sync check failed: {e}");
            return;
        }
    }
    let pb = make_spinner("sync");
    pb.set_message("auto-sync");
    match vault.sync().await {
        Ok(report) => pb.finish_with_message(format!(
            "auto-sync: {} pushed, {} pulled",
            report.pushed, report.pulled
        )),
        Err(e) => {
            pb.finish_and_clear();
            tracing::warn!("auto-sync failed: {e}");
        }
    }
}

// ── `kv status` ───────────────────────────────────────────────────────────────

fn cmd_status(vault: &Vault, json: bool) -> Result<()> {
    let status = vault.status()?;
    let sync = vault.sync_status()?;

    if json {
        let value = serde_json::json!({
            "status": status,
            "layout": vault.layout_name(),
            "sync": sync,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let state = match status {
        VaultStatus::SetupNeeded => "setup needed",
        VaultStatus::Locked => "locked",
        VaultStatus::Unlocked => "unlocked",
    };
    println!("vault:     {state} ({} layout)", vault.layout_name());
    match &sync.vault_id {
        Some(id) => println!("remote:    {id}"),
        None => println!("remote:    (never synced)"),
    }
    println!("index:     {}", sync.index);
    println!("pending:   {}", sync.pending);
    match sync.synced_at {
        Some(ms) => println!("synced:    {} ({}s ago)", ms, now_millis().saturating_sub(ms) / 1000),
        None => println!("synced:    never"),
    }
    println!(
        "auto-sync: {}",
        if sync.auto_sync_disabled { "off" } else { "on" }
    );
    Ok(())
}

// ── `kv setup` ────────────────────────────────────────────────────────────────

fn cmd_setup(vault: &Vault) -> Result<()> {
    if vault.status()? != VaultStatus::SetupNeeded {
        anyhow::bail!("vault is already set up");
    }
    let password = new_password()?;
    let provision = vault.setup_password(&password)?;
    println!("Vault created. Password provision: {}", provision.id);
    println!("Consider adding a recovery phrase: kv provision paper-key");
    Ok(())
}

fn new_password() -> Result<SecretString> {
    if let Ok(value) = std::env::var("KV_NEW_PASSWORD") {
        return Ok(SecretString::from(value));
    }
    let first = rpassword::prompt_password("New password: ").context("reading password")?;
    let second = rpassword::prompt_password("Repeat password: ").context("reading password")?;
    if first != second {
        anyhow::bail!("passwords do not match");
    }
    if first.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(SecretString::from(first))
}

// ── item commands ─────────────────────────────────────────────────────────────

fn cmd_set(vault: &Vault, id: String, value: Option<String>, kind: String) -> Result<()> {
    let value = match value {
        Some(v) => SecretString::from(v),
        None => read_secret("KV_VALUE", "Value: ")?,
    };
    let item = Item::new(id, value.expose_secret().as_bytes(), kind);
    vault.set(&item)?;
    println!("Stored: {}", item.id);
    Ok(())
}

fn cmd_get(vault: &Vault, id: &str) -> Result<()> {
    let item = vault
        .get(id)?
        .with_context(|| format!("no such item: {id}"))?;
    println!("{}", String::from_utf8_lossy(&item.data));
    Ok(())
}

fn cmd_list(vault: &Vault) -> Result<()> {
    let items = vault.items()?;
    if items.is_empty() {
        println!("(no items)");
    }
    for item in &items {
        if item.kind.is_empty() {
            println!("{}", item.id);
        } else {
            println!("{}  [{}]", item.id, item.kind);
        }
    }
    Ok(())
}

fn cmd_history(vault: &Vault, id: &str) -> Result<()> {
    let versions = vault.history(id)?;
    if versions.is_empty() {
        anyhow::bail!("no history for {id}");
    }
    for v in &versions {
        let origin = match (v.pending, v.index) {
            (true, _) => "pending".to_string(),
            (false, Some(index)) => format!("#{index}"),
            (false, None) => "-".to_string(),
        };
        let value = if v.deleted {
            "<deleted>".to_string()
        } else {
            String::from_utf8_lossy(&v.item.data).into_owned()
        };
        println!("{origin:>8}  {value}");
    }
    Ok(())
}

// ── provision commands ────────────────────────────────────────────────────────

fn cmd_provision(vault: &Vault, kind: ProvisionAction) -> Result<()> {
    match kind {
        ProvisionAction::Password => {
            let password = new_password()?;
            let provision = vault.provision_password(&password)?;
            println!("Added password provision {}", provision.id);
        }
        ProvisionAction::PaperKey => {
            let (words, provision) = vault.provision_paper_key()?;
            println!("Added paper key provision {}", provision.id);
            println!();
            println!("  {}", words.expose_secret());
            println!();
            println!("Write these words down. They are not stored and cannot be shown again.");
        }
    }
    Ok(())
}

fn cmd_provisions(vault: &Vault) -> Result<()> {
    for p in vault.provisions()? {
        let hw = if p.hardware.is_some() { "  (hardware)" } else { "" };
        println!("{}  {}{}", p.id, p.kind, hw);
    }
    Ok(())
}

// ── sync commands ─────────────────────────────────────────────────────────────

async fn cmd_sync(vault: &Vault) -> Result<()> {
    let pb = make_spinner("sync");
    pb.set_message("pushing and pulling");
    let report = match vault.sync().await {
        Ok(r) => r,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e.into());
        }
    };
    pb.finish_with_message(format!(
        "{} pushed, {} pulled (index {})",
        report.pushed, report.pulled, report.index
    ));
    Ok(())
}

async fn cmd_clone(vault: &Vault, key: &str, salt: &str) -> Result<()> {
    let identity = RemoteIdentity::decode(key, salt).context("decoding remote identity")?;
    let pb = make_spinner("clone");
    pb.set_message(identity.vault_id());
    let pulled = match vault.clone_from(&identity).await {
        Ok(n) => n,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e.into());
        }
    };
    pb.finish_with_message(format!("{pulled} events pulled"));
    println!("Unlock with any provision of the original vault.");
    Ok(())
}

async fn cmd_unsync(vault: &Vault, yes: bool) -> Result<()> {
    if !yes {
        let answer = rpassword::prompt_password("Delete the remote log for this vault? Type 'yes': ")
            .context("reading confirmation")?;
        if answer.trim() != "yes" {
            println!("Aborted.");
            return Ok(());
        }
    }
    let requeued = vault.unsync().await?;
    println!("Remote log deleted. {requeued} records queued for the next sync.");
    Ok(())
}

fn cmd_remote_show(vault: &Vault) -> Result<()> {
    let identity = vault
        .remote_identity()?
        .context("vault has never synced: run `kv sync` first")?;
    let (key, salt) = identity.encode();
    println!("vault id: {}", identity.vault_id());
    println!("key:      {key}");
    println!("salt:     {salt}");
    println!();
    println!("On the other device: kv clone --key {key} --salt {salt}");
    Ok(())
}

async fn cmd_remote_check(config: &KvConfig) -> Result<()> {
    let credentials = s3_credentials_from_env(config)?;
    let op = build_from_config(&config.remote, credentials.as_ref())?;
    let pb = make_spinner("remote");
    pb.set_message(format!("{:?}", config.remote.backend));
    match check_health(&op, &config.remote.prefix).await {
        Ok(()) => {
            pb.finish_with_message("reachable");
            Ok(())
        }
        Err(e) => {
            pb.finish_and_clear();
            Err(e)
        }
    }
}

// ── `kv migrate` ──────────────────────────────────────────────────────────────

fn cmd_migrate(config: &KvConfig) -> Result<()> {
    if !config.vault.legacy_layout {
        tracing::info!("legacy_layout is off; migrating any flat keys found");
    }
    let store = kv_store::open_store(&config.vault).context("opening local store")?;
    let moved = migrate_legacy(store.as_ref())?;
    println!("Migrated {moved} records.");
    if config.vault.legacy_layout {
        println!("Set `legacy_layout = false` under [vault] in the config file.");
    }
    Ok(())
}

// ── `kv config show` ──────────────────────────────────────────────────────────

fn cmd_config_show(config: &KvConfig, path: &Path) -> Result<()> {
    println!("# config: {}", path.display());
    let rendered = toml::to_string_pretty(config).context("serializing config")?;
    print!("{rendered}");
    if config.vault.backend == StoreBackend::Memory {
        println!("# note: the memory store is lost when kv exits");
    }
    Ok(())
}
