use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault is locked")]
    Locked,

    #[error("vault setup needed")]
    SetupNeeded,

    #[error("invalid auth")]
    InvalidAuth,

    #[error("vault is already setup")]
    AlreadySetup,

    #[error("refusing to remove the last provision (use force)")]
    LastAuth,

    #[error("provision not found: {0}")]
    ProvisionNotFound(String),

    #[error("item too large: {0}")]
    ItemTooLarge(String),

    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("vault is not empty")]
    NotEmpty,

    #[error("no remote set")]
    NoRemote,

    #[error("no remote key")]
    NoRemoteKey,

    #[error("nonce collision: {0}")]
    ReplayDetected(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("corrupt record at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("storage error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("{op}: {source}")]
    Op {
        op: &'static str,
        #[source]
        source: Box<VaultError>,
    },
}

impl VaultError {
    /// Wrap with the name of the operation that failed.
    pub fn context(self, op: &'static str) -> Self {
        VaultError::Op {
            op,
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping any `Op` wrappers.
    pub fn root(&self) -> &VaultError {
        match self {
            VaultError::Op { source, .. } => source.root(),
            other => other,
        }
    }

    /// Outermost operation name, if wrapped.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            VaultError::Op { op, .. } => Some(op),
            _ => None,
        }
    }

    pub fn corrupt(path: &str, reason: impl std::fmt::Display) -> Self {
        VaultError::Corrupt {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub trait OpContext<T> {
    fn op(self, op: &'static str) -> VaultResult<T>;
}

impl<T> OpContext<T> for VaultResult<T> {
    fn op(self, op: &'static str) -> VaultResult<T> {
        self.map_err(|e| e.context(op))
    }
}

/// Errors from a remote event log.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote vault was deleted")]
    Deleted,

    #[error("remote vault not found")]
    NotFound,

    #[error("remote rejected request: {0}")]
    Rejected(String),

    #[error("remote storage error: {0}")]
    Storage(String),

    #[error("remote codec error: {0}")]
    Codec(String),
}
