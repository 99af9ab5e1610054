//! Shared error taxonomy for the whole crate.
//!
//! Unlike the rest of the teacher's per-adapter `*Error` enums, spec.md §7
//! defines one cross-cutting vocabulary shared by every component, so this
//! crate keeps a single `LiteCoreError` rather than one enum per module.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LiteCoreError>;

#[derive(Debug, Error)]
pub enum LiteCoreError {
    #[error("not found")]
    NotFound,

    #[error("collection not open")]
    NotOpen,

    #[error("conflict")]
    Conflict,

    #[error("corrupt database: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("invalid docID: {0}")]
    BadDocId(String),

    #[error("invalid revision ID: {0}")]
    BadRevisionId(String),

    #[error("corrupt revision data: {0}")]
    CorruptRevisionData(String),

    #[error("database too old to upgrade automatically (user_version={0})")]
    CantUpgradeDatabase(i64),

    #[error("database too old (user_version={0})")]
    DatabaseTooOld(i64),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    // --- network subgroup ---
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("DNS failure: {0}")]
    DnsFailure(String),

    #[error("TLS certificate untrusted")]
    TlsCertUntrusted,

    #[error("TLS client certificate rejected")]
    TlsClientCertRejected,

    // --- websocket subgroup ---
    #[error("WebSocket closed with status {code}: {message}")]
    WebSocketStatus { code: u16, message: String },

    // --- fleece/decoding subgroup ---
    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LiteCoreError {
    /// Whether this error should put a continuous Replicator into `Offline`
    /// (transient / network-dependent) as opposed to `Stopped` (fatal).
    ///
    /// Mirrors the fatal set named in spec.md §4.5: authentication failure,
    /// protocol mismatch, database corruption, and explicit `stop()`.
    pub fn is_transient(&self) -> bool {
        match self {
            LiteCoreError::WebSocketStatus { code, .. } => {
                !matches!(code, 401 | 403 | 404) && !(400..500).contains(code)
            }
            LiteCoreError::UnknownHost(_)
            | LiteCoreError::DnsFailure(_)
            | LiteCoreError::IoError(_) => true,
            LiteCoreError::Corrupt(_)
            | LiteCoreError::TlsCertUntrusted
            | LiteCoreError::TlsClientCertRejected
            | LiteCoreError::CantUpgradeDatabase(_)
            | LiteCoreError::DatabaseTooOld(_) => false,
            _ => false,
        }
    }

    pub fn rusqlite(err: rusqlite::Error) -> Self {
        LiteCoreError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for LiteCoreError {
    fn from(err: rusqlite::Error) -> Self {
        LiteCoreError::rusqlite(err)
    }
}
