//! Domain error types for the realm gateway
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All application code returns Result<T, ServerError>.

use thiserror::Error;

/// Reason a pending connection was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Shards are still booting
    Disallowed,
    /// Every shard is at capacity
    Full,
}

impl RejectReason {
    /// Literal token sent to the peer before the connection is closed.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Disallowed => "disallowed",
            Self::Full => "full",
        }
    }
}

/// Stage of the identity-linking pipeline that talked to an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalStage {
    TokenExchange,
    ProfileFetch,
    LedgerBalance,
}

impl std::fmt::Display for ExternalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TokenExchange => "token exchange",
            Self::ProfileFetch => "profile fetch",
            Self::LedgerBalance => "ledger balance",
        })
    }
}

/// Errors returned by a persistence backend.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// INSERT hit an existing key
    #[error("duplicate key '{key}' in table '{table}'")]
    Duplicate { table: String, key: String },

    /// Table does not exist in the backend
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    /// Database, table or clause rejected before reaching the backend
    #[error("invalid schema name or clause '{0}'")]
    InvalidName(String),

    /// Backend-specific failure
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Gateway domain errors
///
/// Every variant carries structured context fields for diagnostics.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Connection refused before reaching a shard
    #[error("connection rejected: {}", .0.token())]
    AdmissionRejected(RejectReason),

    /// Token exchange, profile fetch, or ledger call failed
    #[error("{stage} failed")]
    ExternalService {
        stage: ExternalStage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Persistence select/upsert/alter failed
    #[error("persistence error")]
    Persistence(#[from] PersistenceError),

    /// Malformed operator command
    #[error("invalid command: {0}")]
    CommandValidation(String),

    /// Configuration error (environment variable missing or invalid,
    /// or a feature requested without its backend)
    #[error("configuration error: {0}")]
    Config(String),

    /// Shard count does not fit the 1-based u32 index space
    #[error("shard index overflow: {value} exceeds u32::MAX")]
    ShardIndexOverflow { value: usize },
}

impl ServerError {
    /// Convenience constructor for external-service failures.
    pub fn external(
        stage: ExternalStage,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ExternalService {
            stage,
            source: source.into(),
        }
    }

    /// Returns a static label string suitable for Prometheus metrics.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::AdmissionRejected(_) => "admission_rejected",
            Self::ExternalService { .. } => "external_service",
            Self::Persistence(_) => "persistence",
            Self::CommandValidation(_) => "command_validation",
            Self::Config(_) => "config",
            Self::ShardIndexOverflow { .. } => "shard_overflow",
        }
    }
}
