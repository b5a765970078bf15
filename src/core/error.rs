// src/core/error.rs

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine to its callers.
///
/// Analyzer failures are deliberately absent: they are folded into
/// `AnalyzerResult` values and never abort an evaluation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The supplied domain was empty or not a valid host name.
    #[error("invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: &'static str },

    /// The ledger database rejected an operation.
    #[error("ledger error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A list or report file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configuration was unreadable or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    /// True for errors caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::InvalidDomain { .. } | EngineError::NotFound(_))
    }
}

/// Why a Tier-2 probe could not produce a result.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("status {0}")]
    Status(u16),

    #[error("not-found")]
    NotFound,

    #[error("malformed: {0}")]
    Malformed(String),

    #[error("timeout")]
    Timeout,

    #[error("missing api key")]
    MissingApiKey,
}
