//! Error types for Basekit Core
//!
//! Every payload is owned data so that `Error` is `Clone`: a single refresh
//! outcome is handed to every caller waiting on it.

use thiserror::Error;

/// Startup configuration failures. Fatal; never raised after bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required configuration value: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Authentication failures, recoverable by prompting the user to sign in again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Session expired, sign in again")]
    SessionExpired,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Network-level failures. Never retried by the data access layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote error {status_code}: {body}")]
    Remote { status_code: u16, body: String },

    #[error("No record found in {collection}")]
    NotFound { collection: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Credential storage error: {0}")]
    Persistence(String),
}

impl Error {
    /// Short stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Auth(AuthError::Unauthenticated) => "unauthenticated",
            Error::Auth(AuthError::SessionExpired) => "session_expired",
            Error::Auth(AuthError::InvalidCredentials(_)) => "invalid_credentials",
            Error::Transport(_) => "transport",
            Error::Remote { .. } => "remote",
            Error::NotFound { .. } => "not_found",
            Error::InvalidQuery(_) => "invalid_query",
            Error::InvalidResponse(_) => "invalid_response",
            Error::Serialization(_) => "serialization",
            Error::Persistence(_) => "persistence",
        }
    }

    /// The remote service refused the presented access token
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Error::Remote { status_code: 401, .. })
    }

    /// Whether a caller-side retry may help.
    ///
    /// Transport failures and 429/5xx responses qualify; everything else is
    /// deterministic and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Remote { status_code, .. } => {
                matches!(*status_code, 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }

    /// Status code of a remote rejection, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Remote { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
