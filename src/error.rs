//! Error types shared by the scanning and processing engine.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by the GitHub collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForgeError {
    /// The API answered with a status >= 400.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response (connection, TLS, decode).
    #[error("transport error: {0}")]
    Transport(String),
}

impl ForgeError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ForgeError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ForgeError::Http { status, .. } => Some(*status),
            ForgeError::Transport(_) => None,
        }
    }

    /// Whether another attempt could plausibly succeed: rate limiting (403,
    /// 429), server errors, and transport failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            ForgeError::Http { status, .. } => matches!(status, 403 | 429) || *status >= 500,
            ForgeError::Transport(_) => true,
        }
    }
}

/// Errors surfaced by the engine itself.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(
        "at least one filter is required for this command: use --title, --branch, --body, --label or --author"
    )]
    MissingFilter,

    #[error("no repositories matched the configured sources")]
    NoRepositories,

    #[error("cannot create cache directory {}: {source}", path.display())]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error("{0}")]
    Fatal(String),
}

pub type Result<T, E = FleetError> = std::result::Result<T, E>;
