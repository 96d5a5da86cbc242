//! Error types.
//!
//! API and configuration failures are typed so analyzers and the CLI can
//! decide policy on them; the binary edge wraps everything in `anyhow`.

use thiserror::Error;

/// Failure reported by the GitHub API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure (DNS, TLS, connection reset, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-success status that is not an
    /// empty-resource condition.
    #[error("GitHub API returned {status} for {endpoint}: {message}")]
    Status {
        status: u16,
        endpoint: String,
        message: String,
    },

    /// The payload did not have the expected shape.
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode { .. } => None,
        }
    }

    /// True for 401/403 responses (missing scope, private data, disabled feature).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

/// Invalid run configuration. Raised before any task is launched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid duration '{0}' (expected e.g. 30d, 720h, 2w)")]
    InvalidDuration(String),

    #[error("unknown depth profile '{0}' (expected shallow, standard or deep)")]
    UnknownDepthProfile(String),

    #[error("invalid repository '{0}' (expected owner/name or a GitHub URL)")]
    InvalidRepository(String),
}

/// Run-level failure of the orchestrator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("analysis cancelled by user")]
    Cancelled,
}
