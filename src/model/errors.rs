//! Error types for the feed synchronizer.

use thiserror::Error;

/// Feed synchronizer error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network-level failure (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("server responded with {status} {reason}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status.
        reason: String,
    },

    /// The response body did not match the expected schema.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The operation was superseded or aborted.
    #[error("operation cancelled")]
    Cancelled,

    /// Account or conversation identifier is missing or empty.
    #[error("invalid conversation target: {0}")]
    InvalidTarget(String),

    /// No conversation has been opened yet.
    #[error("no conversation selected")]
    NoConversation,

    /// Submitted message text is empty.
    #[error("message text is empty")]
    EmptyMessage,

    /// URL parsing error.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether this is a transport failure (network or non-2xx status).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Transport { .. })
    }

    /// Whether this error only signals a superseded operation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if a poll tick hitting this error should be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Transport { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

/// Convenience result alias for feed operations.
pub type FeedResult<T> = Result<T, SyncError>;
