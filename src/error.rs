//! Error types for Beacon transients

use std::fmt;

use thiserror::Error;

/// Result type alias for Beacon transient operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which half of a call exceeded its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Transport never became writable; nothing was sent
    Send,
    /// Request was sent but no response arrived; outcome unknown
    Recv,
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => f.write_str("send"),
            Self::Recv => f.write_str("recv"),
        }
    }
}

/// Errors that can occur in Beacon transients
#[derive(Debug, Error)]
pub enum Error {
    /// Discovery or resolution found nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Bounded wait exceeded
    #[error("{phase} timeout")]
    Timeout { phase: CallPhase },

    /// Call attempted with zero eligible providers
    #[error("no provider for {0}")]
    NoProvider(String),

    /// Resource object creation failed
    #[error("failed to construct {name}: {reason}")]
    Construction { name: String, reason: String },

    /// External cancellation observed
    #[error("cancelled")]
    Cancelled,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid name pattern
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Peer sent something we did not expect
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Provider received the request but its handler failed
    #[error("remote error: {0}")]
    Remote(String),

    /// mDNS daemon error
    #[error("discovery error: {0}")]
    Discovery(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether a caller may reasonably try the same operation again later
    ///
    /// Retrying a call after `Timeout { phase: Recv }` is only safe for
    /// idempotent requests, and should use a fresh discovery result
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Timeout { .. }
                | Self::NoProvider(_)
                | Self::Construction { .. }
        )
    }

    /// Whether the failed call is known to have had no effect on the provider
    #[must_use]
    pub const fn nothing_sent(&self) -> bool {
        matches!(
            self,
            Self::NoProvider(_)
                | Self::Timeout {
                    phase: CallPhase::Send
                }
        )
    }
}
