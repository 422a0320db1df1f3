//! Failures reported back to the client that caused them.
//!
//! None of these close the connection or reach any other peer.

use fair_relay_auth::AuthError;

/// Coarse grouping used for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Protocol,
    Auth,
    Permission,
    Routing,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("message has no kind")]
    MissingKind,

    #[error("unrecognized message kind: {0}")]
    UnknownKind(String),

    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: String, reason: String },

    #[error("binary frames are not supported")]
    BinaryFrame,

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("already authenticated")]
    AlreadyAuthenticated,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("authentication timed out after {secs}s")]
    AuthTimeout { secs: u64 },
}

impl RelayError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::MissingKind => "missing_kind",
            Self::UnknownKind(_) => "unknown_kind",
            Self::Malformed { .. } => "malformed_message",
            Self::BinaryFrame => "binary_frame",
            Self::Auth(e) => e.error_code(),
            Self::AlreadyAuthenticated => "already_authenticated",
            Self::NotAuthenticated => "not_authenticated",
            Self::PeerNotFound(_) => "peer_not_found",
            Self::AuthTimeout { .. } => "auth_timeout",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidJson(_)
            | Self::MissingKind
            | Self::UnknownKind(_)
            | Self::Malformed { .. }
            | Self::BinaryFrame
            | Self::AlreadyAuthenticated => ErrorCategory::Protocol,
            Self::Auth(_) => ErrorCategory::Auth,
            Self::NotAuthenticated => ErrorCategory::Permission,
            Self::PeerNotFound(_) => ErrorCategory::Routing,
            Self::AuthTimeout { .. } => ErrorCategory::Timeout,
        }
    }
}
