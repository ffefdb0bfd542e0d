use serde::Serialize;
use uuid::Uuid;

/// Errors surfaced to callers of the metadata service.
///
/// Provider and writer internals report failures with `anyhow`; they are
/// folded into one of these kinds at the service boundary so callers can
/// decide whether to retry, restart the upload, or fix their input.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// Unsupported image format, empty analysis, or an operation that the
    /// session's current state does not allow.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The description chain or the metadata writer failed or timed out.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("session {0} has expired, please upload the image again")]
    SessionExpired(Uuid),

    #[error("session {0} not found")]
    SessionNotFound(Uuid),
}

/// Discriminant of [`MetadataError`], recorded in failed sessions and
/// reported over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UpstreamUnavailable,
    SessionExpired,
    SessionNotFound,
}

impl MetadataError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::SessionExpired(_) => ErrorKind::SessionExpired,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
        }
    }

    /// Whether re-submitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid_input",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::SessionExpired => "session_expired",
            Self::SessionNotFound => "session_not_found",
        };
        f.write_str(s)
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
