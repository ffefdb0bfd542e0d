use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::error::{ErrorKind, MetadataError};

/// An error rendered as a JSON body with the matching status code.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::InvalidInput, msg)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::UpstreamUnavailable
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "kind": self.kind,
            "status": self.status.as_u16(),
            "retryable": self.is_retryable(),
        }));

        (self.status, body).into_response()
    }
}

impl From<MetadataError> for AppError {
    fn from(err: MetadataError) -> Self {
        let status = match err.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::SessionExpired => StatusCode::GONE,
            ErrorKind::SessionNotFound => StatusCode::NOT_FOUND,
        };
        AppError::new(status, err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn kinds_map_to_status_codes() {
        let cases = [
            (MetadataError::invalid("x"), StatusCode::BAD_REQUEST),
            (MetadataError::upstream("x"), StatusCode::SERVICE_UNAVAILABLE),
            (MetadataError::SessionExpired(Uuid::nil()), StatusCode::GONE),
            (MetadataError::SessionNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn only_upstream_is_retryable() {
        assert!(AppError::from(MetadataError::upstream("x")).is_retryable());
        assert!(!AppError::bad_request("x").is_retryable());
    }
}
