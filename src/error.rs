//! Error types shared by the clients, the file cache and the request surface
//!
//! Configuration errors are fatal and abort startup. Every other error is
//! recoverable and is converted to an empty result plus an [`ErrorBody`] at
//! the request boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::ValidationFailure;

/// A required credential was absent when a client was constructed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The named environment variable was missing or blank
    #[error("Missing required credential: {0} is not set")]
    MissingCredential(&'static str),

    /// No home directory to derive a default from; the path must be given
    #[error("No default {0} directory; set it with --{0}-dir")]
    MissingDirectory(&'static str),
}

/// Errors returned by the upstream API clients
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-success HTTP status or a transport failure
    #[error("{service} is unavailable: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        /// HTTP status, or `None` when the request never got a response
        status: Option<u16>,
        reason: String,
    },

    /// The payload failed schema validation
    #[error("{service} payload failed validation: {failure}")]
    SchemaMismatch {
        service: &'static str,
        failure: ValidationFailure,
    },

    /// Caller-supplied parameters were rejected before any request was made
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Machine-readable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            ApiError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            ApiError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// HTTP status carried by an `UpstreamUnavailable` error
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::UpstreamUnavailable { status, .. } => *status,
            _ => None,
        }
    }
}

/// Filesystem failures in the artifact store
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading, writing or renaming the artifact failed
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The artifact could not be encoded or decoded
    #[error("Cache artifact is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Machine-readable error kind exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationError,
    UpstreamUnavailable,
    SchemaMismatch,
    CacheIoError,
    InvalidRequest,
}

impl ErrorKind {
    /// Human-readable message shown instead of raw upstream text
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::ConfigurationError => "This feed is not configured.",
            ErrorKind::UpstreamUnavailable => {
                "The service is temporarily unavailable. Showing what we have."
            }
            ErrorKind::SchemaMismatch => {
                "The service returned data we could not read. Showing what we have."
            }
            ErrorKind::CacheIoError => "Saved content could not be loaded.",
            ErrorKind::InvalidRequest => "The request was missing required details.",
        }
    }
}

/// Error part of a response: a kind plus a user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<ErrorKind> for ErrorBody {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SchemaMismatch).unwrap();
        assert_eq!(json, "\"schema_mismatch\"");
        let json = serde_json::to_string(&ErrorKind::CacheIoError).unwrap();
        assert_eq!(json, "\"cache_io_error\"");
    }

    #[test]
    fn test_api_error_kind_and_status() {
        let err = ApiError::UpstreamUnavailable {
            service: "last.fm",
            status: Some(503),
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(err.status(), Some(503));

        let err = ApiError::InvalidRequest("playlist id is empty".to_string());
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_error_body_uses_fixed_message() {
        let body = ErrorBody::from(ErrorKind::UpstreamUnavailable);
        assert_eq!(body.kind, ErrorKind::UpstreamUnavailable);
        assert!(!body.message.is_empty());
        assert!(!body.message.contains("HTTP"));
    }

    #[test]
    fn test_missing_credential_names_variable() {
        let err = ConfigError::MissingCredential("LASTFM_API_KEY");
        assert!(err.to_string().contains("LASTFM_API_KEY"));
    }
}
