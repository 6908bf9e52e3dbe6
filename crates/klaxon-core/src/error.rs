//! Error types for KLAXON operations.
//!
//! This module defines [`KlaxonError`], the error enum shared by all KLAXON
//! crates. Transport failures are deliberately coarse: the center reacts to
//! *any* poll failure the same way (stop polling, tear down shared state),
//! so the variants carry context for logs rather than for recovery logic.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`KlaxonError`].
pub type Result<T> = std::result::Result<T, KlaxonError>;

/// Error type for all KLAXON operations.
#[derive(Debug, Error)]
pub enum KlaxonError {
    // =========================================================================
    // Transport Errors (server poll endpoint)
    // =========================================================================
    /// The poll request could not be sent or the connection failed
    #[error("Poll transport failure: {message}")]
    Transport { message: String },

    /// The poll endpoint answered with a non-success HTTP status
    #[error("Poll endpoint returned HTTP {status}")]
    TransportStatus { status: u16 },

    /// The poll endpoint answered with an application-level error payload
    #[error("Poll endpoint error: {message}")]
    ServerError { message: String },

    // =========================================================================
    // Serialization Errors
    // =========================================================================
    /// JSON encoding or decoding failed
    #[error("JSON error in {context}: {message}")]
    Json {
        context: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Directory creation failed (log directory bootstrap)
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in KLAXON)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KlaxonError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a server-side error from an `{error}` reply payload.
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::ServerError {
            message: message.into(),
        }
    }

    /// Create a JSON error.
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error came from the poll transport or endpoint.
    ///
    /// A transport failure during the main loop stops polling and erases
    /// shared state; a transport failure during a user action is only logged.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::TransportStatus { .. } | Self::ServerError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(KlaxonError::transport("connection refused").is_transport());
        assert!(KlaxonError::TransportStatus { status: 503 }.is_transport());
        assert!(KlaxonError::server_error("session expired").is_transport());
        assert!(!KlaxonError::internal("bug").is_transport());
    }

    #[test]
    fn test_error_display() {
        let err = KlaxonError::TransportStatus { status: 502 };
        assert!(err.to_string().contains("502"));

        let err = KlaxonError::server_error("no permissions");
        assert!(err.to_string().contains("no permissions"));
    }

    #[test]
    fn test_json_error_keeps_source() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = KlaxonError::json("notifications.list", source);
        assert!(err.to_string().contains("notifications.list"));
    }
}
