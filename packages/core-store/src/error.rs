//! Error types for location and backend operations.

use std::io;

use thiserror::Error;

/// Errors that can occur while building or operating on a location.
///
/// Adapters classify native failures into these kinds. The bridges pass
/// them through untouched, only moving them onto the caller's thread or
/// task.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad construction input, bad arguments, escape attempts, or a
    /// comparison across backends.
    #[error("invalid location: {message}")]
    Validation { message: String },

    /// The target does not exist.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// The target already exists.
    #[error("already exists: {key}")]
    AlreadyExists { key: String },

    /// The operation would break a structural invariant, such as removing
    /// a non-empty directory.
    #[error("integrity violation at {key}: {message}")]
    Integrity { key: String, message: String },

    /// A mutation was attempted on a read-only backend.
    #[error("backend is read-only: cannot {operation} {key}")]
    ReadOnly {
        key: String,
        operation: &'static str,
    },

    /// The backend (or an external tool it depends on) is missing or
    /// unreachable.
    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// An I/O error that does not map onto a more specific kind.
    #[error("io error at {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The bridge plumbing itself failed (scheduler gone, worker cancelled).
    #[error("bridge failure: {0}")]
    Bridge(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound { key: key.into() }
    }

    /// Create a read-only error for the given operation.
    pub fn read_only(key: impl Into<String>, operation: &'static str) -> Self {
        Error::ReadOnly {
            key: key.into(),
            operation,
        }
    }

    /// Create a backend-unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Classify an I/O error raised while acting on `key`.
    pub fn from_io(key: impl Into<String>, err: io::Error) -> Self {
        let key = key.into();
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound { key },
            io::ErrorKind::AlreadyExists => Error::AlreadyExists { key },
            io::ErrorKind::DirectoryNotEmpty => Error::Integrity {
                key,
                message: "directory not empty".to_string(),
            },
            _ => Error::Io { key, source: err },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}

/// Result type alias for location operations.
pub type Result<T> = std::result::Result<T, Error>;
