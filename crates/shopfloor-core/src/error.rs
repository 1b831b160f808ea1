//! Error types for Shopfloor operations.
//!
//! This module provides a common `Error` type and `Result<T>` alias used across
//! all Shopfloor crates, plus the [`ErrorKind`] taxonomy that tool envelopes
//! expose to callers. Uses `thiserror` for derive macros.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur in Shopfloor operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific path.
    #[error("I/O error at {path}: {source}")]
    IoWithPath {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lookup target does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied bad or missing parameters.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A source document is missing or unreadable.
    #[error("Data unavailable at {path}: {reason}")]
    DataUnavailable {
        /// Document path.
        path: PathBuf,
        /// Why the read failed.
        reason: String,
    },

    /// A source document is present but cannot be parsed.
    #[error("Data corrupt at {path}: {reason}")]
    DataCorrupt {
        /// Document path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Handler-internal fault not otherwise classified.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// Invocation of an unregistered tool name.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A bounded wait elapsed.
    #[error("{what} timed out after {after_ms}ms")]
    Timeout {
        /// What was being waited on.
        what: String,
        /// The bound that elapsed.
        after_ms: u64,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error for an entity of the given type.
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{entity} '{id}'"))
    }

    /// Create a not found error from a free-form message.
    pub fn not_found_msg(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Wrap an I/O error with the path that produced it.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a data-unavailable error.
    pub fn data_unavailable(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a data-corrupt error.
    pub fn data_corrupt(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::DataCorrupt {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create an unknown-tool error.
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool(name.into())
    }

    /// Create a timeout error.
    pub fn timeout(what: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The caller-facing classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DataUnavailable { .. } => ErrorKind::DataUnavailable,
            Self::DataCorrupt { .. } => ErrorKind::DataCorrupt,
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Io(_)
            | Self::IoWithPath { .. }
            | Self::Config(_)
            | Self::Serialization(_)
            | Self::Operation(_) => ErrorKind::OperationError,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Shopfloor's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Caller-facing error classification carried in failure envelopes.
///
/// Serialized with the exact variant names (`"ValidationError"`, ...), which
/// is the wire contract callers match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad or missing parameters, or an unknown entity reference.
    ValidationError,
    /// Lookup of an id that does not exist.
    NotFound,
    /// Source file missing or unreadable.
    DataUnavailable,
    /// Source file present but unparseable.
    DataCorrupt,
    /// Handler-internal fault.
    OperationError,
    /// Unregistered tool name.
    UnknownTool,
    /// A bounded wait elapsed.
    Timeout,
    /// Transport-level frame could not be decoded.
    MalformedRequest,
}

impl ErrorKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::NotFound => "NotFound",
            Self::DataUnavailable => "DataUnavailable",
            Self::DataCorrupt => "DataCorrupt",
            Self::OperationError => "OperationError",
            Self::UnknownTool => "UnknownTool",
            Self::Timeout => "Timeout",
            Self::MalformedRequest => "MalformedRequest",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::ValidationError);
        assert_eq!(Error::not_found("machine", "M1").kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::data_unavailable("/a.json", "missing").kind(),
            ErrorKind::DataUnavailable
        );
        assert_eq!(
            Error::data_corrupt("/a.json", "eof").kind(),
            ErrorKind::DataCorrupt
        );
        assert_eq!(Error::unknown_tool("nope").kind(), ErrorKind::UnknownTool);
        assert_eq!(
            Error::timeout("health poll", Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(Error::operation("boom").kind(), ErrorKind::OperationError);
        assert_eq!(Error::config("bad").kind(), ErrorKind::OperationError);
    }

    #[test]
    fn test_display_messages() {
        let err = Error::not_found("machine", "ZZ999");
        assert_eq!(err.to_string(), "Not found: machine 'ZZ999'");

        let err = Error::timeout("startup of maintenance", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "startup of maintenance timed out after 1500ms");

        let err = Error::data_corrupt("/data/cmms.json", "expected value");
        assert!(err.to_string().contains("/data/cmms.json"));
    }

    #[test]
    fn test_io_with_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::io_with_path(io, "/tmp/x.json");
        assert!(err.to_string().contains("/tmp/x.json"));
        assert_eq!(err.kind(), ErrorKind::OperationError);
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_kind_wire_names() {
        let json = serde_json::to_string(&ErrorKind::ValidationError).unwrap();
        assert_eq!(json, "\"ValidationError\"");
        let back: ErrorKind = serde_json::from_str("\"UnknownTool\"").unwrap();
        assert_eq!(back, ErrorKind::UnknownTool);
        assert_eq!(ErrorKind::MalformedRequest.to_string(), "MalformedRequest");
    }
}
