//! Error types for pulse-ann.
//!
//! Every public operation returns [`Result`], whose error side is
//! [`AnnError`]. Each error maps onto exactly one [`ErrorCode`] of the closed
//! status taxonomy, so callers that only care about the status can match on
//! [`AnnError::code()`] or [`ErrorCode::of()`] instead of the full error.
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use pulseann::{ErrorCode, VectorIndex};
//!
//! match index.save_index("./my-index") {
//!     Ok(()) => {}
//!     Err(e) if e.code() == ErrorCode::EmptyIndex => { /* nothing to persist */ }
//!     Err(e) => return Err(e),
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for pulse-ann operations.
pub type Result<T> = std::result::Result<T, AnnError>;

/// Closed status taxonomy reported by every mutating or persistence
/// operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The operation completed and all invariants hold.
    Success,
    /// Generic precondition violation.
    Fail,
    /// Save attempted on an index with zero live vectors.
    EmptyIndex,
    /// Metadata-keyed or id-keyed lookup failed.
    VectorNotFound,
    /// A file could not be opened for reading.
    FailedOpenFile,
    /// A file or folder could not be created for writing.
    FailedCreateFile,
    /// Config parsing failed or a type tag was not recognized.
    FailedParseValue,
}

impl ErrorCode {
    /// Collapses a result into its status code.
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.code(),
        }
    }

    /// Returns true for [`ErrorCode::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "Success",
            Self::Fail => "Fail",
            Self::EmptyIndex => "EmptyIndex",
            Self::VectorNotFound => "VectorNotFound",
            Self::FailedOpenFile => "FailedOpenFile",
            Self::FailedCreateFile => "FailedCreateFile",
            Self::FailedParseValue => "FailedParseValue",
        };
        f.write_str(name)
    }
}

/// Top-level error enum for all pulse-ann operations.
///
/// This is the only error type returned by public APIs.
#[derive(Debug, Error)]
pub enum AnnError {
    /// Generic precondition violation (type mismatch, bad metadata, ...).
    #[error("Operation failed: {0}")]
    Fail(String),

    /// The index has no live vectors to persist.
    #[error("Index has no live vectors")]
    EmptyIndex,

    /// The requested vector is absent, out of range or already deleted.
    #[error("Vector not found: {0}")]
    VectorNotFound(String),

    /// A file could not be opened for reading.
    #[error("Failed to open file {path}: {source}")]
    FailedOpenFile {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A file or folder could not be created.
    #[error("Failed to create file {path}: {source}")]
    FailedCreateFile {
        /// Path that could not be created.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Config parsing failed or a value was not recognized.
    #[error("Failed to parse value: {0}")]
    FailedParseValue(String),

    /// General I/O error while reading or writing a segment.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnnError {
    /// Creates a generic failure with the given message.
    pub fn fail(msg: impl Into<String>) -> Self {
        Self::Fail(msg.into())
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::VectorNotFound(msg.into())
    }

    /// Creates a parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::FailedParseValue(msg.into())
    }

    /// Creates an open-file error for `path`.
    pub fn open_file(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::FailedOpenFile {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a create-file error for `path`.
    pub fn create_file(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::FailedCreateFile {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Maps this error onto the status taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Fail(_) | Self::Io(_) => ErrorCode::Fail,
            Self::EmptyIndex => ErrorCode::EmptyIndex,
            Self::VectorNotFound(_) => ErrorCode::VectorNotFound,
            Self::FailedOpenFile { .. } => ErrorCode::FailedOpenFile,
            Self::FailedCreateFile { .. } => ErrorCode::FailedCreateFile,
            Self::FailedParseValue(_) => ErrorCode::FailedParseValue,
        }
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::VectorNotFound(_))
    }

    /// Returns true if this is an empty-index error.
    pub fn is_empty_index(&self) -> bool {
        matches!(self, Self::EmptyIndex)
    }

    /// Returns true if this is a parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::FailedParseValue(_))
    }
}

// Tree segments are bincode-encoded; a decode failure means the segment is
// malformed rather than unreadable.
impl From<bincode::Error> for AnnError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) => AnnError::Io(io),
            other => AnnError::FailedParseValue(format!("Malformed segment: {}", other)),
        }
    }
}
