//! Error types for CIFTI header and matrix operations.
//!
//! `CiftiError` covers header decoding, matrix setup, and file I/O against the
//! backing store. File-level failures carry the path so a caller can surface a
//! single descriptive message.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CiftiError {
    /// An accessor was called before `setup`, or after the file name changed
    #[error(
        "Matrix needs to be initialized before using, or after the file name has been changed."
    )]
    NotInitialized,

    /// Setup was given something other than two dimensions
    #[error("Cifti only supports 2 dimensional matrices currently (got {count})")]
    UnsupportedDimensionality { count: usize },

    /// More dimensions than the header can describe
    #[error("Number of dimensions {count} exceeds the maximum of 3 supported by the header")]
    TooManyDimensions { count: usize },

    #[error("No dimensions specified")]
    NoDimensions,

    /// Header bytes could not be decoded
    #[error("Malformed header: {message}")]
    MalformedHeader { message: String },

    #[error("Unrecognized Nifti Version: {version}")]
    UnsupportedVersion { version: i64 },

    /// A read returned fewer bytes than required
    #[error("{}: {message}", path.display())]
    TruncatedFile { path: PathBuf, message: String },

    /// A write stored fewer bytes than required
    #[error("{}: {message}", path.display())]
    TruncatedWrite { path: PathBuf, message: String },

    #[error("{axis} index {index} is out of range for length {len}")]
    IndexOutOfRange {
        axis: &'static str,
        index: usize,
        len: usize,
    },

    /// Caller-provided buffer does not match the matrix shape
    #[error("Buffer length mismatch: expected {expected}, got {actual}")]
    BufferLength { expected: usize, actual: usize },

    /// The on-disk cache could not be opened or used
    #[error("Cache file error for {}: {message}", path.display())]
    CacheFile { path: PathBuf, message: String },

    #[error("Matrix lock poisoned by a panicking thread")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl CiftiError {
    pub fn malformed_header(message: impl Into<String>) -> Self {
        Self::MalformedHeader {
            message: message.into(),
        }
    }

    pub fn truncated_file(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::TruncatedFile {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn truncated_write(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::TruncatedWrite {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn cache_file(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::CacheFile {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn index_out_of_range(axis: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { axis, index, len }
    }

    pub fn buffer_length(expected: usize, actual: usize) -> Self {
        Self::BufferLength { expected, actual }
    }

    /// Prefix the error message with `context`, typically a file name
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            Self::MalformedHeader { message } => Self::MalformedHeader {
                message: format!("{}: {}", context, message),
            },
            Self::TruncatedFile { path, message } => Self::TruncatedFile {
                path,
                message: format!("{}: {}", context, message),
            },
            Self::TruncatedWrite { path, message } => Self::TruncatedWrite {
                path,
                message: format!("{}: {}", context, message),
            },
            Self::CacheFile { path, message } => Self::CacheFile {
                path,
                message: format!("{}: {}", context, message),
            },
            Self::Io(e) => Self::Other {
                message: format!("{}: {}", context, e),
                source: Some(Box::new(e)),
            },
            Self::Other { message, source } => Self::Other {
                message: format!("{}: {}", context, message),
                source,
            },
            other => other,
        }
    }
}

impl From<anyhow::Error> for CiftiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            message: err.to_string(),
            source: None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for CiftiError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}

pub type Result<T> = std::result::Result<T, CiftiError>;
