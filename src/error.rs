//! Error types for filekit
//!
//! This module defines all error types used throughout the library,
//! providing detailed error information for debugging and user feedback.

use crate::config::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for filekit operations
#[derive(Error, Debug)]
pub enum FilekitError {
    /// Path string matches no known dialect grammar
    #[error("Malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// Path escapes the base root it was resolved against
    #[error("Path '{path}' escapes base directory '{base}'")]
    PathTraversal { path: String, base: PathBuf },

    /// Path contains characters or names the platform rejects
    #[error("Invalid characters in path '{path}': {}", invalid.join(", "))]
    InvalidPathChars { path: String, invalid: Vec<String> },

    /// Path or one of its components exceeds the platform limit
    #[error("Path too long ({length} > {limit}): {path}")]
    PathTooLong {
        path: String,
        length: usize,
        limit: usize,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Expected a regular file
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// Source and destination are the same
    #[error("Source and destination are the same: {0}")]
    SameSourceAndDestination(PathBuf),

    /// Destination exists and the conflict policy forbids replacing it
    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// Another operation holds the claim on this destination
    #[error("Destination is being written by another operation: {0}")]
    DestinationBusy(PathBuf),

    /// No free candidate found within the uniqueness cap
    #[error("No unique path available for '{path}' after {attempts} attempts")]
    UniquePathExhausted { path: PathBuf, attempts: usize },

    /// Disk full
    #[error("Insufficient disk space at '{path}': need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    /// Hash verification failed
    #[error("Integrity check failed for '{path}' ({algorithm}): expected {expected}, got {actual}")]
    VerificationMismatch {
        path: PathBuf,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },

    /// Platform lacks a capability the operation depends on
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest construction or parsing error
    #[error("Manifest error: {0}")]
    ManifestError(String),

    /// Operation cancelled by user
    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse error category recorded per path in a transfer result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedPath,
    PathTraversal,
    InvalidPathChars,
    NotFound,
    PermissionDenied,
    InvalidTarget,
    DestinationConflict,
    UniquePathExhausted,
    InsufficientSpace,
    VerificationMismatch,
    UnsupportedCapability,
    Io,
    Config,
    Cancelled,
}

impl FilekitError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an I/O error, promoting not-found and permission errors
    /// to their dedicated variants
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::Io { path, source },
        }
    }

    /// Create a malformed path error
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a verification mismatch error
    pub fn verification_mismatch(
        path: impl Into<PathBuf>,
        algorithm: HashAlgorithm,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::VerificationMismatch {
            path: path.into(),
            algorithm,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedPath { .. } => ErrorKind::MalformedPath,
            Self::PathTraversal { .. } => ErrorKind::PathTraversal,
            Self::InvalidPathChars { .. } | Self::PathTooLong { .. } => ErrorKind::InvalidPathChars,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotAFile(_) | Self::SameSourceAndDestination(_) => ErrorKind::InvalidTarget,
            Self::DestinationExists(_) | Self::DestinationBusy(_) => ErrorKind::DestinationConflict,
            Self::UniquePathExhausted { .. } => ErrorKind::UniquePathExhausted,
            Self::InsufficientSpace { .. } => ErrorKind::InsufficientSpace,
            Self::VerificationMismatch { .. } => ErrorKind::VerificationMismatch,
            Self::UnsupportedCapability(_) => ErrorKind::UnsupportedCapability,
            Self::Io { .. } => ErrorKind::Io,
            Self::Config(_) | Self::ManifestError(_) => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::DestinationBusy(_))
    }

    /// Check if this error is a permission issue
    pub fn is_permission_error(&self) -> bool {
        match self {
            Self::PermissionDenied(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// Bytes missing for an insufficient-space error
    pub fn shortfall(&self) -> Option<u64> {
        match self {
            Self::InsufficientSpace {
                required,
                available,
                ..
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::NotFound(path)
            | Self::PermissionDenied(path)
            | Self::NotAFile(path)
            | Self::SameSourceAndDestination(path)
            | Self::DestinationExists(path)
            | Self::DestinationBusy(path)
            | Self::UniquePathExhausted { path, .. }
            | Self::InsufficientSpace { path, .. }
            | Self::VerificationMismatch { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for filekit operations
pub type Result<T> = std::result::Result<T, FilekitError>;

impl From<serde_json::Error> for FilekitError {
    fn from(err: serde_json::Error) -> Self {
        FilekitError::ManifestError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| FilekitError::from_io(path, e))
    }
}
