//! Error types for manifest and state file operations.
//!
//! Covers I/O, serialization, manifest validation and checksum verification.

use thiserror::Error;

/// Errors that can occur while reading or writing manifests and state.
#[derive(Debug, Error)]
pub enum StateError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Manifest structure is not usable (e.g., unknown version).
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// State file structure is not usable (e.g., unknown version).
    #[error("invalid state file: {0}")]
    InvalidState(String),

    /// A state entry no longer matches its recorded checksum.
    #[error("invalid checksum for resource '{0}': state file was modified outside rowsync")]
    InvalidChecksum(String),

    /// File extension is not one of `.yaml`, `.yml` or `.json`.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Convenience alias for results with [`StateError`].
pub type Result<T> = std::result::Result<T, StateError>;
