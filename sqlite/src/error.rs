//! Error types for SQLite conduit operations.
//!
//! Covers direct database access and schema attachment. Failures inside a
//! reconciliation surface as [`rowsync_core::ReconcileError`] instead.

use thiserror::Error;

/// Errors that can occur outside a reconciliation session.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Schema name contains invalid characters.
    #[error("invalid schema name '{0}': must contain only alphanumeric characters and underscores")]
    InvalidSchemaName(String),

    /// Table name contains invalid characters.
    #[error("invalid table name '{0}': must contain only alphanumeric characters and underscores")]
    InvalidTableName(String),
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
