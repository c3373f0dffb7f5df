//! Error types for MySQL conduit operations.
//!
//! Failures inside a reconciliation surface as
//! [`rowsync_core::ReconcileError`] instead.

use thiserror::Error;

/// Errors that can occur while connecting or querying outside a session.
#[derive(Debug, Error)]
pub enum MysqlError {
    /// The connection URL could not be parsed.
    #[error("invalid connection url: {0}")]
    Url(#[from] mysql::UrlError),

    /// Driver or server failure.
    #[error("mysql error: {0}")]
    Driver(#[from] mysql::Error),
}

/// Convenience alias for results with [`MysqlError`].
pub type Result<T> = std::result::Result<T, MysqlError>;
