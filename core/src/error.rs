//! Error types for reconciliation.
//!
//! [`ConduitError`] is what a conduit reports for any backend failure.
//! [`ReconcileError`] is what a reconciliation call surfaces to its caller,
//! tagged with the stage that failed.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::statement::StatementKind;
use crate::validate::BuildError;

/// A failure reported by an execution conduit.
///
/// Carries a human-readable message and, when available, the backend error
/// it was raised from.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConduitError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ConduitError {
    /// Creates an error from a message alone.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error that wraps a backend error, using its text as the
    /// message.
    pub fn from_source<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an error with a custom message wrapping a backend error.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Lifecycle event a reconciliation was serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// First apply of a resource.
    Create,
    /// Re-apply against previously recorded state.
    Update,
    /// Teardown of previously recorded state.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(verb)
    }
}

/// Errors surfaced by a reconciliation call.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The model could not be rendered; nothing was sent to the store.
    #[error("invalid resource: {0}")]
    Build(#[from] BuildError),

    /// The unit of work could not be opened; nothing was applied.
    #[error("unable to {operation} {subject}: cannot open unit of work: {source}")]
    Connection {
        /// Lifecycle event being served.
        operation: Operation,
        /// What was being reconciled (e.g. `row set`).
        subject: &'static str,
        /// Backend failure.
        source: ConduitError,
    },

    /// The store rejected a statement; the unit of work was rolled back.
    #[error("unable to {operation} {subject}: {kind} statement failed: {source}{}", rollback_note(.rollback))]
    Statement {
        /// Lifecycle event being served.
        operation: Operation,
        /// What was being reconciled.
        subject: &'static str,
        /// Purpose of the rejected statement.
        kind: StatementKind,
        /// Backend failure.
        source: ConduitError,
        /// Failure of the rollback that followed, if any.
        rollback: Option<ConduitError>,
    },

    /// Every statement succeeded but the commit was not acknowledged.
    ///
    /// The store may or may not hold the changes.
    #[error(
        "unable to {operation} {subject}: commit failed after all statements succeeded, \
         store state is ambiguous: {source}"
    )]
    Commit {
        /// Lifecycle event being served.
        operation: Operation,
        /// What was being reconciled.
        subject: &'static str,
        /// Backend failure.
        source: ConduitError,
    },

    /// The caller's deadline passed between two statements.
    #[error("unable to {operation} {subject}: deadline exceeded after {executed} statement(s)")]
    DeadlineExceeded {
        /// Lifecycle event being served.
        operation: Operation,
        /// What was being reconciled.
        subject: &'static str,
        /// Statements executed before the deadline check failed.
        executed: usize,
    },
}

impl ReconcileError {
    /// Returns `true` when the store may hold a partial or unknown result.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Commit { .. })
            || matches!(self, Self::Statement { rollback: Some(_), .. })
    }
}

fn rollback_note(rollback: &Option<ConduitError>) -> String {
    match rollback {
        Some(err) => format!(" (rollback also failed: {err})"),
        None => String::new(),
    }
}

/// Convenience alias for results with [`ReconcileError`].
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_message() {
        let err = ReconcileError::Statement {
            operation: Operation::Create,
            subject: "row set",
            kind: StatementKind::Upsert,
            source: ConduitError::new("no such table: people"),
            rollback: None,
        };
        assert_eq!(
            err.to_string(),
            "unable to create row set: upsert statement failed: no such table: people"
        );
        assert!(!err.is_ambiguous());
    }

    #[test]
    fn test_statement_error_with_failed_rollback() {
        let err = ReconcileError::Statement {
            operation: Operation::Update,
            subject: "row set",
            kind: StatementKind::Prune,
            source: ConduitError::new("locked"),
            rollback: Some(ConduitError::new("connection lost")),
        };
        assert!(err.to_string().ends_with("(rollback also failed: connection lost)"));
        assert!(err.is_ambiguous());
    }

    #[test]
    fn test_commit_error_is_flagged() {
        let err = ReconcileError::Commit {
            operation: Operation::Delete,
            subject: "row set",
            source: ConduitError::new("disk I/O error"),
        };
        assert!(err.to_string().contains("store state is ambiguous"));
        assert!(err.is_ambiguous());
    }

    #[test]
    fn test_conduit_error_keeps_source() {
        let io = std::io::Error::other("broken pipe");
        let err = ConduitError::with_source("dolt sql failed", io);
        assert_eq!(err.to_string(), "dolt sql failed");
        assert!(StdError::source(&err).is_some());
        assert!(StdError::source(&ConduitError::new("x")).is_none());
    }
}
