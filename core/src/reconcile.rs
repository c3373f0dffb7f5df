//! Row-set reconciliation.
//!
//! The [`Reconciler`] brings a table into agreement with a desired
//! [`RowSet`]. Each lifecycle event is first turned into a [`Plan`] (pure,
//! inspectable) and then executed through a [`Conduit`] as a single unit of
//! work:
//!
//! | Event  | Statements, in order                                    | Row count        |
//! |--------|---------------------------------------------------------|------------------|
//! | create | use, upsert, version commit                              | desired rows     |
//! | update | use, upsert, prune, version commit                       | desired rows     |
//! | delete | use, delete-all, version commit                          | 0                |
//!
//! Statements that would be empty (no rows to upsert, no keys to prune) are
//! left out of the plan, and the version commit only appears when
//! [`ReconcileOptions::commit`] is set. Upsert always runs before prune.
//!
//! The first failing statement aborts the call: the session is rolled back
//! before the error is returned. A failed commit is reported separately as
//! [`ReconcileError::Commit`] because the store state is then unknown.
//!
//! # Example
//!
//! ```
//! use rowsync_core::{Dialect, ReconcileOptions, RowSet, StatementKind};
//!
//! let desired = RowSet::new("app", "people", "id", ["id", "name"])
//!     .with_row("1", ["1", "Alice"]);
//! let previous = RowSet::new("app", "people", "id", ["id", "name"])
//!     .with_row("1", ["1", "Alice"])
//!     .with_row("2", ["2", "Bob"]);
//!
//! let options = ReconcileOptions::default();
//! let plan = rowsync_core::plan_update(Dialect::MySql, &options, &desired, &previous)
//!     .unwrap();
//! let kinds: Vec<_> = plan.statements.iter().map(|s| s.kind()).collect();
//! assert_eq!(kinds, vec![StatementKind::Use, StatementKind::Upsert, StatementKind::Prune]);
//! assert_eq!(plan.row_count, Some(1));
//! ```

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::conduit::{Conduit, Session};
use crate::error::{Operation, ReconcileError, Result};
use crate::statement::{self, Dialect, Statement};
use crate::validate::{BuildError, validate_identity, validate_row_set};
use crate::{CommitInfo, RowSet};

/// Per-call settings shared by every reconciliation of a [`Reconciler`].
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Record a versioned commit as the last statement of every plan.
    pub commit: Option<CommitInfo>,
    /// Stop before issuing a statement once this instant has passed.
    pub deadline: Option<Instant>,
}

impl ReconcileOptions {
    /// Sets the commit metadata.
    pub fn with_commit(mut self, commit: CommitInfo) -> Self {
        self.commit = Some(commit);
        self
    }

    /// Sets the deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The statements one lifecycle event will execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Lifecycle event the plan serves.
    pub operation: Operation,
    /// What is being reconciled, for error messages (e.g. `row set`).
    pub subject: &'static str,
    /// Statements in execution order.
    pub statements: Vec<Statement>,
    /// Rows managed once the plan has been applied, when meaningful.
    pub row_count: Option<usize>,
}

impl Plan {
    /// Returns `true` if the plan changes data or schema.
    ///
    /// A plan holding nothing but `USE` is a no-op.
    pub fn has_changes(&self) -> bool {
        self.statements
            .iter()
            .any(|s| s.kind() != statement::StatementKind::Use)
    }
}

/// Result of a successfully applied plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Rows managed after the apply (0 after a delete).
    pub row_count: usize,
    /// Number of statements that were executed.
    pub statements_executed: usize,
}

const ROW_SET: &str = "row set";

/// Plans the first apply of a row set.
///
/// # Errors
///
/// Returns [`BuildError`] if `desired` is malformed or the commit cannot be
/// rendered in `dialect`.
pub fn plan_create(
    dialect: Dialect,
    options: &ReconcileOptions,
    desired: &RowSet,
) -> std::result::Result<Plan, BuildError> {
    validate_row_set(desired)?;

    let mut statements = Vec::new();
    statements.extend(statement::use_statement(dialect, &desired.database));
    statements.extend(statement::upsert_statement(dialect, desired));
    push_commit(dialect, options, &mut statements)?;

    Ok(Plan {
        operation: Operation::Create,
        subject: ROW_SET,
        statements,
        row_count: Some(desired.row_count()),
    })
}

/// Plans a re-apply of `desired` over previously applied `previous`.
///
/// Every desired row is upserted; keys only present in `previous` are
/// pruned afterwards.
///
/// # Errors
///
/// Returns [`BuildError::IdentityChanged`] when the two sets do not share
/// database, table and unique column, or any validation error of `desired`.
pub fn plan_update(
    dialect: Dialect,
    options: &ReconcileOptions,
    desired: &RowSet,
    previous: &RowSet,
) -> std::result::Result<Plan, BuildError> {
    validate_row_set(desired)?;
    validate_identity(previous)?;

    let (desired_id, previous_id) = (desired.identity(), previous.identity());
    if desired_id != previous_id {
        return Err(BuildError::IdentityChanged {
            previous: previous_id.to_string(),
            desired: desired_id.to_string(),
        });
    }

    let mut statements = Vec::new();
    statements.extend(statement::use_statement(dialect, &desired.database));
    statements.extend(statement::upsert_statement(dialect, desired));
    statements.extend(statement::prune_statement(dialect, desired, previous));
    push_commit(dialect, options, &mut statements)?;

    Ok(Plan {
        operation: Operation::Update,
        subject: ROW_SET,
        statements,
        row_count: Some(desired.row_count()),
    })
}

/// Plans the teardown of previously applied `previous`.
///
/// # Errors
///
/// Returns [`BuildError`] if the identity fields of `previous` are empty.
pub fn plan_delete(
    dialect: Dialect,
    options: &ReconcileOptions,
    previous: &RowSet,
) -> std::result::Result<Plan, BuildError> {
    validate_identity(previous)?;

    let mut statements = Vec::new();
    statements.extend(statement::use_statement(dialect, &previous.database));
    statements.extend(statement::delete_all_statement(dialect, previous));
    push_commit(dialect, options, &mut statements)?;

    Ok(Plan {
        operation: Operation::Delete,
        subject: ROW_SET,
        statements,
        row_count: Some(0),
    })
}

pub(crate) fn push_commit(
    dialect: Dialect,
    options: &ReconcileOptions,
    statements: &mut Vec<Statement>,
) -> std::result::Result<(), BuildError> {
    if let Some(info) = &options.commit {
        statements.push(statement::commit_statement(dialect, info)?);
    }
    Ok(())
}

/// Applies row-set plans through an execution conduit.
///
/// Holds no state between calls; previous state is always supplied by the
/// caller.
pub struct Reconciler<C> {
    conduit: C,
    dialect: Dialect,
    options: ReconcileOptions,
}

impl<C: Conduit> Reconciler<C> {
    /// Creates a reconciler rendering statements in `dialect`.
    pub fn new(conduit: C, dialect: Dialect) -> Self {
        Self {
            conduit,
            dialect,
            options: ReconcileOptions::default(),
        }
    }

    /// Replaces the reconciliation options.
    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Dialect statements are rendered in.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Current options.
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Mutable access to the options, e.g. to move the deadline.
    pub fn options_mut(&mut self) -> &mut ReconcileOptions {
        &mut self.options
    }

    /// Returns a reference to the underlying conduit.
    pub fn conduit(&self) -> &C {
        &self.conduit
    }

    /// Returns a mutable reference to the underlying conduit.
    pub fn conduit_mut(&mut self) -> &mut C {
        &mut self.conduit
    }

    /// Consumes the reconciler and returns the conduit.
    pub fn into_conduit(self) -> C {
        self.conduit
    }

    /// Applies `desired` for the first time.
    pub fn create(&mut self, desired: &RowSet) -> Result<Outcome> {
        let plan = plan_create(self.dialect, &self.options, desired)?;
        self.execute(&plan)
    }

    /// Re-applies `desired` over `previous`.
    pub fn update(&mut self, desired: &RowSet, previous: &RowSet) -> Result<Outcome> {
        let plan = plan_update(self.dialect, &self.options, desired, previous)?;
        self.execute(&plan)
    }

    /// Removes every row recorded in `previous`.
    pub fn delete(&mut self, previous: &RowSet) -> Result<Outcome> {
        let plan = plan_delete(self.dialect, &self.options, previous)?;
        self.execute(&plan)
    }

    /// Executes a plan as one unit of work.
    ///
    /// Statements run in order. The deadline, if any, is checked before each
    /// statement; the first failure rolls the session back and is returned.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Connection`] if no session can be opened.
    /// - [`ReconcileError::Statement`] if a statement is rejected.
    /// - [`ReconcileError::DeadlineExceeded`] if the deadline passes.
    /// - [`ReconcileError::Commit`] if the final commit fails.
    pub fn execute(&mut self, plan: &Plan) -> Result<Outcome> {
        let (operation, subject) = (plan.operation, plan.subject);
        if plan.statements.is_empty() {
            debug!(%operation, subject, "nothing to execute");
            return Ok(Outcome {
                row_count: plan.row_count.unwrap_or(0),
                statements_executed: 0,
            });
        }
        if !self.conduit.is_atomic() {
            warn!(%operation, subject, "conduit is not transactional; a failure may leave earlier statements applied");
        }

        let mut session = self
            .conduit
            .begin()
            .map_err(|source| ReconcileError::Connection {
                operation,
                subject,
                source,
            })?;

        for (executed, stmt) in plan.statements.iter().enumerate() {
            if self.options.deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(%operation, subject, executed, "deadline exceeded, rolling back");
                if let Err(err) = session.rollback() {
                    warn!(error = %err, "rollback after deadline failed");
                }
                return Err(ReconcileError::DeadlineExceeded {
                    operation,
                    subject,
                    executed,
                });
            }

            debug!(%operation, kind = %stmt.kind(), sql = stmt.sql(), "executing statement");
            if let Err(source) = session.execute(stmt) {
                warn!(%operation, kind = %stmt.kind(), error = %source, "statement failed, rolling back");
                let rollback = session.rollback().err();
                return Err(ReconcileError::Statement {
                    operation,
                    subject,
                    kind: stmt.kind(),
                    source,
                    rollback,
                });
            }
        }

        session
            .commit()
            .map_err(|source| ReconcileError::Commit {
                operation,
                subject,
                source,
            })?;

        let outcome = Outcome {
            row_count: plan.row_count.unwrap_or(0),
            statements_executed: plan.statements.len(),
        };
        info!(
            %operation,
            subject,
            rows = outcome.row_count,
            statements = outcome.statements_executed,
            "reconciled"
        );
        Ok(outcome)
    }
}
