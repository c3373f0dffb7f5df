//! Row-set model, statement rendering and reconciliation.
//!
//! This crate defines everything needed to keep the contents of a table in
//! agreement with a declared set of rows:
//!
//! - [`RowSet`]: the declared rows of one table, keyed by a unique column.
//! - [`statement`]: pure rendering of `USE`, upsert, prune and delete
//!   statements in a chosen [`Dialect`].
//! - [`Conduit`] / [`Session`]: how statements reach the store, either in a
//!   transaction or one process invocation at a time.
//! - [`Reconciler`]: plans and applies create, update and delete events as a
//!   single unit of work, rolling back on the first failure.
//! - [`Resource`]: tagged dispatch over row sets and the thin database,
//!   table, view and repository resources that surround them.
//! - [`Catalog`]: read-only schema queries, used by [`inspect`] to check
//!   that applied resources still exist.
//!
//! Validation ([`validate_row_set`]) catches malformed models such as rows
//! whose value count does not match the column list before any statement
//! is rendered.
//!
//! # Example
//!
//! ```
//! use rowsync_core::*;
//!
//! let previous = RowSet::new("app", "people", "id", ["id", "name"])
//!     .with_row("1", ["1", "Alice"])
//!     .with_row("2", ["2", "Bob"]);
//! let desired = RowSet::new("app", "people", "id", ["id", "name"])
//!     .with_row("2", ["2", "Robert"])
//!     .with_row("3", ["3", "Carol"]);
//!
//! assert!(validate_row_set(&desired).is_ok());
//!
//! let prune = statement::prune_statement(Dialect::MySql, &desired, &previous).unwrap();
//! assert_eq!(prune.sql(), "DELETE FROM people WHERE id IN ('1')");
//! ```

mod catalog;
mod conduit;
mod error;
mod reconcile;
mod resource;
pub mod statement;
mod types;
mod validate;

pub use catalog::{Catalog, Presence, TableColumn, inspect};
pub use conduit::{Conduit, Session};
pub use error::{ConduitError, Operation, ReconcileError, Result};
pub use reconcile::{
    Outcome, Plan, ReconcileOptions, Reconciler, plan_create, plan_delete, plan_update,
};
pub use resource::{Change, Resource, diff_resources, plan_change};
pub use statement::{Dialect, Statement, StatementKind};
pub use types::*;
pub use validate::{BuildError, validate_identity, validate_row_set};
