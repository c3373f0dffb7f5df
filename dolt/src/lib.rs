//! Dolt execution conduit for row-set reconciliation.
//!
//! [`DoltCli`] implements [`rowsync_core::Conduit`] by running
//! `dolt [--use-db <db>] sql -q <statement>` inside a Dolt repository, one
//! process per statement, each bounded by a timeout.
//!
//! There is no transaction spanning a reconciliation. If a statement fails,
//! the ones before it remain applied; re-running the reconciliation converges
//! because upserts and deletes are idempotent. Use
//! [`rowsync_core::Dialect::MySql`] to render statements for Dolt.
//!
//! The same handle also creates and removes repositories
//! ([`DoltCli::init`], [`DoltCli::remove_repository`]) and answers
//! [`rowsync_core::Catalog`] queries through `dolt sql -r json`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rowsync_core::{CommitInfo, Dialect, ReconcileOptions, Reconciler, RowSet};
//! use rowsync_dolt::DoltCli;
//!
//! let cli = DoltCli::new("/var/lib/dolt/app").with_timeout(Duration::from_secs(10));
//! let options = ReconcileOptions::default()
//!     .with_commit(CommitInfo::new("seed people", "Ops", "ops@example.com"));
//! let mut reconciler = Reconciler::new(cli, Dialect::MySql).with_options(options);
//!
//! let people = RowSet::new("app", "people", "id", ["id", "name"])
//!     .with_row("1", ["1", "Alice"]);
//! reconciler.create(&people).unwrap();
//! ```

mod error;
mod process;
mod repository;

pub use error::{DoltError, Result};
pub use process::{DEFAULT_TIMEOUT, DoltCli, DoltSession};
pub use repository::DOLT_DIR;
