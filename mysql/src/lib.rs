//! MySQL-protocol execution conduit for row-set reconciliation.
//!
//! [`MysqlConduit`] implements [`rowsync_core::Conduit`] over a
//! [`mysql::Conn`], so it works against MySQL itself or a `dolt sql-server`.
//! Each unit of work is one server transaction: a rejected statement rolls
//! back everything executed before it, and a session dropped without commit
//! is rolled back as well. Statements must be rendered with
//! [`rowsync_core::Dialect::MySql`].
//!
//! # Quick start
//!
//! ```no_run
//! use rowsync_core::{Dialect, Reconciler, RowSet};
//! use rowsync_mysql::MysqlConduit;
//!
//! let conduit = MysqlConduit::connect("mysql://root@127.0.0.1:3306").unwrap();
//! let mut reconciler = Reconciler::new(conduit, Dialect::MySql);
//! let people = RowSet::new("app", "people", "id", ["id", "name"])
//!     .with_row("1", ["1", "Alice"]);
//! reconciler.create(&people).unwrap();
//! ```

mod conduit;
mod error;

pub use conduit::{MysqlConduit, MysqlSession};
pub use error::{MysqlError, Result};
