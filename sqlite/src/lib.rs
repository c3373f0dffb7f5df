//! SQLite execution conduit for row-set reconciliation.
//!
//! [`SqliteConduit`] implements [`rowsync_core::Conduit`] over a
//! [`rusqlite::Connection`]. Every reconciliation runs inside one SQLite
//! transaction: a rejected statement rolls back everything executed before
//! it, and a session dropped without commit is rolled back as well.
//!
//! Databases map to SQLite schemas: `main` for the opened file, or any name
//! attached with [`SqliteConduit::attach`]. Statements must be rendered with
//! [`rowsync_core::Dialect::Sqlite`], which qualifies tables with that name.
//!
//! # Quick start
//!
//! ```
//! use rowsync_core::{Dialect, Reconciler, RowSet};
//! use rowsync_sqlite::SqliteConduit;
//!
//! let conduit = SqliteConduit::open_in_memory().unwrap();
//! conduit
//!     .connection()
//!     .execute_batch("CREATE TABLE people (id TEXT PRIMARY KEY, name TEXT)")
//!     .unwrap();
//!
//! let mut reconciler = Reconciler::new(conduit, Dialect::Sqlite);
//! let people = RowSet::new("main", "people", "id", ["id", "name"])
//!     .with_row("1", ["1", "Alice"]);
//!
//! let outcome = reconciler.create(&people).unwrap();
//! assert_eq!(outcome.row_count, 1);
//! assert_eq!(reconciler.conduit().row_count("main", "people").unwrap(), 1);
//! ```

mod conduit;
mod error;

pub use conduit::{SqliteConduit, SqliteSession};
pub use error::{Result, SqliteError};
