//! Transactional conduit backed by `rusqlite`.
//!
//! # Example
//!
//! ```
//! use rowsync_core::{Conduit, Session, Statement, StatementKind};
//! use rowsync_sqlite::SqliteConduit;
//!
//! let mut conduit = SqliteConduit::open_in_memory().unwrap();
//! conduit.connection().execute_batch("CREATE TABLE t (k TEXT PRIMARY KEY)").unwrap();
//!
//! // A session dropped without commit leaves no trace.
//! {
//!     let mut session = conduit.begin().unwrap();
//!     session
//!         .execute(&Statement::new(StatementKind::Upsert, "INSERT INTO t VALUES ('a')"))
//!         .unwrap();
//! }
//! assert_eq!(conduit.row_count("main", "t").unwrap(), 0);
//! ```

use std::path::Path;

use rowsync_core::{Catalog, Conduit, ConduitError, Session, Statement, TableColumn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::error::{Result, SqliteError};

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Validates that a schema name contains only alphanumeric characters and underscores.
fn validate_schema_name(name: &str) -> Result<()> {
    if !is_plain_name(name) {
        return Err(SqliteError::InvalidSchemaName(name.to_string()));
    }
    Ok(())
}

/// Same rule as [`validate_schema_name`], for table names.
fn validate_table_name(name: &str) -> Result<()> {
    if !is_plain_name(name) {
        return Err(SqliteError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

/// Execution conduit running each unit of work in a SQLite transaction.
///
/// Transactions are opened with `BEGIN IMMEDIATE` so the write lock is taken
/// up front rather than on the first statement.
pub struct SqliteConduit {
    conn: Connection,
}

impl SqliteConduit {
    /// Wraps an open connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens (creating if needed) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Attaches another database file under `schema`.
    ///
    /// Row sets whose `database` is `schema` are then written to that file.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidSchemaName`] if `schema` is empty or has
    /// characters other than alphanumerics and underscores.
    pub fn attach(&self, path: impl AsRef<Path>, schema: &str) -> Result<()> {
        validate_schema_name(schema)?;
        let path = path.as_ref().to_string_lossy().into_owned();
        self.conn
            .execute(&format!("ATTACH DATABASE ?1 AS {schema}"), [&path])?;
        Ok(())
    }

    /// Counts the rows of `schema.table`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidSchemaName`] or
    /// [`SqliteError::InvalidTableName`] for names that are not plain
    /// identifiers.
    pub fn row_count(&self, schema: &str, table: &str) -> Result<usize> {
        validate_schema_name(schema)?;
        validate_table_name(table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT COUNT(*) FROM {schema}.{table}"))?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the conduit and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

impl Conduit for SqliteConduit {
    type Session<'a> = SqliteSession<'a>;

    fn begin(&mut self) -> std::result::Result<SqliteSession<'_>, ConduitError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| ConduitError::with_source(format!("failed to begin transaction: {e}"), e))?;
        Ok(SqliteSession { tx })
    }

    fn is_atomic(&self) -> bool {
        true
    }
}

impl Catalog for SqliteConduit {
    fn database_exists(&mut self, name: &str) -> std::result::Result<bool, ConduitError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_database_list")
            .map_err(ConduitError::from_source)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(ConduitError::from_source)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ConduitError::from_source)?;
        Ok(names.iter().any(|schema| schema == name))
    }

    fn table_columns(
        &mut self,
        database: &str,
        table: &str,
    ) -> std::result::Result<Vec<TableColumn>, ConduitError> {
        if !self.database_exists(database)? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT name, type, pk FROM pragma_table_info(?1, ?2) ORDER BY cid")
            .map_err(ConduitError::from_source)?;
        let columns = stmt
            .query_map([table, database], |row| {
                let pk: i64 = row.get(2)?;
                Ok(TableColumn {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    key: if pk > 0 { "PRI".to_string() } else { String::new() },
                })
            })
            .map_err(ConduitError::from_source)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ConduitError::from_source)?;
        Ok(columns)
    }
}

/// A reconciliation in progress: one open SQLite transaction.
///
/// Dropping the session without calling [`Session::commit`] rolls the
/// transaction back.
pub struct SqliteSession<'a> {
    tx: Transaction<'a>,
}

impl Session for SqliteSession<'_> {
    fn execute(&mut self, statement: &Statement) -> std::result::Result<(), ConduitError> {
        debug!(kind = %statement.kind(), "sqlite execute");
        self.tx
            .execute_batch(statement.sql())
            .map_err(ConduitError::from_source)
    }

    fn commit(self) -> std::result::Result<(), ConduitError> {
        self.tx.commit().map_err(ConduitError::from_source)
    }

    fn rollback(self) -> std::result::Result<(), ConduitError> {
        self.tx.rollback().map_err(ConduitError::from_source)
    }
}
