//! SQL statement rendering.
//!
//! Pure functions that turn a [`RowSet`] (and, for pruning, a pair of row
//! sets) into literal SQL text. Nothing here touches a connection or a
//! process; the [`Reconciler`](crate::Reconciler) decides which statements
//! run and in which order.
//!
//! Identifiers are substituted verbatim. Values and keys are rendered as
//! single-quoted string literals with embedded quotes doubled.
//!
//! Functions that could produce an empty `VALUES` list or an empty `IN (...)`
//! list return `None` instead.
//!
//! # Example
//!
//! ```
//! use rowsync_core::{Dialect, RowSet, statement};
//!
//! let people = RowSet::new("app", "people", "id", ["id", "name"])
//!     .with_row("1", ["1", "Alice"]);
//!
//! let upsert = statement::upsert_statement(Dialect::MySql, &people).unwrap();
//! assert_eq!(
//!     upsert.sql(),
//!     "INSERT INTO people (id, name) VALUES ('1', 'Alice') \
//!      ON DUPLICATE KEY UPDATE name = VALUES(name)"
//! );
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validate::{BuildError, require_identifier};
use crate::{CommitInfo, RowSet};

/// SQL grammar used to render statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// MySQL grammar as accepted by Dolt (the default).
    #[default]
    MySql,
    /// SQLite grammar; databases map to attached schemas.
    Sqlite,
}

impl Dialect {
    /// Lowercase dialect name.
    pub fn name(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Table reference as it appears in data statements.
    fn table_ref(self, set: &RowSet) -> String {
        match self {
            Self::MySql => set.table.clone(),
            Self::Sqlite => format!("{}.{}", set.database, set.table),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a rendered statement does.
///
/// Carried alongside the SQL so a failing statement can be reported by
/// purpose rather than by text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Selects the working database.
    Use,
    /// Inserts or updates desired rows.
    Upsert,
    /// Deletes rows removed since the previous apply.
    Prune,
    /// Deletes every row of a set.
    DeleteAll,
    /// Records a versioned commit.
    VersionCommit,
    /// Creates or drops a database, table or view.
    Ddl,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Use => "use",
            Self::Upsert => "upsert",
            Self::Prune => "prune",
            Self::DeleteAll => "delete",
            Self::VersionCommit => "version commit",
            Self::Ddl => "ddl",
        };
        f.write_str(label)
    }
}

/// A rendered SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    kind: StatementKind,
    sql: String,
}

impl Statement {
    /// Wraps SQL text with its purpose.
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
        }
    }

    /// Purpose of the statement.
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Database named by a `USE` statement.
    pub fn used_database(&self) -> Option<&str> {
        if self.kind != StatementKind::Use {
            return None;
        }
        self.sql.strip_prefix("USE ").map(str::trim)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Renders a string as a single-quoted SQL literal in `dialect`.
///
/// Quotes are doubled in both dialects. MySQL also treats `\` as an escape
/// character inside literals, so backslashes are doubled there as well.
///
/// # Examples
///
/// ```
/// use rowsync_core::Dialect;
/// use rowsync_core::statement::quote_literal;
///
/// assert_eq!(quote_literal(Dialect::Sqlite, "O'Brien"), "'O''Brien'");
/// assert_eq!(quote_literal(Dialect::MySql, r"C:\"), r"'C:\\'");
/// ```
pub fn quote_literal(dialect: Dialect, value: &str) -> String {
    let escaped = match dialect {
        Dialect::MySql => value.replace('\\', "\\\\").replace('\'', "''"),
        Dialect::Sqlite => value.replace('\'', "''"),
    };
    format!("'{escaped}'")
}

fn key_list<'a>(dialect: Dialect, keys: impl IntoIterator<Item = &'a str>) -> String {
    keys.into_iter()
        .map(|key| quote_literal(dialect, key))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Selects the working database.
///
/// SQLite has no `USE`; tables are qualified with the database name
/// instead, so this returns `None` for [`Dialect::Sqlite`].
pub fn use_statement(dialect: Dialect, database: &str) -> Option<Statement> {
    match dialect {
        Dialect::MySql => Some(Statement::new(
            StatementKind::Use,
            format!("USE {database}"),
        )),
        Dialect::Sqlite => None,
    }
}

/// Inserts every row of `desired`, updating non-key columns on conflict.
///
/// Returns `None` when `desired` has no rows.
pub fn upsert_statement(dialect: Dialect, desired: &RowSet) -> Option<Statement> {
    if desired.is_empty() {
        return None;
    }

    let columns = desired.columns.join(", ");
    let tuples = desired
        .rows
        .values()
        .map(|values| {
            let literals: Vec<String> = values.iter().map(|v| quote_literal(dialect, v)).collect();
            format!("({})", literals.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ");

    let value_columns: Vec<&str> = desired.value_columns().collect();
    let on_conflict = match dialect {
        Dialect::MySql => {
            // A key-only set still needs a non-empty update list.
            let targets = if value_columns.is_empty() {
                vec![desired.unique_column.as_str()]
            } else {
                value_columns
            };
            let assignments: Vec<String> = targets
                .iter()
                .map(|c| format!("{c} = VALUES({c})"))
                .collect();
            format!("ON DUPLICATE KEY UPDATE {}", assignments.join(", "))
        }
        Dialect::Sqlite => {
            if value_columns.is_empty() {
                format!("ON CONFLICT({}) DO NOTHING", desired.unique_column)
            } else {
                let assignments: Vec<String> = value_columns
                    .iter()
                    .map(|c| format!("{c} = excluded.{c}"))
                    .collect();
                format!(
                    "ON CONFLICT({}) DO UPDATE SET {}",
                    desired.unique_column,
                    assignments.join(", ")
                )
            }
        }
    };

    Some(Statement::new(
        StatementKind::Upsert,
        format!(
            "INSERT INTO {} ({columns}) VALUES {tuples} {on_conflict}",
            dialect.table_ref(desired)
        ),
    ))
}

/// Deletes rows whose key is in `previous` but no longer in `desired`.
///
/// Rows are matched on the desired set's unique column. Returns `None` when
/// nothing was removed.
pub fn prune_statement(dialect: Dialect, desired: &RowSet, previous: &RowSet) -> Option<Statement> {
    let keys = desired.prune_keys(previous);
    if keys.is_empty() {
        return None;
    }
    Some(Statement::new(
        StatementKind::Prune,
        format!(
            "DELETE FROM {} WHERE {} IN ({})",
            dialect.table_ref(desired),
            desired.unique_column,
            key_list(dialect, keys)
        ),
    ))
}

/// Deletes every row of `set`.
///
/// Returns `None` when `set` has no rows.
pub fn delete_all_statement(dialect: Dialect, set: &RowSet) -> Option<Statement> {
    if set.is_empty() {
        return None;
    }
    Some(Statement::new(
        StatementKind::DeleteAll,
        format!(
            "DELETE FROM {} WHERE {} IN ({})",
            dialect.table_ref(set),
            set.unique_column,
            key_list(dialect, set.keys())
        ),
    ))
}

/// Records a Dolt commit of all working changes.
///
/// `--skip-empty` makes the call a no-op when the working set is clean, so
/// re-applying an unchanged configuration does not fail.
///
/// # Errors
///
/// Returns [`BuildError::Unsupported`] for dialects without versioning, and
/// [`BuildError::EmptyIdentifier`] for an empty message or author.
pub fn commit_statement(dialect: Dialect, info: &CommitInfo) -> Result<Statement, BuildError> {
    if dialect != Dialect::MySql {
        return Err(BuildError::Unsupported {
            dialect: dialect.name(),
            feature: "version commits",
        });
    }
    require_identifier(&info.message, "commit message")?;
    require_identifier(&info.author_name, "author name")?;
    require_identifier(&info.author_email, "author email")?;

    Ok(Statement::new(
        StatementKind::VersionCommit,
        format!(
            "CALL DOLT_COMMIT('-A', '--skip-empty', '-m', {}, '--author', {})",
            quote_literal(dialect, &info.message),
            quote_literal(dialect, &info.author())
        ),
    ))
}
