//! Row-set type definitions.
//!
//! This module defines the in-memory model of a declared collection of rows:
//! the target table, the column that identifies each row, the ordered column
//! list, and the mapping from row key to value tuple. The same type is used
//! for the desired state of a reconciliation and for the previously applied
//! state handed back by the host.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A declared set of uniquely keyed rows in one table.
///
/// `columns` is ordered: the value at position `i` of every row tuple belongs
/// to `columns[i]`. Rows live in a [`BTreeMap`] so iteration, and therefore
/// every rendered statement, follows lexicographic key order.
///
/// # Examples
///
/// ```
/// use rowsync_core::RowSet;
///
/// let people = RowSet::new("app", "people", "id", ["id", "name"])
///     .with_row("1", ["1", "Alice"])
///     .with_row("2", ["2", "Bob"]);
///
/// assert_eq!(people.row_count(), 2);
/// assert_eq!(people.keys().collect::<Vec<_>>(), vec!["1", "2"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSet {
    /// Schema/database that contains the table.
    pub database: String,
    /// Target table name.
    pub table: String,
    /// Column holding the stable row identity.
    pub unique_column: String,
    /// Ordered column names.
    pub columns: Vec<String>,
    /// Row key to value tuple, one value per entry in `columns`.
    #[serde(default)]
    pub rows: BTreeMap<String, Vec<String>>,
}

impl RowSet {
    /// Creates an empty row set.
    pub fn new<I, S>(
        database: impl Into<String>,
        table: impl Into<String>,
        unique_column: impl Into<String>,
        columns: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            database: database.into(),
            table: table.into(),
            unique_column: unique_column.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) the row stored under `key`.
    pub fn with_row<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_row(key, values);
        self
    }

    /// Inserts a row, returning the tuple it replaced if the key was present.
    pub fn insert_row<I, S>(&mut self, key: impl Into<String>, values: I) -> Option<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows
            .insert(key.into(), values.into_iter().map(Into::into).collect())
    }

    /// Number of rows managed by this set.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the set holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// The `(database, table, unique column)` triple identifying this set.
    pub fn identity(&self) -> RowSetIdentity {
        RowSetIdentity {
            database: self.database.clone(),
            table: self.table.clone(),
            unique_column: self.unique_column.clone(),
        }
    }

    /// Columns other than the unique column, in declaration order.
    pub fn value_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(move |column| *column != self.unique_column)
    }

    /// Keys present in `previous` but absent from `self`.
    ///
    /// Treating `self` as the desired state, these are exactly the rows a
    /// reconciliation must delete. Keys present in both sets are never
    /// returned, whatever their values.
    ///
    /// # Examples
    ///
    /// ```
    /// use rowsync_core::RowSet;
    ///
    /// let previous = RowSet::new("app", "people", "id", ["id", "name"])
    ///     .with_row("1", ["1", "Alice"])
    ///     .with_row("2", ["2", "Bob"]);
    /// let desired = RowSet::new("app", "people", "id", ["id", "name"])
    ///     .with_row("2", ["2", "Robert"]);
    ///
    /// let pruned: Vec<_> = desired.prune_keys(&previous).into_iter().collect();
    /// assert_eq!(pruned, vec!["1"]);
    /// ```
    pub fn prune_keys<'a>(&self, previous: &'a RowSet) -> BTreeSet<&'a str> {
        previous
            .keys()
            .filter(|key| !self.rows.contains_key(*key))
            .collect()
    }
}

/// Identity of a row set as seen by the host.
///
/// Two row sets with the same identity manage the same rows; the host never
/// runs two reconciliations for one identity at the same time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowSetIdentity {
    /// Schema/database name.
    pub database: String,
    /// Table name.
    pub table: String,
    /// Unique column name.
    pub unique_column: String,
}

impl std::fmt::Display for RowSetIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} ({})", self.database, self.table, self.unique_column)
    }
}

/// Metadata for a versioned commit recorded after an apply.
///
/// # Examples
///
/// ```
/// use rowsync_core::CommitInfo;
///
/// let info = CommitInfo::new("seed reference data", "Ops Bot", "ops@example.com");
/// assert_eq!(info.author(), "Ops Bot <ops@example.com>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Commit message.
    pub message: String,
    /// Author display name.
    pub author_name: String,
    /// Author email address.
    pub author_email: String,
}

impl CommitInfo {
    /// Creates commit metadata.
    pub fn new(
        message: impl Into<String>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            author_name: author_name.into(),
            author_email: author_email.into(),
        }
    }

    /// Author in `Name <email>` form.
    pub fn author(&self) -> String {
        format!("{} <{}>", self.author_name, self.author_email)
    }
}
