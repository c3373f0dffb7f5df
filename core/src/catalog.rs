//! Read-only inspection of a store.
//!
//! A [`Catalog`] answers two questions: does a database exist, and which
//! columns does a table (or view) have. [`inspect`] uses those answers to
//! tell whether a previously applied [`Resource`] is still present, which is
//! how a host refreshes its recorded state against the live store.

use crate::conduit::Conduit;
use crate::error::ConduitError;
use crate::reconcile::Reconciler;
use crate::resource::Resource;

/// One column as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    /// Column name.
    pub name: String,
    /// Declared type, as the store prints it (e.g. `varchar(100)`).
    pub data_type: String,
    /// Key marker (`PRI`, `UNI`, `MUL`), empty when the column is not indexed.
    pub key: String,
}

/// Read access to a store's schema.
pub trait Catalog {
    /// Whether a database (or SQLite schema) named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ConduitError`] when the store cannot be queried.
    fn database_exists(&mut self, name: &str) -> Result<bool, ConduitError>;

    /// Columns of `database.table` in declaration order.
    ///
    /// An unknown table yields an empty list rather than an error.
    ///
    /// # Errors
    ///
    /// Returns a [`ConduitError`] when the store cannot be queried.
    fn table_columns(&mut self, database: &str, table: &str)
    -> Result<Vec<TableColumn>, ConduitError>;
}

/// Result of inspecting one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// The resource exists as recorded.
    Present,
    /// The resource, or part of it, is gone.
    Missing(String),
    /// The resource does not live in the SQL store.
    Unchecked,
}

impl Presence {
    /// `true` unless the resource was found missing.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Missing(_))
    }
}

/// Checks that `resource` still exists in the store behind `catalog`.
///
/// Row sets are checked for their table and every declared column; the rows
/// themselves are not compared.
///
/// # Errors
///
/// Returns the [`ConduitError`] of the first failed catalog query.
///
/// # Examples
///
/// ```
/// use rowsync_core::{Catalog, ConduitError, Presence, Resource, TableColumn, inspect};
///
/// struct Empty;
///
/// impl Catalog for Empty {
///     fn database_exists(&mut self, _: &str) -> Result<bool, ConduitError> {
///         Ok(false)
///     }
///     fn table_columns(&mut self, _: &str, _: &str) -> Result<Vec<TableColumn>, ConduitError> {
///         Ok(Vec::new())
///     }
/// }
///
/// let db = Resource::Database { name: "app".into() };
/// assert_eq!(
///     inspect(&mut Empty, &db).unwrap(),
///     Presence::Missing("database 'app' not found".into())
/// );
/// ```
pub fn inspect<C>(catalog: &mut C, resource: &Resource) -> Result<Presence, ConduitError>
where
    C: Catalog + ?Sized,
{
    let presence = match resource {
        Resource::Database { name } => {
            if catalog.database_exists(name)? {
                Presence::Present
            } else {
                Presence::Missing(format!("database '{name}' not found"))
            }
        }
        Resource::Table { database, name, .. } | Resource::View { database, name, .. } => {
            if catalog.table_columns(database, name)?.is_empty() {
                Presence::Missing(format!("{} '{database}.{name}' not found", resource.subject()))
            } else {
                Presence::Present
            }
        }
        Resource::RowSet(set) => {
            let columns = catalog.table_columns(&set.database, &set.table)?;
            if columns.is_empty() {
                return Ok(Presence::Missing(format!(
                    "table '{}.{}' not found",
                    set.database, set.table
                )));
            }
            let absent = set.columns.iter().find(|wanted| {
                !columns
                    .iter()
                    .any(|column| column.name.eq_ignore_ascii_case(wanted))
            });
            match absent {
                Some(column) => Presence::Missing(format!(
                    "column '{column}' not found in '{}.{}'",
                    set.database, set.table
                )),
                None => Presence::Present,
            }
        }
        Resource::Repository { .. } => Presence::Unchecked,
    };
    Ok(presence)
}

impl<C: Conduit + Catalog> Reconciler<C> {
    /// Inspects `resource` through this reconciler's conduit.
    ///
    /// # Errors
    ///
    /// See [`inspect`].
    pub fn inspect(&mut self, resource: &Resource) -> Result<Presence, ConduitError> {
        inspect(self.conduit_mut(), resource)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::RowSet;

    #[derive(Default)]
    struct FakeCatalog {
        databases: Vec<String>,
        tables: BTreeMap<(String, String), Vec<TableColumn>>,
        fail: bool,
    }

    impl FakeCatalog {
        fn with_table(mut self, database: &str, table: &str, columns: &[&str]) -> Self {
            let columns = columns
                .iter()
                .map(|name| TableColumn {
                    name: name.to_string(),
                    data_type: "text".into(),
                    key: String::new(),
                })
                .collect();
            self.tables
                .insert((database.to_string(), table.to_string()), columns);
            self
        }
    }

    impl Catalog for FakeCatalog {
        fn database_exists(&mut self, name: &str) -> Result<bool, ConduitError> {
            if self.fail {
                return Err(ConduitError::new("connection reset"));
            }
            Ok(self.databases.iter().any(|db| db == name))
        }

        fn table_columns(
            &mut self,
            database: &str,
            table: &str,
        ) -> Result<Vec<TableColumn>, ConduitError> {
            if self.fail {
                return Err(ConduitError::new("connection reset"));
            }
            Ok(self
                .tables
                .get(&(database.to_string(), table.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn people() -> Resource {
        Resource::RowSet(
            RowSet::new("app", "people", "id", ["id", "name"]).with_row("1", ["1", "Alice"]),
        )
    }

    #[test]
    fn test_database_presence() {
        let mut catalog = FakeCatalog {
            databases: vec!["app".into()],
            ..Default::default()
        };
        let app = Resource::Database { name: "app".into() };
        let other = Resource::Database { name: "other".into() };
        assert_eq!(inspect(&mut catalog, &app).unwrap(), Presence::Present);
        assert!(!inspect(&mut catalog, &other).unwrap().is_ok());
    }

    #[test]
    fn test_row_set_needs_table_and_columns() {
        let mut catalog = FakeCatalog::default().with_table("app", "people", &["ID", "name"]);
        assert_eq!(inspect(&mut catalog, &people()).unwrap(), Presence::Present);

        let mut narrow = FakeCatalog::default().with_table("app", "people", &["id"]);
        assert_eq!(
            inspect(&mut narrow, &people()).unwrap(),
            Presence::Missing("column 'name' not found in 'app.people'".into())
        );

        let mut empty = FakeCatalog::default();
        assert_eq!(
            inspect(&mut empty, &people()).unwrap(),
            Presence::Missing("table 'app.people' not found".into())
        );
    }

    #[test]
    fn test_view_uses_column_listing() {
        let view = Resource::View {
            database: "app".into(),
            name: "adults".into(),
            query: "SELECT 1".into(),
        };
        let mut catalog = FakeCatalog::default();
        assert_eq!(
            inspect(&mut catalog, &view).unwrap(),
            Presence::Missing("view 'app.adults' not found".into())
        );
        let mut catalog = catalog.with_table("app", "adults", &["id"]);
        assert_eq!(inspect(&mut catalog, &view).unwrap(), Presence::Present);
    }

    #[test]
    fn test_repository_is_unchecked() {
        let repo = Resource::Repository {
            path: "/srv/dolt/app".into(),
            name: "Ops".into(),
            email: "ops@example.com".into(),
        };
        let mut catalog = FakeCatalog {
            fail: true,
            ..Default::default()
        };
        assert_eq!(inspect(&mut catalog, &repo).unwrap(), Presence::Unchecked);
    }

    #[test]
    fn test_catalog_errors_propagate() {
        let mut catalog = FakeCatalog {
            fail: true,
            ..Default::default()
        };
        let err = inspect(&mut catalog, &people()).unwrap_err();
        assert_eq!(err.message(), "connection reset");
    }
}
