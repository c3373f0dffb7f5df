//! Declared resources and lifecycle dispatch.
//!
//! A [`Resource`] is one entry of a declarative configuration. Row sets carry
//! the reconciliation logic of [`crate::reconcile`]; databases, tables and
//! views are thin pass-throughs that render a fixed statement per lifecycle
//! event. [`plan_change`] dispatches on the variant and returns the plans to
//! execute, in order.
//!
//! Repositories are directories on the host rather than objects inside the
//! store. Their plans carry no statements; the host provisions them itself
//! before any SQL runs and removes them after.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use rowsync_core::{Change, Resource, RowSet, diff_resources};
//!
//! let mut desired = BTreeMap::new();
//! desired.insert(
//!     "people".to_string(),
//!     Resource::RowSet(RowSet::new("app", "people", "id", ["id"]).with_row("1", ["1"])),
//! );
//! let previous = BTreeMap::new();
//!
//! let changes = diff_resources(&desired, &previous);
//! assert_eq!(changes.len(), 1);
//! assert!(matches!(changes[0].1, Change::Create(_)));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::conduit::Conduit;
use crate::error::{Operation, Result as ReconcileResult};
use crate::reconcile::{self, Outcome, Plan, ReconcileOptions, Reconciler, push_commit};
use crate::statement::{self, Dialect, Statement, StatementKind};
use crate::validate::{BuildError, require_identifier, validate_row_set};
use crate::RowSet;

/// A declared resource, tagged by `kind` when serialized.
///
/// # Examples
///
/// ```
/// use rowsync_core::Resource;
///
/// let yaml_like = r#"{"kind":"view","database":"app","name":"adults","query":"SELECT 1"}"#;
/// let view: Resource = serde_json::from_str(yaml_like).unwrap();
/// assert_eq!(view.kind_name(), "view");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    /// Managed rows of one table.
    RowSet(RowSet),
    /// A database (MySQL grammar only).
    Database {
        /// Database name.
        name: String,
    },
    /// A table created from a user-supplied DDL statement.
    Table {
        /// Containing database.
        database: String,
        /// Table name, used for teardown.
        name: String,
        /// `CREATE TABLE` statement executed verbatim.
        query: String,
    },
    /// A view over a user-supplied query.
    View {
        /// Containing database.
        database: String,
        /// View name.
        name: String,
        /// `SELECT` the view is defined as.
        query: String,
    },
    /// A Dolt repository directory.
    Repository {
        /// Directory holding (or to hold) the repository.
        path: String,
        /// Committer name recorded by `dolt init`.
        name: String,
        /// Committer email recorded by `dolt init`.
        email: String,
    },
}

impl Resource {
    /// Serialized `kind` tag.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::RowSet(_) => "row_set",
            Self::Database { .. } => "database",
            Self::Table { .. } => "table",
            Self::View { .. } => "view",
            Self::Repository { .. } => "repository",
        }
    }

    /// Human-readable subject used in error messages.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::RowSet(_) => "row set",
            Self::Database { .. } => "database",
            Self::Table { .. } => "table",
            Self::View { .. } => "view",
            Self::Repository { .. } => "repository",
        }
    }

    /// Whether the resource is provisioned outside the SQL store.
    pub fn is_host_side(&self) -> bool {
        matches!(self, Self::Repository { .. })
    }

    /// The row set, if this resource is one.
    pub fn as_row_set(&self) -> Option<&RowSet> {
        match self {
            Self::RowSet(set) => Some(set),
            _ => None,
        }
    }

    /// Where the resource lives in the store.
    ///
    /// An update whose address differs from the previous one cannot be
    /// applied in place and is planned as delete followed by create.
    pub fn address(&self) -> String {
        match self {
            Self::RowSet(set) => format!("row_set:{}", set.identity()),
            Self::Database { name } => format!("database:{name}"),
            Self::Table { database, name, .. } => format!("table:{database}.{name}"),
            Self::View { database, name, .. } => format!("view:{database}.{name}"),
            Self::Repository { path, .. } => format!("repository:{path}"),
        }
    }

    /// Checks the resource can be rendered.
    ///
    /// # Errors
    ///
    /// Returns the first [`BuildError`] found.
    pub fn validate(&self) -> Result<(), BuildError> {
        match self {
            Self::RowSet(set) => validate_row_set(set),
            Self::Database { name } => require_identifier(name, "database"),
            Self::Table {
                database,
                name,
                query,
            }
            | Self::View {
                database,
                name,
                query,
            } => {
                require_identifier(database, "database")?;
                require_identifier(name, "name")?;
                require_identifier(query, "query")
            }
            Self::Repository { path, name, email } => {
                require_identifier(path, "path")?;
                require_identifier(name, "author name")?;
                require_identifier(email, "author email")
            }
        }
    }

    /// Canonical JSON used for checksums (keys sorted by the `BTreeMap`s).
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A lifecycle event for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<'a> {
    /// Declared but never applied.
    Create(&'a Resource),
    /// Declared and previously applied.
    Update {
        /// Declared state.
        desired: &'a Resource,
        /// Last applied state.
        previous: &'a Resource,
    },
    /// Applied previously but no longer declared.
    Delete(&'a Resource),
}

/// Pairs declared resources with previously applied ones by name.
///
/// Creates and updates come first, in name order; deletes follow in reverse
/// name order so teardown mirrors setup.
pub fn diff_resources<'a>(
    desired: &'a BTreeMap<String, Resource>,
    previous: &'a BTreeMap<String, Resource>,
) -> Vec<(&'a str, Change<'a>)> {
    let mut changes: Vec<(&str, Change<'_>)> = desired
        .iter()
        .map(|(name, resource)| {
            let change = match previous.get(name) {
                Some(prev) => Change::Update {
                    desired: resource,
                    previous: prev,
                },
                None => Change::Create(resource),
            };
            (name.as_str(), change)
        })
        .collect();

    changes.extend(
        previous
            .iter()
            .rev()
            .filter(|(name, _)| !desired.contains_key(*name))
            .map(|(name, resource)| (name.as_str(), Change::Delete(resource))),
    );
    changes
}

/// Plans a lifecycle event for any resource kind.
///
/// Returns one plan, or two (delete then create) when an update moves the
/// resource to a different address or kind.
///
/// # Errors
///
/// Returns [`BuildError`] if a resource is malformed or cannot be expressed
/// in `dialect`.
pub fn plan_change(
    dialect: Dialect,
    options: &ReconcileOptions,
    change: Change<'_>,
) -> Result<Vec<Plan>, BuildError> {
    match change {
        Change::Create(desired) => Ok(vec![plan_create(dialect, options, desired)?]),
        Change::Delete(previous) => Ok(vec![plan_delete(dialect, options, previous)?]),
        Change::Update { desired, previous } => {
            if desired.address() != previous.address() {
                return Ok(vec![
                    plan_delete(dialect, options, previous)?,
                    plan_create(dialect, options, desired)?,
                ]);
            }
            Ok(vec![plan_update(dialect, options, desired, previous)?])
        }
    }
}

impl<C: Conduit> Reconciler<C> {
    /// Plans a lifecycle event with this reconciler's dialect and options.
    ///
    /// # Errors
    ///
    /// See [`plan_change`].
    pub fn plan_change(&self, change: Change<'_>) -> Result<Vec<Plan>, BuildError> {
        plan_change(self.dialect(), self.options(), change)
    }

    /// Plans and executes a lifecycle event.
    ///
    /// Each plan runs as its own unit of work; the first failure stops the
    /// sequence. Returns one outcome per executed plan.
    pub fn apply_change(&mut self, change: Change<'_>) -> ReconcileResult<Vec<Outcome>> {
        let plans = self.plan_change(change)?;
        plans.iter().map(|plan| self.execute(plan)).collect()
    }
}

fn plan_create(
    dialect: Dialect,
    options: &ReconcileOptions,
    desired: &Resource,
) -> Result<Plan, BuildError> {
    match desired {
        Resource::RowSet(set) => reconcile::plan_create(dialect, options, set),
        Resource::Repository { .. } => {
            desired.validate()?;
            Ok(host_side_plan(Operation::Create, desired))
        }
        other => {
            other.validate()?;
            ddl_plan(dialect, options, Operation::Create, other, create_ddl(dialect, other)?)
        }
    }
}

fn plan_update(
    dialect: Dialect,
    options: &ReconcileOptions,
    desired: &Resource,
    previous: &Resource,
) -> Result<Plan, BuildError> {
    match (desired, previous) {
        (Resource::RowSet(set), Resource::RowSet(prev)) => {
            reconcile::plan_update(dialect, options, set, prev)
        }
        (Resource::View { .. }, _) => {
            desired.validate()?;
            ddl_plan(dialect, options, Operation::Update, desired, create_ddl(dialect, desired)?)
        }
        // Databases, tables and repositories are never altered in place.
        _ => {
            desired.validate()?;
            Ok(host_side_plan(Operation::Update, desired))
        }
    }
}

fn plan_delete(
    dialect: Dialect,
    options: &ReconcileOptions,
    previous: &Resource,
) -> Result<Plan, BuildError> {
    match previous {
        Resource::RowSet(set) => reconcile::plan_delete(dialect, options, set),
        Resource::Repository { .. } => Ok(host_side_plan(Operation::Delete, previous)),
        other => ddl_plan(dialect, options, Operation::Delete, other, drop_ddl(dialect, other)?),
    }
}

/// A plan with nothing for the conduit to run.
fn host_side_plan(operation: Operation, resource: &Resource) -> Plan {
    Plan {
        operation,
        subject: resource.subject(),
        statements: Vec::new(),
        row_count: None,
    }
}

fn ddl_plan(
    dialect: Dialect,
    options: &ReconcileOptions,
    operation: Operation,
    resource: &Resource,
    ddl: Vec<String>,
) -> Result<Plan, BuildError> {
    let mut statements = Vec::new();
    if let Resource::Table { database, .. } | Resource::View { database, .. } = resource {
        statements.extend(statement::use_statement(dialect, database));
    }
    statements.extend(ddl.into_iter().map(|sql| Statement::new(StatementKind::Ddl, sql)));
    push_commit(dialect, options, &mut statements)?;
    Ok(Plan {
        operation,
        subject: resource.subject(),
        statements,
        row_count: None,
    })
}

fn qualified(dialect: Dialect, database: &str, name: &str) -> String {
    match dialect {
        Dialect::MySql => name.to_string(),
        Dialect::Sqlite => format!("{database}.{name}"),
    }
}

fn create_ddl(dialect: Dialect, resource: &Resource) -> Result<Vec<String>, BuildError> {
    let ddl = match resource {
        Resource::RowSet(_) | Resource::Repository { .. } => Vec::new(),
        Resource::Database { name } => match dialect {
            Dialect::MySql => vec![format!("CREATE DATABASE {name}")],
            Dialect::Sqlite => return Err(unsupported(dialect, "databases")),
        },
        Resource::Table { query, .. } => vec![query.trim().to_string()],
        Resource::View {
            database,
            name,
            query,
        } => match dialect {
            Dialect::MySql => vec![format!("CREATE OR REPLACE VIEW {name} AS {}", query.trim())],
            Dialect::Sqlite => {
                let view = qualified(dialect, database, name);
                vec![
                    format!("DROP VIEW IF EXISTS {view}"),
                    format!("CREATE VIEW {view} AS {}", query.trim()),
                ]
            }
        },
    };
    Ok(ddl)
}

fn drop_ddl(dialect: Dialect, resource: &Resource) -> Result<Vec<String>, BuildError> {
    let ddl = match resource {
        Resource::RowSet(_) | Resource::Repository { .. } => Vec::new(),
        Resource::Database { name } => match dialect {
            Dialect::MySql => vec![format!("DROP DATABASE {name}")],
            Dialect::Sqlite => return Err(unsupported(dialect, "databases")),
        },
        Resource::Table { database, name, .. } => {
            vec![format!("DROP TABLE {}", qualified(dialect, database, name))]
        }
        Resource::View { database, name, .. } => {
            vec![format!("DROP VIEW {}", qualified(dialect, database, name))]
        }
    };
    Ok(ddl)
}

fn unsupported(dialect: Dialect, feature: &'static str) -> BuildError {
    BuildError::Unsupported {
        dialect: dialect.name(),
        feature,
    }
}
