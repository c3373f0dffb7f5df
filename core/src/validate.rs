//! Row-set validation.
//!
//! Checks the structural invariants a [`RowSet`] must satisfy before any
//! statement is rendered from it: non-empty identifiers, a unique, non-empty
//! column list containing the unique column, and row tuples whose length
//! matches the column list.
//!
//! # Examples
//!
//! ```
//! use rowsync_core::*;
//!
//! let set = RowSet::new("app", "people", "id", ["id", "name"]).with_row("1", ["1", "Alice"]);
//! assert!(validate_row_set(&set).is_ok());
//!
//! // Row with a missing value
//! let bad = RowSet::new("app", "people", "id", ["id", "name"]).with_row("1", ["1"]);
//! assert!(matches!(validate_row_set(&bad), Err(BuildError::RowArity { .. })));
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::RowSet;

/// A model that cannot be rendered into statements.
///
/// Raised before anything is sent to the store; a call that fails with a
/// `BuildError` has no effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A required identifier is empty or whitespace-only.
    #[error("{0} cannot be empty")]
    EmptyIdentifier(&'static str),
    /// The column list is empty.
    #[error("row set must declare at least one column")]
    NoColumns,
    /// The same column appears twice in the column list.
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    /// The unique column is not part of the column list.
    #[error("unique column '{0}' is not listed in columns")]
    UniqueColumnMissing(String),
    /// A row tuple does not have one value per column.
    #[error("row '{key}' has {actual} value(s), expected {expected}")]
    RowArity {
        /// Key of the offending row.
        key: String,
        /// Number of declared columns.
        expected: usize,
        /// Number of values in the row.
        actual: usize,
    },
    /// Desired and previous state describe different tables or keys.
    #[error("row set identity changed from {previous} to {desired}")]
    IdentityChanged {
        /// Identity of the previously applied set.
        previous: String,
        /// Identity of the desired set.
        desired: String,
    },
    /// The selected dialect cannot express the requested statement.
    #[error("{dialect} dialect does not support {feature}")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// Statement family that was requested.
        feature: &'static str,
    },
}

/// Validates a row set that is about to be written.
///
/// Returns the first problem found.
pub fn validate_row_set(set: &RowSet) -> Result<(), BuildError> {
    validate_identity(set)?;

    if set.columns.is_empty() {
        return Err(BuildError::NoColumns);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for column in &set.columns {
        if column.trim().is_empty() {
            return Err(BuildError::EmptyIdentifier("column"));
        }
        if !seen.insert(column.as_str()) {
            return Err(BuildError::DuplicateColumn(column.clone()));
        }
    }

    if !seen.contains(set.unique_column.as_str()) {
        return Err(BuildError::UniqueColumnMissing(set.unique_column.clone()));
    }

    for (key, values) in &set.rows {
        if values.len() != set.columns.len() {
            return Err(BuildError::RowArity {
                key: key.clone(),
                expected: set.columns.len(),
                actual: values.len(),
            });
        }
    }

    Ok(())
}

/// Validates only the identifier fields of a row set.
///
/// Used for previously applied state during teardown, where only the keys
/// and the identity matter.
pub fn validate_identity(set: &RowSet) -> Result<(), BuildError> {
    require_identifier(&set.database, "database")?;
    require_identifier(&set.table, "table")?;
    require_identifier(&set.unique_column, "unique column")
}

pub(crate) fn require_identifier(value: &str, field: &'static str) -> Result<(), BuildError> {
    if value.trim().is_empty() {
        return Err(BuildError::EmptyIdentifier(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> RowSet {
        RowSet::new("app", "people", "id", ["id", "name"])
    }

    #[test]
    fn test_valid_set() {
        let set = people().with_row("1", ["1", "Alice"]);
        assert_eq!(validate_row_set(&set), Ok(()));
    }

    #[test]
    fn test_empty_rows_are_valid() {
        assert_eq!(validate_row_set(&people()), Ok(()));
    }

    #[test]
    fn test_empty_database() {
        let set = RowSet::new(" ", "people", "id", ["id"]);
        assert_eq!(
            validate_row_set(&set),
            Err(BuildError::EmptyIdentifier("database"))
        );
    }

    #[test]
    fn test_no_columns() {
        let set = RowSet::new("app", "people", "id", Vec::<String>::new());
        assert_eq!(validate_row_set(&set), Err(BuildError::NoColumns));
    }

    #[test]
    fn test_duplicate_column() {
        let set = RowSet::new("app", "people", "id", ["id", "name", "name"]);
        assert_eq!(
            validate_row_set(&set),
            Err(BuildError::DuplicateColumn("name".into()))
        );
    }

    #[test]
    fn test_unique_column_missing() {
        let set = RowSet::new("app", "people", "uuid", ["id", "name"]);
        assert_eq!(
            validate_row_set(&set),
            Err(BuildError::UniqueColumnMissing("uuid".into()))
        );
    }

    #[test]
    fn test_row_arity_mismatch() {
        let set = people()
            .with_row("1", ["1", "Alice"])
            .with_row("2", ["2", "Bob", "extra"]);
        assert_eq!(
            validate_row_set(&set),
            Err(BuildError::RowArity {
                key: "2".into(),
                expected: 2,
                actual: 3,
            })
        );
    }

    #[test]
    fn test_identity_only_ignores_rows() {
        let set = people().with_row("1", ["1"]);
        assert_eq!(validate_identity(&set), Ok(()));
        assert!(validate_row_set(&set).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = BuildError::RowArity {
            key: "7".into(),
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "row '7' has 1 value(s), expected 2");
        assert_eq!(
            BuildError::EmptyIdentifier("table").to_string(),
            "table cannot be empty"
        );
    }
}
