//! Declarative manifest of the resources a store should contain.
//!
//! Manifests are YAML (or JSON, chosen by file extension). Resource names are
//! the manifest keys; they pair declared resources with entries of the state
//! file across runs.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1"
//! commit:
//!   message: "sync reference data"
//!   author_name: "Ops Bot"
//!   author_email: "ops@example.com"
//! resources:
//!   people_table:
//!     kind: table
//!     database: app
//!     name: people
//!     query: "CREATE TABLE people (id VARCHAR(16) PRIMARY KEY, name VARCHAR(64))"
//!   people:
//!     kind: row_set
//!     database: app
//!     table: people
//!     unique_column: id
//!     columns: [id, name]
//!     rows:
//!       "1": ["1", "Alice"]
//!       "2": ["2", "Bob"]
//! ```
//!
//! Row keys and values are strings; quote them in YAML so numbers are not
//! parsed as integers.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::Path;

use rowsync_core::{BuildError, CommitInfo, Resource};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Manifest format version this crate reads.
pub const MANIFEST_VERSION: &str = "1";

fn default_version() -> String {
    MANIFEST_VERSION.to_string()
}

/// Declared resources plus optional commit metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Version commit recorded after each applied change (Dolt only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitInfo>,
    /// Declared resources keyed by name.
    #[serde(default)]
    pub resources: BTreeMap<String, Resource>,
}

/// Serialization format, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// Detects the format of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnsupportedFormat`] for anything other than
    /// `.yaml`, `.yml` or `.json`.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            _ => Err(StateError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

impl Manifest {
    /// Loads a manifest, choosing YAML or JSON by extension.
    ///
    /// # Errors
    ///
    /// Returns an I/O or parse error, [`StateError::UnsupportedFormat`] for an
    /// unknown extension, or [`StateError::InvalidManifest`] for an
    /// unsupported `version`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;
        let reader = BufReader::new(std::fs::File::open(path)?);
        let manifest: Self = match format {
            Format::Yaml => serde_yaml::from_reader(reader)?,
            Format::Json => serde_json::from_reader(reader)?,
        };
        manifest.check_version()?;
        Ok(manifest)
    }

    /// Parses a manifest from YAML text.
    ///
    /// # Errors
    ///
    /// See [`Manifest::load`].
    pub fn from_yaml(text: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(text)?;
        manifest.check_version()?;
        Ok(manifest)
    }

    fn check_version(&self) -> Result<()> {
        if self.version != MANIFEST_VERSION {
            return Err(StateError::InvalidManifest(format!(
                "unsupported version '{}' (expected '{MANIFEST_VERSION}')",
                self.version
            )));
        }
        Ok(())
    }

    /// Checks every resource can be rendered.
    ///
    /// Returns one `(name, error)` pair per invalid resource, in name order.
    /// An empty vector means the manifest is valid.
    pub fn validate(&self) -> Vec<(String, BuildError)> {
        self.resources
            .iter()
            .filter_map(|(name, resource)| resource.validate().err().map(|e| (name.clone(), e)))
            .collect()
    }

    /// Number of declared resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
