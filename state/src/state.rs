//! Record of resources applied to a store.
//!
//! The state file is what an update or delete reconciles against: the
//! previously applied form of each resource, keyed by the manifest name it
//! was declared under. Every entry carries a SHA-256 checksum of the
//! resource's canonical JSON so hand edits are detected on load.
//!
//! # Examples
//!
//! ```no_run
//! use rowsync_core::{Resource, RowSet};
//! use rowsync_state::StateFile;
//!
//! let mut state = StateFile::load_or_default("rowsync.state.json").unwrap();
//! let people = Resource::RowSet(
//!     RowSet::new("app", "people", "id", ["id"]).with_row("1", ["1"]),
//! );
//! state.record("people", &people, 1).unwrap();
//! state.save("rowsync.state.json").unwrap();
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rowsync_core::Resource;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StateError};

/// State file format version.
pub const STATE_VERSION: &str = "1";

/// One applied resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Resource as it was applied.
    pub resource: Resource,
    /// RFC 3339 timestamp of the apply.
    pub applied_at: String,
    /// SHA-256 hex digest of `resource`'s canonical JSON.
    pub checksum: String,
    /// Rows managed after the apply (0 for non row-set resources).
    pub row_count: usize,
}

/// All resources applied to one store.
///
/// Persisted as pretty-printed JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version.
    pub version: String,
    /// Version of rowsync that last wrote the file.
    pub tool_version: String,
    /// RFC 3339 timestamp of the last change.
    pub updated_at: String,
    /// Applied resources keyed by manifest name.
    #[serde(default)]
    pub resources: BTreeMap<String, StateEntry>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

impl StateFile {
    /// Creates an empty state stamped with this crate's version.
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            updated_at: now_rfc3339(),
            resources: BTreeMap::new(),
        }
    }

    /// Loads a state file and verifies every checksum.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](StateError::IoError) or
    /// [`JsonError`](StateError::JsonError) if the file cannot be read,
    /// [`InvalidState`](StateError::InvalidState) for an unknown format
    /// version, and [`InvalidChecksum`](StateError::InvalidChecksum) naming the first
    /// entry whose resource no longer matches its checksum.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let state: Self = serde_json::from_reader(reader)?;
        if state.version != STATE_VERSION {
            return Err(StateError::InvalidState(format!(
                "unsupported state version '{}'",
                state.version
            )));
        }
        state.verify()?;
        Ok(state)
    }

    /// Loads a state file, or returns an empty state if it does not exist.
    ///
    /// # Errors
    ///
    /// See [`StateFile::load`].
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        Self::load(path)
    }

    /// Writes the state as pretty-printed JSON.
    ///
    /// The file is written next to `path` first and renamed into place, so
    /// an interrupted save never leaves a truncated state file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](StateError::IoError) if the file cannot be
    /// written, or [`JsonError`](StateError::JsonError) if serialization
    /// fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Checks each entry against its recorded checksum.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidChecksum`](StateError::InvalidChecksum) for the first
    /// mismatching entry in name order.
    pub fn verify(&self) -> Result<()> {
        for (name, entry) in &self.resources {
            if checksum(&entry.resource)? != entry.checksum {
                return Err(StateError::InvalidChecksum(name.clone()));
            }
        }
        Ok(())
    }

    /// Records `resource` as applied under `name` and refreshes `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`JsonError`](StateError::JsonError) if the checksum cannot be
    /// computed.
    pub fn record(&mut self, name: &str, resource: &Resource, row_count: usize) -> Result<()> {
        let now = now_rfc3339();
        let entry = StateEntry {
            resource: resource.clone(),
            applied_at: now.clone(),
            checksum: checksum(resource)?,
            row_count,
        };
        self.resources.insert(name.to_string(), entry);
        self.updated_at = now;
        Ok(())
    }

    /// Forgets `name`, returning its entry if it was recorded.
    pub fn remove(&mut self, name: &str) -> Option<StateEntry> {
        let removed = self.resources.remove(name);
        if removed.is_some() {
            self.updated_at = now_rfc3339();
        }
        removed
    }

    /// Looks up an entry.
    pub fn get(&self, name: &str) -> Option<&StateEntry> {
        self.resources.get(name)
    }

    /// Applied resources keyed by name, in the shape
    /// [`rowsync_core::diff_resources`] takes.
    pub fn applied(&self) -> BTreeMap<String, Resource> {
        self.resources
            .iter()
            .map(|(name, entry)| (name.clone(), entry.resource.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// SHA-256 hex digest of a resource's canonical JSON.
///
/// # Errors
///
/// Returns [`JsonError`](StateError::JsonError) if serialization fails.
pub fn checksum(resource: &Resource) -> Result<String> {
    let json = resource.canonical_json()?;
    Ok(format!("{:x}", Sha256::digest(json.as_bytes())))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_core::RowSet;

    fn people(rows: &[&str]) -> Resource {
        let mut set = RowSet::new("app", "people", "id", ["id"]);
        for id in rows {
            set.insert_row(*id, [*id]);
        }
        Resource::RowSet(set)
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        let sum = checksum(&people(&["1"])).unwrap();
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(sum, checksum(&people(&["2"])).unwrap());
    }

    #[test]
    fn test_record_and_remove() {
        let mut state = StateFile::new();
        assert!(state.is_empty());

        state.record("people", &people(&["1", "2"]), 2).unwrap();
        let entry = state.get("people").unwrap();
        assert_eq!(entry.row_count, 2);
        assert_eq!(entry.applied_at, state.updated_at);
        assert!(state.verify().is_ok());

        assert!(state.remove("people").is_some());
        assert!(state.remove("people").is_none());
        assert!(state.is_empty());
    }

    #[test]
    fn test_verify_detects_edited_resource() {
        let mut state = StateFile::new();
        state.record("people", &people(&["1"]), 1).unwrap();
        if let Some(entry) = state.resources.get_mut("people") {
            entry.resource = people(&["1", "2"]);
        }
        let err = state.verify().unwrap_err();
        assert!(matches!(err, StateError::InvalidChecksum(name) if name == "people"));
    }

    #[test]
    fn test_applied_mirrors_entries() {
        let mut state = StateFile::new();
        state.record("b", &people(&["1"]), 1).unwrap();
        state.record("a", &people(&[]), 0).unwrap();
        let applied = state.applied();
        assert_eq!(applied.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(applied["b"], people(&["1"]));
    }

    #[test]
    fn test_unknown_state_version_is_invalid_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let mut state = StateFile::new();
        state.version = "9".to_string();
        std::fs::write(&path, serde_json::to_string(&state).unwrap()).unwrap();

        let err = StateFile::load(&path).unwrap_err();
        assert!(matches!(err, StateError::InvalidState(_)));
        assert_eq!(err.to_string(), "invalid state file: unsupported state version '9'");
    }

    #[test]
    fn test_timestamp_is_rfc3339_utc() {
        let ts = now_rfc3339();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
