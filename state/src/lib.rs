//! Manifests and applied-state files for rowsync.
//!
//! A [`Manifest`] declares the resources a store should contain. A
//! [`StateFile`] records what was last applied, so the next run can pair
//! each declared resource with its previous form and compute the
//! create/update/delete changes with [`rowsync_core::diff_resources`].
//!
//! # Quick start
//!
//! ```
//! use rowsync_core::diff_resources;
//! use rowsync_state::{Manifest, StateFile};
//!
//! let manifest = Manifest::from_yaml(r#"
//! resources:
//!   people:
//!     kind: row_set
//!     database: main
//!     table: people
//!     unique_column: id
//!     columns: [id, name]
//!     rows:
//!       "1": ["1", "Alice"]
//! "#).unwrap();
//! assert!(manifest.validate().is_empty());
//!
//! let state = StateFile::new();
//! let applied = state.applied();
//! let changes = diff_resources(&manifest.resources, &applied);
//! assert_eq!(changes.len(), 1);
//! ```

mod error;
mod manifest;
mod state;

pub use error::{Result, StateError};
pub use manifest::{Format, MANIFEST_VERSION, Manifest};
pub use state::{STATE_VERSION, StateEntry, StateFile, checksum};
