//! Creating and removing Dolt repositories on disk.

use std::fs;

use tracing::info;

use crate::error::{DoltError, Result};
use crate::process::DoltCli;

/// Name of the metadata directory `dolt init` creates.
pub const DOLT_DIR: &str = ".dolt";

impl DoltCli {
    /// Whether [`dir`](Self::dir) already holds a Dolt repository.
    pub fn is_repository(&self) -> bool {
        self.dir().join(DOLT_DIR).is_dir()
    }

    /// Creates [`dir`](Self::dir) if needed and runs
    /// `dolt init --name <name> --email <email>` inside it.
    ///
    /// # Errors
    ///
    /// Returns [`DoltError::Io`] if the directory cannot be created, or the
    /// failure of the `dolt init` invocation (which refuses to re-initialize
    /// an existing repository).
    pub fn init(&self, name: &str, email: &str) -> Result<()> {
        fs::create_dir_all(self.dir()).map_err(|source| DoltError::Io {
            path: self.dir().to_path_buf(),
            source,
        })?;
        self.run(vec![
            "init".into(),
            "--name".into(),
            name.into(),
            "--email".into(),
            email.into(),
        ])?;
        info!(dir = %self.dir().display(), "initialized dolt repository");
        Ok(())
    }

    /// Deletes the repository metadata, then the directory itself.
    ///
    /// The directory must be empty once `.dolt` is gone; anything else left
    /// in it is not touched and the removal fails.
    ///
    /// # Errors
    ///
    /// Returns [`DoltError::Io`] naming the path that could not be removed.
    pub fn remove_repository(&self) -> Result<()> {
        let metadata = self.dir().join(DOLT_DIR);
        fs::remove_dir_all(&metadata).map_err(|source| DoltError::Io {
            path: metadata.clone(),
            source,
        })?;
        fs::remove_dir(self.dir()).map_err(|source| DoltError::Io {
            path: self.dir().to_path_buf(),
            source,
        })?;
        info!(dir = %self.dir().display(), "removed dolt repository");
        Ok(())
    }
}
