//! Store handle for tidelog's state workspace.

use crate::core::error::TidelogError;
use std::fs;
use std::path::{Path, PathBuf};

/// Handle to a tidelog state workspace.
///
/// A store is the directory holding the state database and the append-only
/// event logs. All subsystem state (goals, plans, receipts, audit) is
/// scoped to a store; there is exactly one store per project, rooted at
/// `<project>/.tidelog/data/`.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory.
    pub root: PathBuf,
}

impl Store {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, TidelogError> {
        fs::create_dir_all(root).map_err(TidelogError::IoError)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        crate::core::db::tidelog_db_path(&self.root)
    }
}
