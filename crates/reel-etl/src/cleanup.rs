//! Cleanup stages. Both depend only on analysis and are independent of each
//! other.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reel_flow::{Task, TaskContext};
use reel_store::StoreGateway;

use crate::datasets::STAGING_TABLES;
use crate::error::StageError;

/// Drops both staging relations. Absent relations are skipped.
pub struct StorageCleanup {
    store: Arc<StoreGateway>,
}

impl StorageCleanup {
    pub const fn new(store: Arc<StoreGateway>) -> Self {
        Self { store }
    }

    /// Returns the relations that were actually dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::StoreUnavailable`] if a drop fails.
    pub fn clean(&self) -> Result<Vec<String>, StageError> {
        let dropped = self.store.drop_tables_if_exist(&STAGING_TABLES)?;
        tracing::info!(?dropped, "dropped staging tables");
        Ok(dropped)
    }
}

impl Task for StorageCleanup {
    fn run(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
        self.clean()?;
        Ok(())
    }
}

/// Resets the scratch directory and removes leftover temporary files from
/// the input directory.
#[derive(Debug, Clone)]
pub struct FilesystemCleanup {
    pub scratch_dir: PathBuf,
    pub input_dir: PathBuf,
    pub temp_suffix: String,
}

impl FilesystemCleanup {
    /// Returns the temporary files removed from the input directory.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Cleanup`] if a path cannot be removed or the
    /// scratch directory cannot be recreated.
    pub fn clean(&self) -> Result<Vec<PathBuf>, StageError> {
        reset_dir(&self.scratch_dir)?;
        tracing::info!(path = %self.scratch_dir.display(), "reset scratch directory");

        let removed = self.remove_temp_files()?;
        for path in &removed {
            tracing::info!(path = %path.display(), "deleted temporary file");
        }
        Ok(removed)
    }

    fn remove_temp_files(&self) -> Result<Vec<PathBuf>, StageError> {
        let entries = match std::fs::read_dir(&self.input_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(cleanup_error(&self.input_dir, source)),
        };

        let mut removed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| cleanup_error(&self.input_dir, e))?;
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(&self.temp_suffix));
            if !is_temp || !path.is_file() {
                continue;
            }
            std::fs::remove_file(&path).map_err(|e| cleanup_error(&path, e))?;
            removed.push(path);
        }
        removed.sort();
        Ok(removed)
    }
}

impl Task for FilesystemCleanup {
    fn run(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
        self.clean()?;
        Ok(())
    }
}

/// Leave `dir` existing and empty.
fn reset_dir(dir: &Path) -> Result<(), StageError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(cleanup_error(dir, e)),
    }
    std::fs::create_dir_all(dir).map_err(|e| cleanup_error(dir, e))
}

fn cleanup_error(path: &Path, source: std::io::Error) -> StageError {
    StageError::Cleanup {
        path: path.to_path_buf(),
        source,
    }
}
