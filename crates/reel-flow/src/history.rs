//! Append-only run history.
//!
//! Each finished run is appended as one JSON line to a history file, usually
//! `<output_dir>/run_history.jsonl`. Appends are per-line, so a crash mid-run
//! never corrupts earlier entries.

use std::path::{Path, PathBuf};

use crate::error::FlowError;
use crate::report::RunReport;

/// File name used for run history inside an output directory.
pub const HISTORY_FILE: &str = "run_history.jsonl";

/// Reads and appends [`RunReport`] records in a JSONL file.
#[derive(Debug, Clone)]
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// History stored as [`HISTORY_FILE`] inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(HISTORY_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one report, creating the file and its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::History`] if the directory or file cannot be written.
    pub fn append(&self, report: &RunReport) -> Result<(), FlowError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        serde_jsonlines::append_json_lines(&self.path, [report])?;
        tracing::debug!(path = %self.path.display(), run = %report.run_id, "run recorded");
        Ok(())
    }

    /// Every recorded run, oldest first. A missing file is an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::History`] if the file exists but cannot be read or
    /// a line is not a valid report.
    pub fn load(&self) -> Result<Vec<RunReport>, FlowError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reports = serde_jsonlines::json_lines(&self.path)?.collect::<Result<Vec<_>, _>>()?;
        Ok(reports)
    }

    /// The `limit` most recent runs, newest first.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn recent(&self, limit: usize) -> Result<Vec<RunReport>, FlowError> {
        let mut reports = self.load()?;
        reports.reverse();
        reports.truncate(limit);
        Ok(reports)
    }
}
