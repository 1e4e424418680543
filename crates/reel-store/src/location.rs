//! Store URI parsing.

use std::path::PathBuf;

use crate::StoreError;

const SCHEME: &str = "duckdb://";

/// Where the relational store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Process-local database, discarded when the last connection closes.
    Memory,
    /// File-backed database.
    File(PathBuf),
}

impl StoreLocation {
    /// Parse a connection URI.
    ///
    /// Accepted forms: `:memory:`, `duckdb::memory:`, `duckdb://:memory:`,
    /// `duckdb://<path>`, or a bare filesystem path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidUri`] for empty URIs, empty paths, and
    /// URIs naming another database engine.
    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        let trimmed = uri.trim();
        let invalid = |reason: &str| StoreError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("empty URI"));
        }
        if matches!(trimmed, ":memory:" | "duckdb::memory:" | "duckdb://:memory:") {
            return Ok(Self::Memory);
        }
        if let Some(path) = trimmed.strip_prefix(SCHEME) {
            if path.is_empty() {
                return Err(invalid("missing database path"));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(invalid(&format!("unsupported scheme '{scheme}'")));
        }
        Ok(Self::File(PathBuf::from(trimmed)))
    }
}
