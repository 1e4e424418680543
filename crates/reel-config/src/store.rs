//! Relational store configuration.

use serde::{Deserialize, Serialize};

/// Default store location.
fn default_uri() -> String {
    String::from("duckdb://reel.duckdb")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Connection URI: `duckdb://<path>`, `duckdb::memory:`, `:memory:`, or a bare path.
    #[serde(default = "default_uri")]
    pub uri: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { uri: default_uri() }
    }
}

impl StoreConfig {
    /// Check if the URI has a usable value.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.uri.trim().is_empty()
    }
}
