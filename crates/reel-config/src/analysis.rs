//! Analysis stage configuration.

use serde::{Deserialize, Serialize};

/// Bars in the rendered chart.
const fn default_top_n() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}
