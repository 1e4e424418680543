//! Retry budget configuration.
//!
//! Every task shares the default budget unless `[retry.overrides.<task_id>]`
//! names it explicitly.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_retries() -> u32 {
    1
}

const fn default_delay_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryOverride {
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Retries after the first failed attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Fixed delay between attempts.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    /// Per-task overrides keyed by task id.
    #[serde(default)]
    pub overrides: BTreeMap<String, RetryOverride>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            delay_secs: default_delay_secs(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Effective retry budget for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRetry {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryConfig {
    /// Resolve the budget for `task_id`, applying any override field by field.
    #[must_use]
    pub fn resolve(&self, task_id: &str) -> ResolvedRetry {
        let overrides = self.overrides.get(task_id);
        let retries = overrides
            .and_then(|o| o.retries)
            .unwrap_or(self.retries);
        let delay_secs = overrides
            .and_then(|o| o.delay_secs)
            .unwrap_or(self.delay_secs);
        ResolvedRetry {
            retries,
            delay: Duration::from_secs(delay_secs),
        }
    }
}
