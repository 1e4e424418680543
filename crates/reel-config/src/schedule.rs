//! Schedule metadata handed to the external scheduler.

use serde::{Deserialize, Serialize};

fn default_cadence() -> String {
    String::from("@daily")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Cadence expression understood by the external trigger.
    #[serde(default = "default_cadence")]
    pub cadence: String,

    /// Whether missed periods are backfilled. reel itself only runs once per invocation.
    #[serde(default)]
    pub catchup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cadence: default_cadence(),
            catchup: false,
        }
    }
}
