//! Filesystem locations used by the pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_input_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_temp_suffix() -> String {
    String::from(".tmp")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory holding `movies.csv` and `ratings.csv`.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Directory receiving analysis artifacts and the run history.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Scratch directory reset to empty by filesystem cleanup.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Suffix of leftover temporary files removed from `input_dir`.
    #[serde(default = "default_temp_suffix")]
    pub temp_suffix: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            scratch_dir: default_scratch_dir(),
            temp_suffix: default_temp_suffix(),
        }
    }
}
