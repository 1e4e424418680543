//! # reel-config
//!
//! Layered configuration loading for reel using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`REEL_*` prefix, `__` as separator)
//! 2. Project-level `reel.toml` (or an explicit `--config` path)
//! 3. User-level `~/.config/reel/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `REEL_STORE__URI` -> `store.uri`, `REEL_RETRY__DELAY_SECS` -> `retry.delay_secs`, etc.
//! The `__` (double underscore) separates nested config sections.
//!
//! # Usage
//!
//! ```no_run
//! use reel_config::ReelConfig;
//!
//! let config = ReelConfig::load_with_dotenv().expect("config");
//! println!("store: {}", config.store.uri);
//! ```

mod analysis;
mod error;
mod paths;
mod retry;
mod schedule;
mod store;

pub use analysis::AnalysisConfig;
pub use error::ConfigError;
pub use paths::PathsConfig;
pub use retry::{ResolvedRetry, RetryConfig, RetryOverride};
pub use schedule::ScheduleConfig;
pub use store::StoreConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the project-local config file.
pub const LOCAL_CONFIG_FILE: &str = "reel.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReelConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl ReelConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] if you need `.env` file loading.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Figment`] if a source cannot be parsed, or
    /// [`ConfigError::InvalidValue`] if the merged values are unusable.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment())
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Load configuration using an explicit project config file instead of `reel.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if `path` does not exist, otherwise see [`Self::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.display().to_string()));
        }
        let _ = dotenvy::dotenv();
        Self::from_figment(&Self::figment_with_local(path))
    }

    /// Build the figment provider chain with the default project-local file.
    ///
    /// This is public so tests can inspect the figment directly or add
    /// additional providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        Self::figment_with_local(Path::new(LOCAL_CONFIG_FILE))
    }

    fn figment_with_local(local_path: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(global_path));
        }

        // Layer 2: Project-local config
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Environment variables (highest priority)
        figment.merge(Env::prefixed("REEL_").split("__"))
    }

    fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no run could succeed with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.store.is_configured() {
            return Err(ConfigError::InvalidValue {
                field: "store.uri".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.paths.temp_suffix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "paths.temp_suffix".into(),
                reason: "an empty suffix would match every file".into(),
            });
        }
        if self.analysis.top_n == 0 {
            return Err(ConfigError::InvalidValue {
                field: "analysis.top_n".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("reel").join("config.toml"))
    }
}
