//! Runner configuration (TOML).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid runner config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid runner config: {0}")]
    Invalid(String),
}

/// Orchestration settings. The engine's own parameters live in
/// `ratewatch_core::Config`, optionally loaded from `core_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Worker threads for per-symbol work.
    pub workers: usize,
    /// Directory holding one `<SYMBOL>.csv` per symbol.
    pub data_dir: PathBuf,
    /// Symbols to track; empty means every CSV in `data_dir`.
    pub symbols: Vec<String>,
    /// Native candles used to build each ticker before replay starts.
    pub warmup: usize,
    /// Push, roll back and re-push every replay step, failing on any difference.
    pub verify_rollback: bool,
    pub core_config: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            data_dir: PathBuf::from("data"),
            symbols: Vec::new(),
            warmup: 200,
            verify_rollback: false,
            core_config: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be >= 1".into()));
        }
        if self.warmup == 0 {
            return Err(ConfigError::Invalid("warmup must be >= 1".into()));
        }
        Ok(())
    }

    /// Load the engine config named by `core_config`, or the defaults.
    pub fn core(&self) -> Result<ratewatch_core::Config, ratewatch_core::ConfigError> {
        match &self.core_config {
            Some(path) => ratewatch_core::Config::load(path),
            None => Ok(ratewatch_core::Config::default()),
        }
    }
}
