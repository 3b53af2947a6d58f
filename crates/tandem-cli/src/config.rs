// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scenario parameters.
//!
//! Layered: built-in defaults, then an optional JSON file (`--config` or
//! `TANDEM_CONFIG`), then `TANDEM_*` environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "TANDEM_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{var} must be a non-negative integer, got `{value}`")]
    Env { var: &'static str, value: String },
    #[error("`{field}` must be at least 1")]
    Zero { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    /// Concurrent workers per scenario.
    pub workers: usize,
    /// Increments (or deposits) per worker.
    pub increments: usize,
    /// Buffered channel capacity.
    pub capacity: usize,
    /// Messages pushed through channel scenarios.
    pub messages: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            workers: 100,
            increments: 100,
            capacity: 3,
            messages: 100,
        }
    }
}

impl DemoConfig {
    /// Resolve the effective config. `path` wins over `TANDEM_CONFIG`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        tracing::debug!(?config, "config resolved");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `TANDEM_*` variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&'static str, &mut usize); 4] = [
            ("TANDEM_WORKERS", &mut self.workers),
            ("TANDEM_INCREMENTS", &mut self.increments),
            ("TANDEM_CAPACITY", &mut self.capacity),
            ("TANDEM_MESSAGES", &mut self.messages),
        ];
        for (var, slot) in fields {
            if let Some(value) = lookup(var) {
                let parsed = value.trim().parse::<usize>();
                match parsed {
                    Ok(n) => *slot = n,
                    Err(_) => return Err(ConfigError::Env { var, value }),
                }
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Zero { field: "workers" });
        }
        if self.capacity == 0 {
            return Err(ConfigError::Zero { field: "capacity" });
        }
        Ok(())
    }
}
