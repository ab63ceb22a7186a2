// src/config.rs

//! Daemon-level configuration: which node this process is, where the model
//! file and the object store live, and process-wide timing tunables. The
//! availability model itself is loaded separately (see `core::loader`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Process-wide timing tunables.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimingConfig {
    /// Default component instantiation timeout when the model leaves it
    /// unset, in milliseconds.
    #[serde(default = "default_clc_timeout_ms")]
    pub clc_timeout_ms: u64,
    /// Interval between reactor housekeeping passes, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            clc_timeout_ms: default_clc_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_clc_timeout_ms() -> u64 {
    10_000
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_model_file() -> String {
    "aegis-model.conf".to_string()
}

fn default_store_file() -> String {
    "aegis-store.json".to_string()
}

/// The daemon configuration, loaded from a TOML file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Name of the node this process represents; must match a node in the
    /// model file.
    pub node_name: String,
    /// Path of the availability model file.
    #[serde(default = "default_model_file")]
    pub model_file: String,
    /// Path of the administrative object store.
    #[serde(default = "default_store_file")]
    pub store_file: String,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Config {
    /// Loads and validates the configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read configuration file '{path}'"))?;
        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse configuration file '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.node_name.is_empty() {
            anyhow::bail!("'node_name' must not be empty");
        }
        if self.timing.tick_interval_ms == 0 {
            anyhow::bail!("'timing.tick_interval_ms' must be positive");
        }
        Ok(())
    }
}
