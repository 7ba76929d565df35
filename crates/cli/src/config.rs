use anyhow::{Context, Result};
use common::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use transport::{load_config_file, TaskReceiverConfig};

/// Everything the worker process reads at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub logging: LoggingConfig,
    pub receiver: TaskReceiverConfig,
}

impl WorkerConfig {
    /// Defaults, then `path` if given, then `DISPATCH_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_config_file::<WorkerConfig>(path)?,
            None => WorkerConfig::default(),
        };
        config.receiver = config
            .receiver
            .with_env_overrides()
            .context("Invalid receiver configuration")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }
}
