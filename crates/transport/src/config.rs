//! Receiver configuration
//!
//! Values come from serde defaults, then an optional TOML or JSON file, then
//! `DISPATCH_*` environment variables.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment overrides, e.g. `DISPATCH_REORDER_WAIT_MS`
pub const ENV_PREFIX: &str = "DISPATCH_";

/// Tunables for [`crate::TaskReceiver`] and its driver loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskReceiverConfig {
    /// How long an in-order queue waits for a missing sequence number
    pub reorder_wait_ms: u64,
    /// Driver tick: reorder timeouts and normal-task release
    pub tick_interval_ms: u64,
    /// Name of the thread running normal tasks
    pub main_thread_name: String,
    /// Pending driver commands above which the driver warns
    pub command_buffer_warn: usize,
}

impl Default for TaskReceiverConfig {
    fn default() -> Self {
        Self {
            reorder_wait_ms: 30_000,
            tick_interval_ms: 100,
            main_thread_name: "task-main".to_string(),
            command_buffer_warn: 10_000,
        }
    }
}

impl TaskReceiverConfig {
    pub fn reorder_wait(&self) -> Duration {
        Duration::from_millis(self.reorder_wait_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by full variable name
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("REORDER_WAIT_MS") {
            self.reorder_wait_ms = value
                .parse()
                .with_context(|| format!("Invalid {ENV_PREFIX}REORDER_WAIT_MS: {value}"))?;
        }
        if let Some(value) = var("TICK_INTERVAL_MS") {
            self.tick_interval_ms = value
                .parse()
                .with_context(|| format!("Invalid {ENV_PREFIX}TICK_INTERVAL_MS: {value}"))?;
        }
        if let Some(value) = var("MAIN_THREAD_NAME") {
            self.main_thread_name = value;
        }
        if let Some(value) = var("COMMAND_BUFFER_WARN") {
            self.command_buffer_warn = value
                .parse()
                .with_context(|| format!("Invalid {ENV_PREFIX}COMMAND_BUFFER_WARN: {value}"))?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.main_thread_name.trim().is_empty() {
            bail!("main_thread_name must not be empty");
        }
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

/// Read a config file, picking the format from its extension (`.toml` or `.json`)
pub fn load_config_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&raw)
            .with_context(|| format!("Failed to parse TOML config {}", path.display())),
        Some("json") => serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse JSON config {}", path.display())),
        other => bail!(
            "Unsupported config format {:?} for {}, expected .toml or .json",
            other.unwrap_or(""),
            path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TaskReceiverConfig::default();
        assert_eq!(config.reorder_wait(), Duration::from_secs(30));
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.main_thread_name, "task-main");
    }

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let env: HashMap<&str, &str> = [
            ("DISPATCH_REORDER_WAIT_MS", "250"),
            ("DISPATCH_MAIN_THREAD_NAME", "driver-main"),
        ]
        .into_iter()
        .collect();

        let config = TaskReceiverConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.reorder_wait_ms, 250);
        assert_eq!(config.main_thread_name, "driver-main");
        assert_eq!(config.tick_interval_ms, 100);
    }

    #[test]
    fn test_bad_override_is_reported() {
        let err = TaskReceiverConfig::default()
            .with_overrides(|key| (key == "DISPATCH_TICK_INTERVAL_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("DISPATCH_TICK_INTERVAL_MS"));
    }

    #[test]
    fn test_load_toml_with_partial_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "reorder_wait_ms = 5000").unwrap();

        let config: TaskReceiverConfig = load_config_file(file.path()).unwrap();
        assert_eq!(config.reorder_wait_ms, 5000);
        assert_eq!(config.main_thread_name, "task-main");
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"tick_interval_ms": 20}}"#).unwrap();

        let config: TaskReceiverConfig = load_config_file(file.path()).unwrap();
        assert_eq!(config.tick_interval_ms, 20);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(load_config_file::<TaskReceiverConfig>(file.path()).is_err());
    }
}
