//! Engine process configuration
//!
//! Sources, later ones overriding earlier ones:
//! - optional file named by `BALANCER_CONFIG` (any format the `config` crate
//!   detects from the extension)
//! - environment variables prefixed `BALANCER_`, nested with `__`, e.g.
//!   `BALANCER_ENGINE__CLASSIFIER__HIGH_MARGIN=0.1`

use anyhow::{Context, Result};
use engine_lib::config::EngineSettings;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "BALANCER_CONFIG";

/// Engine process configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Instance name used in structured log events
    #[serde(default = "default_instance")]
    pub instance: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Interval between maintenance passes in seconds
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    /// Snapshot file; persistence is disabled when unset
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    #[serde(default)]
    pub engine: EngineSettings,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "balancer-engine".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_maintenance_interval() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            api_port: default_api_port(),
            maintenance_interval_secs: default_maintenance_interval(),
            snapshot_path: None,
            engine: EngineSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file)
    }

    pub fn load_from(file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("BALANCER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: EngineConfig = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.maintenance_interval_secs == 0 {
            anyhow::bail!("maintenance_interval_secs must be positive");
        }
        self.engine.validate()?;
        Ok(())
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.maintenance_interval(), Duration::from_secs(10));
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"api_port": 9090, "snapshot_path": "/tmp/balancer.json",
                "engine": {{"classifier": {{"low_threshold": 0.3}}, "registry": {{"capacity": 50}}}}}}"#
        )
        .unwrap();

        let config = EngineConfig::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.api_port, 9090);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/balancer.json")));
        assert_eq!(config.engine.classifier.low_threshold, 0.3);
        assert_eq!(config.engine.classifier.high_threshold, 0.8);
        assert_eq!(config.engine.registry.capacity, Some(50));
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"engine": {{"classifier": {{"low_threshold": 0.9, "high_threshold": 0.5}}}}}}"#
        )
        .unwrap();

        assert!(EngineConfig::load_from(Some(file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = PathBuf::from("/nonexistent/balancer.json");
        assert!(EngineConfig::load_from(Some(missing)).is_err());
    }
}
