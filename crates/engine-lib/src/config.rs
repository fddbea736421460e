//! Engine settings
//!
//! Every recognized option has a serde default so partial configuration
//! files and environment overrides deserialize cleanly. Call
//! [`EngineSettings::validate`] before building an engine.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tolerance for the weights-sum-to-one check
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Top-level engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.scoring.validate()?;
        self.classifier.validate()?;
        self.registry.validate()
    }
}

/// Bounded per-node sample history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_max_samples() -> usize {
    30
}

fn default_max_age_secs() -> u64 {
    300
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl WindowSettings {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_samples == 0 {
            return Err(ConfigError::Invalid("window.max_samples must be at least 1".into()));
        }
        if self.max_age_secs == 0 {
            return Err(ConfigError::Invalid("window.max_age_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Weights of the four score dimensions; must sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub cpu: f64,
    pub memory: f64,
    pub network: f64,
    pub availability: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            cpu: 0.3,
            memory: 0.3,
            network: 0.2,
            availability: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn as_array(&self) -> [f64; 4] {
        [self.cpu, self.memory, self.network, self.availability]
    }
}

/// Capacity baselines used to normalize raw readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSettings {
    /// Load that counts as fully used (e.g. number of cores)
    #[serde(default = "default_cpu_capacity")]
    pub cpu_capacity: f64,
    /// Latency at or above which the latency component scores zero
    #[serde(default = "default_latency_ceiling_ms")]
    pub network_latency_ceiling_ms: f64,
    /// Throughput (bytes/s) that counts as a saturated link
    #[serde(default = "default_throughput_capacity")]
    pub network_throughput_capacity: f64,
    /// Share of latency in the network score; throughput gets the rest
    #[serde(default = "default_latency_share")]
    pub latency_share: f64,
    #[serde(default)]
    pub weights: ScoreWeights,
}

fn default_cpu_capacity() -> f64 {
    1.0
}

fn default_latency_ceiling_ms() -> f64 {
    500.0
}

fn default_throughput_capacity() -> f64 {
    // 1 Gbit/s
    125_000_000.0
}

fn default_latency_share() -> f64 {
    0.5
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            cpu_capacity: default_cpu_capacity(),
            network_latency_ceiling_ms: default_latency_ceiling_ms(),
            network_throughput_capacity: default_throughput_capacity(),
            latency_share: default_latency_share(),
            weights: ScoreWeights::default(),
        }
    }
}

impl ScoringSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("scoring.cpu_capacity", self.cpu_capacity),
            ("scoring.network_latency_ceiling_ms", self.network_latency_ceiling_ms),
            ("scoring.network_throughput_capacity", self.network_throughput_capacity),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        if !(0.0..=1.0).contains(&self.latency_share) {
            return Err(ConfigError::Invalid(
                "scoring.latency_share must be within [0, 1]".into(),
            ));
        }
        let weights = self.weights.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid("score weights must be non-negative".into()));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::Invalid(format!(
                "score weights must sum to 1, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Classifier thresholds and hysteresis margins
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Boundary between LU and MU
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    /// Boundary between MU and HU
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    /// LU is only left once the score reaches `low_threshold + low_margin`
    #[serde(default = "default_margin")]
    pub low_margin: f64,
    /// HU is only left once the score drops below `high_threshold - high_margin`
    #[serde(default = "default_margin")]
    pub high_margin: f64,
}

fn default_low_threshold() -> f64 {
    0.4
}

fn default_high_threshold() -> f64 {
    0.8
}

fn default_margin() -> f64 {
    0.05
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
            low_margin: default_margin(),
            high_margin: default_margin(),
        }
    }
}

impl ClassifierSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        let Self {
            low_threshold: low,
            high_threshold: high,
            low_margin,
            high_margin,
        } = *self;

        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low >= high {
            return Err(ConfigError::Invalid(format!(
                "classifier thresholds must satisfy 0 <= low < high <= 1, got low={} high={}",
                low, high
            )));
        }
        if !(low_margin >= 0.0) || !(high_margin >= 0.0) {
            return Err(ConfigError::Invalid("classifier margins must be non-negative".into()));
        }
        if low + low_margin > high - high_margin {
            return Err(ConfigError::Invalid(
                "hysteresis bands overlap: low + low_margin must not exceed high - high_margin"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Registry capacity and lifecycle timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Hard limit on tracked nodes; unlimited when absent
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Nodes without samples for this long are flagged stale
    #[serde(default = "default_silence_timeout_secs")]
    pub silence_timeout_secs: u64,
    /// SUNDOWN nodes silent for this long are garbage-collected
    #[serde(default = "default_sundown_retention_secs")]
    pub sundown_retention_secs: u64,
    /// Number of transitions kept in the audit log
    #[serde(default = "default_audit_log_size")]
    pub audit_log_size: usize,
}

fn default_silence_timeout_secs() -> u64 {
    60
}

fn default_sundown_retention_secs() -> u64 {
    600
}

fn default_audit_log_size() -> usize {
    1_000
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            capacity: None,
            silence_timeout_secs: default_silence_timeout_secs(),
            sundown_retention_secs: default_sundown_retention_secs(),
            audit_log_size: default_audit_log_size(),
        }
    }
}

impl RegistrySettings {
    pub fn silence_timeout(&self) -> Duration {
        Duration::from_secs(self.silence_timeout_secs)
    }

    pub fn sundown_retention(&self) -> Duration {
        Duration::from_secs(self.sundown_retention_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == Some(0) {
            return Err(ConfigError::Invalid("registry.capacity must be at least 1".into()));
        }
        if self.silence_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "registry.silence_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
