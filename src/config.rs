//! Configuration Management
//!
//! Loads and manages fault-response configuration from TOML files.
//! Configuration includes:
//! - Classifier settings (error-type → category mapping overrides)
//! - Recovery settings (strategy timeouts, retry backoff, escalation age)
//! - Detector/predictor/forecaster thresholds
//! - Store retention and batch-sweep scheduling
//!
//! The configuration object is built once at startup, validated, and passed
//! into components at construction time. Nothing here is globally mutable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::classifier::ErrorCategory;
use crate::errors::RemedianError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemedianConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub predictor: PredictorConfig,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl RemedianConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints. Unknown names and out-of-range
    /// thresholds fail closed here rather than misbehaving at runtime.
    pub fn validate(&self) -> Result<()> {
        for (error_type, category) in &self.classifier.category_overrides {
            if ErrorCategory::from_name(category).is_none() {
                return Err(RemedianError::Config(format!(
                    "classifier override for '{}' names unknown category '{}'",
                    error_type, category
                ))
                .into());
            }
        }
        if self.detector.scorer != "statistical" {
            return Err(RemedianError::Config(format!(
                "unknown anomaly scorer '{}'",
                self.detector.scorer
            ))
            .into());
        }
        if self.detector.z_threshold <= 0.0 {
            return Err(
                RemedianError::Config("detector.z_threshold must be positive".into()).into(),
            );
        }
        if !(0.0..=1.0).contains(&self.detector.anomaly_threshold) {
            return Err(RemedianError::Config(
                "detector.anomaly_threshold must be within [0, 1]".into(),
            )
            .into());
        }
        if !(0.0..=1.0).contains(&self.predictor.alert_threshold) {
            return Err(RemedianError::Config(
                "predictor.alert_threshold must be within [0, 1]".into(),
            )
            .into());
        }
        if !(0.0..1.0).contains(&self.forecast.alpha) || self.forecast.alpha == 0.0 {
            return Err(RemedianError::Config(
                "forecast.alpha must be within (0, 1)".into(),
            )
            .into());
        }
        if self.recovery.retry_max_attempts == 0 {
            return Err(RemedianError::Config(
                "recovery.retry_max_attempts must be at least 1".into(),
            )
            .into());
        }
        Ok(())
    }
}

/// Classifier settings. The built-in error-type table can be extended (or
/// re-pointed) per deployment; override values are category names validated
/// at load time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Raw `error_type` string → category name ("resource_exhaustion",
    /// "timeout", "connectivity", "validation", "logic").
    #[serde(default)]
    pub category_overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Hard cap on a single strategy attempt. On expiry the attempt is marked
    /// failed and the chain advances.
    #[serde(default = "default_strategy_timeout_secs")]
    pub strategy_timeout_secs: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Unresolved events older than this are re-escalated one severity tier up.
    #[serde(default = "default_escalation_age_secs")]
    pub escalation_age_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_secs: default_strategy_timeout_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            escalation_age_secs: default_escalation_age_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Scoring implementation. "statistical" is the only built-in today; the
    /// seam exists so a learned scorer can be swapped in via configuration.
    #[serde(default = "default_scorer")]
    pub scorer: String,
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    /// Relative short-vs-long window deviation (percent) for the trend test.
    #[serde(default = "default_trend_deviation_pct")]
    pub trend_deviation_pct: f64,
    /// Combined score at/above which a sample is an anomaly and persisted.
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    /// Minimum history before the detector scores at all; below this it
    /// returns nothing rather than erroring.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scorer: default_scorer(),
            z_threshold: default_z_threshold(),
            trend_deviation_pct: default_trend_deviation_pct(),
            anomaly_threshold: default_anomaly_threshold(),
            short_window: default_short_window(),
            min_samples: default_min_samples(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Predictions below this probability are suppressed.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    /// Event history window feeding feature extraction.
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: i64,
    /// Sample count at which confidence reaches 0.5; confidence saturates
    /// toward 1.0 as n grows (n / (n + k)).
    #[serde(default = "default_confidence_saturation")]
    pub confidence_saturation: u32,
    /// Trend slope (events/min per minute) that saturates the slope signal.
    /// 0.02 means the per-minute error rate growing by ~1.2/min every hour.
    #[serde(default = "default_slope_scale")]
    pub slope_scale: f64,
    /// Base rate (events/min) that saturates the base-rate signal.
    #[serde(default = "default_base_rate_scale")]
    pub base_rate_scale: f64,
    /// p95 response time (ms) that saturates the load signal.
    #[serde(default = "default_load_scale_ms")]
    pub load_scale_ms: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            lookback_minutes: default_lookback_minutes(),
            confidence_saturation: default_confidence_saturation(),
            slope_scale: default_slope_scale(),
            base_rate_scale: default_base_rate_scale(),
            load_scale_ms: default_load_scale_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Exponential smoothing constant.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_horizon_steps")]
    pub horizon_steps: usize,
    /// Seconds between forecast steps.
    #[serde(default = "default_step_secs")]
    pub step_secs: i64,
    /// Width multiplier for confidence intervals (z for ~95% coverage).
    #[serde(default = "default_ci_z")]
    pub ci_z: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            horizon_steps: default_horizon_steps(),
            step_secs: default_step_secs(),
            ci_z: default_ci_z(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Open anomalies for the same (service, metric) within this window are
    /// treated as the same detection; re-runs do not duplicate them.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: i64,
    /// Probability at/above which a preventive action is critical priority.
    #[serde(default = "default_critical_probability")]
    pub critical_probability: f64,
    /// Root-cause candidates surfaced per anomaly.
    #[serde(default = "default_root_cause_top_k")]
    pub root_cause_top_k: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            critical_probability: default_critical_probability(),
            root_cause_top_k: default_root_cause_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Per-collection retention cap; oldest records are dropped first.
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,
    /// Samples retained per (service, metric) series.
    #[serde(default = "default_metric_capacity")]
    pub metric_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_cap: default_retention_cap(),
            metric_capacity: default_metric_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_strategy_timeout_secs() -> u64 {
    30
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    100
}
fn default_retry_max_delay_ms() -> u64 {
    5_000
}
fn default_escalation_age_secs() -> u64 {
    300
}
fn default_scorer() -> String {
    "statistical".to_string()
}
fn default_z_threshold() -> f64 {
    2.5
}
fn default_trend_deviation_pct() -> f64 {
    50.0
}
fn default_anomaly_threshold() -> f64 {
    0.7
}
fn default_short_window() -> usize {
    6
}
fn default_min_samples() -> usize {
    4
}
fn default_alert_threshold() -> f64 {
    0.70
}
fn default_lookback_minutes() -> i64 {
    240
}
fn default_confidence_saturation() -> u32 {
    20
}
fn default_slope_scale() -> f64 {
    0.02
}
fn default_base_rate_scale() -> f64 {
    1.0
}
fn default_load_scale_ms() -> f64 {
    2_000.0
}
fn default_alpha() -> f64 {
    0.3
}
fn default_horizon_steps() -> usize {
    24
}
fn default_step_secs() -> i64 {
    3_600
}
fn default_ci_z() -> f64 {
    1.96
}
fn default_dedup_window_secs() -> i64 {
    3_600
}
fn default_critical_probability() -> f64 {
    0.9
}
fn default_root_cause_top_k() -> usize {
    3
}
fn default_retention_cap() -> usize {
    4_096
}
fn default_metric_capacity() -> usize {
    1_024
}
fn default_sweep_interval_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = RemedianConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detector.z_threshold, 2.5);
        assert_eq!(config.predictor.alert_threshold, 0.70);
        assert_eq!(config.forecast.alpha, 0.3);
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[detector]
z_threshold = 3.0
anomaly_threshold = 0.5

[classifier.category_overrides]
"RedisEvictionError" = "resource_exhaustion"
"#
        )
        .unwrap();

        let config = RemedianConfig::load(file.path()).unwrap();
        assert_eq!(config.detector.z_threshold, 3.0);
        assert_eq!(config.detector.anomaly_threshold, 0.5);
        // Untouched sections keep defaults
        assert_eq!(config.recovery.retry_max_attempts, 3);
    }

    #[test]
    fn test_unknown_category_fails_closed() {
        let mut config = RemedianConfig::default();
        config
            .classifier
            .category_overrides
            .insert("FooError".to_string(), "not_a_category".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not_a_category"));
    }

    #[test]
    fn test_out_of_range_thresholds_rejected() {
        let mut config = RemedianConfig::default();
        config.detector.anomaly_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = RemedianConfig::default();
        config.forecast.alpha = 0.0;
        assert!(config.validate().is_err());

        let mut config = RemedianConfig::default();
        config.recovery.retry_max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_contextual_error() {
        let err = RemedianConfig::load(Path::new("/nonexistent/remedian.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
