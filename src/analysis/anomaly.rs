//! Anomaly detection over rolling metric windows.
//!
//! Two complementary tests, combined by taking the maximum normalized score:
//!
//! - **z-score** - the newest sample against the window's mean and standard
//!   deviation; anomalous past a configured multiple (default 2.5σ). The raw
//!   statistic maps to a score via `min(z / 4, 1)`, so 4σ and beyond saturate.
//! - **trend deviation** - the mean of a short recent window against the
//!   longer window's mean; flagged when the relative deviation exceeds a
//!   percentage threshold (default 50%). Score is `min(|dev| / (2·threshold), 1)`,
//!   so a doubled deviation saturates.
//!
//! Both mappings are monotonic in the raw statistic and clamped to [0, 1].
//! Only samples scoring at or above the configured anomaly threshold produce
//! records; everything below is silence, not an error. The hypothesis
//! attached to a record comes from keyword association rules over the metric
//! name, not from inference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DetectorConfig;
use crate::errors::{AnalysisError, Result};
use crate::event::{MetricSample, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    Drop,
    TrendChange,
    PatternDeviation,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spike => "spike",
            Self::Drop => "drop",
            Self::TrendChange => "trend_change",
            Self::PatternDeviation => "pattern_deviation",
        }
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted anomaly. Mutated only by acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub id: Uuid,
    pub service: String,
    pub metric_name: String,
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    pub severity_level: Severity,
    pub anomaly_type: AnomalyType,
    pub detected_at: DateTime<Utc>,
    pub root_cause_hypothesis: Option<String>,
    pub acknowledged: bool,
    // Audit detail
    pub expected_value: f64,
    pub observed_value: f64,
    pub deviation_percent: f64,
}

/// Raw output of a scorer before thresholding and persistence.
#[derive(Debug, Clone, Copy)]
pub struct RawScore {
    pub score: f64,
    pub anomaly_type: AnomalyType,
    pub expected: f64,
    pub observed: f64,
    pub deviation_percent: f64,
}

/// Scoring seam. The statistical implementation ships today; a learned one
/// can replace it via configuration without touching the detector.
pub trait AnomalyScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score the candidate sample against its preceding window. `None` means
    /// nothing unusual (or not enough signal to say).
    fn score(&self, history: &[f64], candidate: f64) -> Option<RawScore>;
}

/// z-score + trend-deviation scorer.
pub struct StatisticalScorer {
    z_threshold: f64,
    trend_deviation_pct: f64,
    short_window: usize,
}

impl StatisticalScorer {
    pub fn new(z_threshold: f64, trend_deviation_pct: f64, short_window: usize) -> Self {
        Self {
            z_threshold,
            trend_deviation_pct,
            short_window: short_window.max(2),
        }
    }

    fn z_test(&self, history: &[f64], candidate: f64) -> Option<RawScore> {
        let mean = mean(history);
        let std = std_dev(history, mean);

        let z = if std > 0.0 {
            (candidate - mean).abs() / std
        } else if (candidate - mean).abs() > f64::EPSILON {
            // Flat history then a different value: infinitely surprising.
            f64::INFINITY
        } else {
            0.0
        };

        if z <= self.z_threshold {
            return None;
        }

        let deviation_percent = if mean.abs() > f64::EPSILON {
            (candidate - mean) / mean * 100.0
        } else {
            0.0
        };

        Some(RawScore {
            score: (z / 4.0).min(1.0),
            anomaly_type: if candidate >= mean {
                AnomalyType::Spike
            } else {
                AnomalyType::Drop
            },
            expected: mean,
            observed: candidate,
            deviation_percent,
        })
    }

    fn trend_test(&self, history: &[f64], candidate: f64) -> Option<RawScore> {
        if history.len() < self.short_window {
            return None;
        }
        let long_mean = mean(history);
        if long_mean.abs() <= f64::EPSILON {
            return None;
        }

        // Short window: the most recent samples including the candidate.
        let tail_len = self.short_window - 1;
        let tail = &history[history.len() - tail_len..];
        let short_mean =
            (tail.iter().sum::<f64>() + candidate) / (tail_len as f64 + 1.0);

        let deviation_percent = (short_mean - long_mean) / long_mean * 100.0;
        if deviation_percent.abs() <= self.trend_deviation_pct {
            return None;
        }

        Some(RawScore {
            score: (deviation_percent.abs() / (self.trend_deviation_pct * 2.0)).min(1.0),
            anomaly_type: AnomalyType::TrendChange,
            expected: long_mean,
            observed: short_mean,
            deviation_percent,
        })
    }
}

impl AnomalyScorer for StatisticalScorer {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn score(&self, history: &[f64], candidate: f64) -> Option<RawScore> {
        let z = self.z_test(history, candidate);
        let trend = self.trend_test(history, candidate);
        match (z, trend) {
            (Some(a), Some(b)) => Some(if a.score >= b.score { a } else { b }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

/// Computes anomaly scores for metric windows and emits tiered records.
pub struct AnomalyDetector {
    config: DetectorConfig,
    scorer: Box<dyn AnomalyScorer>,
}

impl AnomalyDetector {
    /// Build with the scorer named in the config.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let scorer: Box<dyn AnomalyScorer> = match config.scorer.as_str() {
            "statistical" => Box::new(StatisticalScorer::new(
                config.z_threshold,
                config.trend_deviation_pct,
                config.short_window,
            )),
            other => {
                return Err(AnalysisError::UnknownScorer(other.to_string()).into());
            }
        };
        Ok(Self { config, scorer })
    }

    pub fn with_scorer(config: DetectorConfig, scorer: Box<dyn AnomalyScorer>) -> Self {
        Self { config, scorer }
    }

    /// Evaluate the newest sample of a window. Returns a record only when the
    /// combined score clears the configured anomaly threshold; with fewer
    /// than `min_samples` of history this is always `None`.
    pub fn detect(
        &self,
        service: &str,
        metric_name: &str,
        samples: &[MetricSample],
    ) -> Option<AnomalyRecord> {
        if samples.len() < self.config.min_samples + 1 {
            return None;
        }
        let (candidate, history) = samples.split_last()?;
        let values: Vec<f64> = history.iter().map(|s| s.value).collect();

        let raw = self.scorer.score(&values, candidate.value)?;
        if raw.score < self.config.anomaly_threshold {
            return None;
        }

        Some(self.build_record(service, metric_name, candidate.at, raw))
    }

    /// Flag an error-type mix that has drifted from its historical share:
    /// the current ratio at least doubling the expected one is a pattern
    /// deviation (fixed 0.7 score, like the other association rules).
    pub fn detect_pattern_shift(
        &self,
        service: &str,
        error_type: &str,
        expected_ratio: f64,
        actual_ratio: f64,
        at: DateTime<Utc>,
    ) -> Option<AnomalyRecord> {
        if expected_ratio <= 0.0 || actual_ratio < expected_ratio * 2.0 {
            return None;
        }
        let raw = RawScore {
            score: 0.7,
            anomaly_type: AnomalyType::PatternDeviation,
            expected: expected_ratio,
            observed: actual_ratio,
            deviation_percent: (actual_ratio - expected_ratio) / expected_ratio * 100.0,
        };
        if raw.score < self.config.anomaly_threshold {
            return None;
        }
        let mut record = self.build_record(service, &format!("error_type:{error_type}"), at, raw);
        record.root_cause_hypothesis =
            Some(format!("{error_type} share shifted from its historical pattern"));
        Some(record)
    }

    fn build_record(
        &self,
        service: &str,
        metric_name: &str,
        detected_at: DateTime<Utc>,
        raw: RawScore,
    ) -> AnomalyRecord {
        AnomalyRecord {
            id: Uuid::new_v4(),
            service: service.to_string(),
            metric_name: metric_name.to_string(),
            anomaly_score: raw.score,
            is_anomaly: raw.score >= self.config.anomaly_threshold,
            severity_level: severity_for_score(raw.score),
            anomaly_type: raw.anomaly_type,
            detected_at,
            root_cause_hypothesis: hypothesis_for(metric_name, raw.anomaly_type),
            acknowledged: false,
            expected_value: raw.expected,
            observed_value: raw.observed,
            deviation_percent: raw.deviation_percent,
        }
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }
}

/// Severity tiers over the combined score. Monotone: a higher score never
/// yields a lower tier.
pub fn severity_for_score(score: f64) -> Severity {
    if score >= 0.85 {
        Severity::Critical
    } else if score >= 0.7 {
        Severity::High
    } else if score >= 0.5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Keyword association rules for the hypothesis field. Not inference.
fn hypothesis_for(metric_name: &str, anomaly_type: AnomalyType) -> Option<String> {
    let metric = metric_name.to_lowercase();
    let text = match anomaly_type {
        AnomalyType::Spike if metric.contains("response_time") || metric.contains("latency") => {
            "possible database slowdown or load increase"
        }
        AnomalyType::Spike if metric.contains("error") => {
            "error burst; possible dependency failure or recent deploy"
        }
        AnomalyType::Drop if metric.contains("request") || metric.contains("throughput") => {
            "possible upstream outage or traffic routing change"
        }
        // No association rule for this metric; the orchestrator may fill the
        // hypothesis from the resolved-incident library instead.
        AnomalyType::Spike | AnomalyType::Drop => return None,
        AnomalyType::TrendChange => {
            "sustained workload shift; review capacity and recent configuration changes"
        }
        AnomalyType::PatternDeviation => return None,
    };
    Some(text.to_string())
}


pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
