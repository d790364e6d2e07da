//! Error prediction from extracted features.
//!
//! Probability is a documented, deterministic combination of three normalized
//! signals, monotone in each input:
//!
//! ```text
//! probability = min(1.0, 0.5 + 0.35·slope + 0.10·base_rate + 0.05·load)
//! ```
//!
//! where `slope` is the per-minute error-count trend slope clamped by
//! `slope_scale`, `base_rate` is the dominant error type's events/min clamped
//! by `base_rate_scale`, and `load` is the p95 response time clamped by
//! `load_scale_ms`. A non-positive slope means no increasing-risk signal and
//! no prediction. Predictions are emitted only at or above the alert
//! threshold, so lowering the threshold can only add predictions.
//!
//! Confidence is a separate axis - how much history backed the estimate -
//! and saturates with sample count as `n / (n + k)`. A high-probability,
//! low-confidence prediction is still surfaced; downstream consumers see
//! both numbers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::analysis::features::FeatureVector;
use crate::classifier::ErrorCategory;
use crate::config::PredictorConfig;
use crate::event::ErrorEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOutcome {
    Occurred,
    DidNotOccur,
}

/// A forward-looking error estimate. `outcome` is reconciled against actual
/// events once the horizon elapses; until then it is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPrediction {
    pub id: Uuid,
    pub service: String,
    pub predicted_error_type: String,
    pub probability: f64,
    pub confidence: f64,
    pub time_horizon_minutes: i64,
    pub predicted_at: DateTime<Utc>,
    pub recommended_actions: Vec<String>,
    pub contributing_factors: Map<String, Value>,
    pub outcome: Option<PredictionOutcome>,
}

impl ErrorPrediction {
    pub fn horizon_end(&self) -> DateTime<Utc> {
        self.predicted_at + Duration::minutes(self.time_horizon_minutes)
    }
}

pub struct ErrorPredictor {
    config: PredictorConfig,
}

impl ErrorPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self { config }
    }

    /// Predict the next likely error for a service. `category` is the bucket
    /// the dominant error type resolves to; its strategy chain seeds the
    /// recommended actions.
    pub fn predict(
        &self,
        features: &FeatureVector,
        category: ErrorCategory,
        now: DateTime<Utc>,
    ) -> Option<ErrorPrediction> {
        if features.trend_slope <= 0.0 {
            return None;
        }
        let predicted_error_type = features.dominant_error_type.clone()?;

        let slope_norm = clamp01(features.trend_slope / self.config.slope_scale);
        let base_norm = clamp01(features.dominant_rate_per_min / self.config.base_rate_scale);
        let load_norm = clamp01(
            features.response_time_p95.unwrap_or(0.0) / self.config.load_scale_ms,
        );

        let probability =
            (0.5 + 0.35 * slope_norm + 0.10 * base_norm + 0.05 * load_norm).min(1.0);

        if probability < self.config.alert_threshold {
            debug!(
                service = %features.service,
                probability,
                threshold = self.config.alert_threshold,
                "prediction below alert threshold, suppressed"
            );
            return None;
        }

        let k = self.config.confidence_saturation as f64;
        let n = features.sample_count as f64;
        let confidence = n / (n + k);

        let mut contributing_factors = Map::new();
        contributing_factors.insert("trend_slope".to_string(), json!(features.trend_slope));
        contributing_factors.insert("slope_signal".to_string(), json!(slope_norm));
        contributing_factors.insert("base_rate_signal".to_string(), json!(base_norm));
        contributing_factors.insert("load_signal".to_string(), json!(load_norm));
        contributing_factors.insert(
            "error_rate_per_min".to_string(),
            json!(features.error_rate_per_min),
        );

        let mut recommended_actions = vec![format!(
            "increase monitoring for {predicted_error_type} on {}",
            features.service
        )];
        recommended_actions.extend(
            category
                .strategy_chain()
                .iter()
                .map(|s| s.name().to_string()),
        );

        Some(ErrorPrediction {
            id: Uuid::new_v4(),
            service: features.service.clone(),
            predicted_error_type,
            probability,
            confidence,
            time_horizon_minutes: self.horizon_minutes(slope_norm),
            predicted_at: now,
            recommended_actions,
            contributing_factors,
            outcome: None,
        })
    }

    /// Horizon from how fast the trend is projected to cross the alert
    /// threshold: the steeper the slope, the sooner. Bucketed to the
    /// short/medium/long horizons rather than a raw minute count.
    fn horizon_minutes(&self, slope_norm: f64) -> i64 {
        if slope_norm >= 0.75 {
            30
        } else if slope_norm >= 0.35 {
            120
        } else {
            1_440
        }
    }

    /// Reconcile a prediction whose horizon has elapsed. Returns `None`
    /// while the horizon is still open. A horizon that passes without a
    /// matching event is `DidNotOccur` - feedback, not a fault.
    pub fn reconcile(
        &self,
        prediction: &ErrorPrediction,
        events: &[ErrorEvent],
        now: DateTime<Utc>,
    ) -> Option<PredictionOutcome> {
        if prediction.outcome.is_some() {
            return prediction.outcome;
        }
        if now < prediction.horizon_end() {
            return None;
        }

        let matched = events.iter().any(|e| {
            e.service == prediction.service
                && e.error_type == prediction.predicted_error_type
                && e.occurred_at >= prediction.predicted_at
                && e.occurred_at <= prediction.horizon_end()
        });

        Some(if matched {
            PredictionOutcome::Occurred
        } else {
            PredictionOutcome::DidNotOccur
        })
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ErrorEvent;

    fn features(slope: f64, rate: f64, samples: usize) -> FeatureVector {
        FeatureVector {
            service: "checkout".to_string(),
            extracted_at: Utc::now(),
            lookback_minutes: 240,
            sample_count: samples,
            hour_of_day: 14,
            day_of_week: 2,
            trend_slope: slope,
            error_rate_per_min: rate,
            dominant_error_type: Some("DatabaseTimeout".to_string()),
            dominant_ratio: 0.8,
            dominant_rate_per_min: rate,
            critical_ratio: 0.1,
            response_time_p95: Some(900.0),
            response_time_p99: Some(1_500.0),
        }
    }

    fn predictor() -> ErrorPredictor {
        ErrorPredictor::new(PredictorConfig::default())
    }

    #[test]
    fn test_strong_positive_trend_emits_prediction() {
        // Slope saturates the scale; base rate is the scenario's 0.02/min.
        let prediction = predictor()
            .predict(&features(0.03, 0.02, 120), ErrorCategory::Timeout, Utc::now())
            .expect("strong trend must emit");

        assert_eq!(prediction.predicted_error_type, "DatabaseTimeout");
        assert!(prediction.probability >= 0.70);
        assert_eq!(prediction.time_horizon_minutes, 30);
        assert!(prediction.outcome.is_none());
        assert!(prediction
            .recommended_actions
            .iter()
            .any(|a| a == "timeout_increase"));
    }

    #[test]
    fn test_flat_or_falling_trend_never_emits() {
        let p = predictor();
        assert!(p
            .predict(&features(0.0, 5.0, 500), ErrorCategory::Timeout, Utc::now())
            .is_none());
        assert!(p
            .predict(&features(-0.02, 5.0, 500), ErrorCategory::Timeout, Utc::now())
            .is_none());
    }

    #[test]
    fn test_weak_trend_suppressed_by_threshold() {
        // slope_norm 0.2 → probability 0.5 + 0.07 + small < 0.70.
        let prediction = predictor().predict(
            &features(0.004, 0.02, 120),
            ErrorCategory::Timeout,
            Utc::now(),
        );
        assert!(prediction.is_none());
    }

    #[test]
    fn test_lowering_threshold_is_superset() {
        let feature_sets: Vec<FeatureVector> = vec![
            features(0.001, 0.01, 50),
            features(0.003, 0.02, 80),
            features(0.006, 0.10, 120),
            features(0.012, 0.30, 200),
            features(0.030, 0.50, 300),
        ];

        let strict = ErrorPredictor::new(PredictorConfig {
            alert_threshold: 0.80,
            ..PredictorConfig::default()
        });
        let loose = ErrorPredictor::new(PredictorConfig {
            alert_threshold: 0.55,
            ..PredictorConfig::default()
        });

        let now = Utc::now();
        for f in &feature_sets {
            let strict_emit = strict.predict(f, ErrorCategory::Timeout, now).is_some();
            let loose_emit = loose.predict(f, ErrorCategory::Timeout, now).is_some();
            assert!(
                !strict_emit || loose_emit,
                "lower threshold must emit a superset"
            );
        }
    }

    #[test]
    fn test_probability_monotone_in_each_input() {
        let p = predictor();
        let now = Utc::now();

        let base = p
            .predict(&features(0.012, 0.1, 120), ErrorCategory::Timeout, now)
            .unwrap();

        let steeper = p
            .predict(&features(0.016, 0.1, 120), ErrorCategory::Timeout, now)
            .unwrap();
        assert!(steeper.probability > base.probability);

        let busier = p
            .predict(&features(0.012, 0.3, 120), ErrorCategory::Timeout, now)
            .unwrap();
        assert!(busier.probability > base.probability);

        let mut loaded = features(0.012, 0.1, 120);
        loaded.response_time_p95 = Some(1_900.0);
        let loaded = p.predict(&loaded, ErrorCategory::Timeout, now).unwrap();
        assert!(loaded.probability > base.probability);
    }

    #[test]
    fn test_confidence_saturates_with_samples() {
        let p = predictor();
        let now = Utc::now();

        let sparse = p
            .predict(&features(0.03, 0.1, 5), ErrorCategory::Timeout, now)
            .unwrap();
        let dense = p
            .predict(&features(0.03, 0.1, 500), ErrorCategory::Timeout, now)
            .unwrap();

        assert!(sparse.confidence < 0.25);
        assert!(dense.confidence > 0.9);
        assert!(dense.confidence < 1.0);
        // Probability and confidence are independent axes.
        assert!((sparse.probability - dense.probability).abs() < 1e-9);
    }

    #[test]
    fn test_reconcile_waits_for_horizon() {
        let p = predictor();
        let now = Utc::now();
        let prediction = p
            .predict(&features(0.03, 0.1, 120), ErrorCategory::Timeout, now)
            .unwrap();

        assert!(p.reconcile(&prediction, &[], now).is_none());
    }

    #[test]
    fn test_reconcile_occurred_on_matching_event() {
        let p = predictor();
        let now = Utc::now();
        let prediction = p
            .predict(&features(0.03, 0.1, 120), ErrorCategory::Timeout, now)
            .unwrap();

        let hit = ErrorEvent::new("checkout", "DatabaseTimeout", "query timed out")
            .with_occurred_at(now + Duration::minutes(10));
        let after = prediction.horizon_end() + Duration::minutes(1);

        assert_eq!(
            p.reconcile(&prediction, &[hit], after),
            Some(PredictionOutcome::Occurred)
        );
    }

    #[test]
    fn test_reconcile_did_not_occur_without_match() {
        let p = predictor();
        let now = Utc::now();
        let prediction = p
            .predict(&features(0.03, 0.1, 120), ErrorCategory::Timeout, now)
            .unwrap();

        // Wrong type and wrong service both fail to match.
        let miss_type = ErrorEvent::new("checkout", "ValidationError", "bad input")
            .with_occurred_at(now + Duration::minutes(5));
        let miss_service = ErrorEvent::new("search", "DatabaseTimeout", "slow")
            .with_occurred_at(now + Duration::minutes(5));
        let after = prediction.horizon_end() + Duration::minutes(1);

        assert_eq!(
            p.reconcile(&prediction, &[miss_type, miss_service], after),
            Some(PredictionOutcome::DidNotOccur)
        );
    }
}
