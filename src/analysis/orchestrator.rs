//! Full per-service analysis pass.
//!
//! Runs the detector, predictor, forecaster, and root-cause analyzer for one
//! service, persists what they produce, and derives insights plus preventive
//! actions from the high-severity end of the results. Safe to re-run: an
//! anomaly already open for the same `(service, metric)` inside the dedup
//! window is not recorded again. A component with nothing to say (too little
//! history, flat trend) contributes an empty section and the pass proceeds
//! with partial results.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::anomaly::{AnomalyDetector, AnomalyRecord};
use crate::analysis::features::{FeatureExtractor, FeatureVector};
use crate::analysis::forecast::{Forecast, TimeSeriesForecaster};
use crate::analysis::predictor::{ErrorPrediction, ErrorPredictor};
use crate::analysis::root_cause::{IncidentSignature, RootCauseAnalyzer};
use crate::classifier::ErrorClassifier;
use crate::config::RemedianConfig;
use crate::errors::Result;
use crate::event::{ErrorEvent, Severity};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Trend,
    Pattern,
    Capacity,
}

/// A high-level observation derived from analysis results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub service: String,
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreventiveStatus {
    Recommended,
    Scheduled,
    Executed,
    Skipped,
}

/// A recommended remediation derived from an insight or high-severity
/// result - distinct from the reactive recovery chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreventiveAction {
    pub id: Uuid,
    pub service: String,
    pub action_type: String,
    pub priority: Severity,
    pub status: PreventiveStatus,
    pub can_be_automated: bool,
    pub triggering_insight_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Everything one pass produced for a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub service: String,
    pub generated_at: DateTime<Utc>,
    pub anomalies: Vec<AnomalyRecord>,
    pub predictions: Vec<ErrorPrediction>,
    pub forecasts: Vec<Forecast>,
    pub insights: Vec<Insight>,
    pub preventive_actions: Vec<PreventiveAction>,
}

pub struct PredictionOrchestrator {
    classifier: Arc<ErrorClassifier>,
    detector: AnomalyDetector,
    predictor: ErrorPredictor,
    forecaster: TimeSeriesForecaster,
    root_cause: RootCauseAnalyzer,
    extractor: FeatureExtractor,
    store: Arc<Store>,
    dedup_window: Duration,
    critical_probability: f64,
    lookback: Duration,
}

impl PredictionOrchestrator {
    pub fn new(
        config: &RemedianConfig,
        classifier: Arc<ErrorClassifier>,
        store: Arc<Store>,
    ) -> Result<Self> {
        Ok(Self {
            classifier,
            detector: AnomalyDetector::new(config.detector.clone())?,
            predictor: ErrorPredictor::new(config.predictor.clone()),
            forecaster: TimeSeriesForecaster::new(config.forecast.clone()),
            root_cause: RootCauseAnalyzer::new(config.orchestrator.root_cause_top_k),
            extractor: FeatureExtractor::new(config.predictor.lookback_minutes),
            store,
            dedup_window: Duration::seconds(config.orchestrator.dedup_window_secs),
            critical_probability: config.orchestrator.critical_probability,
            lookback: Duration::minutes(config.predictor.lookback_minutes),
        })
    }

    pub fn run_full_analysis(&self, service: &str) -> AnalysisReport {
        self.run_full_analysis_at(service, Utc::now())
    }

    /// The full pass, pinned to a caller-supplied clock for determinism.
    pub fn run_full_analysis_at(&self, service: &str, now: DateTime<Utc>) -> AnalysisReport {
        info!(service, "starting full analysis pass");

        let events = self.store.events_for(service, now - self.lookback);
        let incidents = self.store.incidents();

        let mut anomalies = self.detect_metric_anomalies(service, now);
        anomalies.extend(self.detect_pattern_anomalies(service, &events, now));

        for record in &mut anomalies {
            if record.root_cause_hypothesis.is_none() {
                let candidates = self
                    .root_cause
                    .analyze(&IncidentSignature::from_anomaly(record), &incidents);
                record.root_cause_hypothesis =
                    candidates.first().map(|c| c.resolution.clone());
            }
            self.store.record_anomaly(record.clone());
        }

        let features = self.extractor.extract(service, &events, now);
        let predictions = self.predict(&features, now);
        for prediction in &predictions {
            self.store.record_prediction(prediction.clone());
        }

        let forecasts = self.forecast_metrics(service, now);
        for forecast in &forecasts {
            self.store.record_forecast(forecast.clone());
        }

        let insights = self.derive_insights(service, &events, &anomalies, &forecasts, now);
        for insight in &insights {
            self.store.record_insight(insight.clone());
        }

        let preventive_actions =
            self.derive_preventive_actions(service, &anomalies, &predictions, &insights, now);
        for action in &preventive_actions {
            self.store.record_preventive_action(action.clone());
        }

        info!(
            service,
            anomalies = anomalies.len(),
            predictions = predictions.len(),
            forecasts = forecasts.len(),
            insights = insights.len(),
            preventive_actions = preventive_actions.len(),
            "analysis pass complete"
        );

        AnalysisReport {
            service: service.to_string(),
            generated_at: now,
            anomalies,
            predictions,
            forecasts,
            insights,
            preventive_actions,
        }
    }

    fn detect_metric_anomalies(&self, service: &str, now: DateTime<Utc>) -> Vec<AnomalyRecord> {
        let window_start = now - self.dedup_window;
        let mut found = Vec::new();
        for metric in self.store.metric_names(service) {
            let series = self.store.metric_series(service, &metric);
            let Some(record) = self.detector.detect(service, &metric, &series) else {
                continue;
            };
            if self.store.has_open_anomaly(service, &metric, window_start) {
                debug!(service, metric = %metric, "anomaly already open for window, skipping");
                continue;
            }
            found.push(record);
        }
        found
    }

    /// Error-type mix deviation: current-hour share at least doubling the
    /// share over the lookback window.
    fn detect_pattern_anomalies(
        &self,
        service: &str,
        events: &[ErrorEvent],
        now: DateTime<Utc>,
    ) -> Vec<AnomalyRecord> {
        let hour_ago = now - Duration::minutes(60);
        let recent: Vec<&ErrorEvent> =
            events.iter().filter(|e| e.occurred_at >= hour_ago).collect();
        if recent.len() < 5 || events.len() < 20 {
            return Vec::new();
        }

        let ratios = |events: &[&ErrorEvent]| -> HashMap<String, f64> {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for e in events {
                *counts.entry(e.error_type.clone()).or_default() += 1;
            }
            let total = events.len() as f64;
            counts
                .into_iter()
                .map(|(t, c)| (t, c as f64 / total))
                .collect()
        };

        let all: Vec<&ErrorEvent> = events.iter().collect();
        let expected = ratios(&all);
        let actual = ratios(&recent);

        let window_start = now - self.dedup_window;
        let mut found = Vec::new();
        for (error_type, actual_ratio) in &actual {
            let Some(expected_ratio) = expected.get(error_type) else {
                continue;
            };
            let Some(record) = self.detector.detect_pattern_shift(
                service,
                error_type,
                *expected_ratio,
                *actual_ratio,
                now,
            ) else {
                continue;
            };
            if self
                .store
                .has_open_anomaly(service, &record.metric_name, window_start)
            {
                continue;
            }
            found.push(record);
        }
        found
    }

    fn predict(&self, features: &FeatureVector, now: DateTime<Utc>) -> Vec<ErrorPrediction> {
        let Some(dominant) = features.dominant_error_type.as_deref() else {
            return Vec::new();
        };
        let category = self.classifier.category_of(dominant);
        self.predictor
            .predict(features, category, now)
            .into_iter()
            .collect()
    }

    fn forecast_metrics(&self, service: &str, now: DateTime<Utc>) -> Vec<Forecast> {
        self.store
            .metric_names(service)
            .iter()
            .filter_map(|metric| {
                let series = self.store.metric_series(service, metric);
                self.forecaster.forecast(service, metric, &series, now)
            })
            .collect()
    }

    fn derive_insights(
        &self,
        service: &str,
        events: &[ErrorEvent],
        anomalies: &[AnomalyRecord],
        forecasts: &[Forecast],
        now: DateTime<Utc>,
    ) -> Vec<Insight> {
        let mut insights = Vec::new();

        // Trend: last-hour rate at least double the window's hourly average.
        let hour_ago = now - Duration::minutes(60);
        let recent = events.iter().filter(|e| e.occurred_at >= hour_ago).count();
        let window_hours = (self.lookback.num_minutes() as f64 / 60.0).max(1.0);
        let hourly_average = events.len() as f64 / window_hours;
        if recent >= 5 && recent as f64 > 2.0 * hourly_average {
            insights.push(Insight {
                id: Uuid::new_v4(),
                service: service.to_string(),
                kind: InsightKind::Trend,
                title: format!("{service} error rate increasing"),
                description: format!(
                    "{recent} errors in the last hour against an hourly average of {hourly_average:.1}"
                ),
                severity: if recent as f64 > 4.0 * hourly_average {
                    Severity::High
                } else {
                    Severity::Medium
                },
                confidence: 0.85,
                generated_at: now,
            });
        }

        // Pattern: the error mix drifted from its historical shape.
        if let Some(shift) = anomalies
            .iter()
            .find(|a| a.metric_name.starts_with("error_type:"))
        {
            insights.push(Insight {
                id: Uuid::new_v4(),
                service: service.to_string(),
                kind: InsightKind::Pattern,
                title: format!("{service} error mix shifted"),
                description: format!(
                    "{} holds {:.0}% of recent errors against a historical {:.0}%",
                    shift.metric_name.trim_start_matches("error_type:"),
                    shift.observed_value * 100.0,
                    shift.expected_value * 100.0,
                ),
                severity: shift.severity_level,
                confidence: 0.7,
                generated_at: now,
            });
        }

        // Capacity: a forecast peaking well above the current level.
        for forecast in forecasts {
            let last_observed = self
                .store
                .metric_series(service, &forecast.metric_name)
                .last()
                .map(|s| s.value)
                .unwrap_or(0.0);
            if last_observed > 0.0 && forecast.peak_value > 1.5 * last_observed {
                insights.push(Insight {
                    id: Uuid::new_v4(),
                    service: service.to_string(),
                    kind: InsightKind::Capacity,
                    title: format!("{service} {} headed above capacity", forecast.metric_name),
                    description: format!(
                        "forecast peaks at {:.1} against a current {:.1}",
                        forecast.peak_value, last_observed
                    ),
                    severity: Severity::Medium,
                    confidence: 0.6,
                    generated_at: now,
                });
            }
        }

        insights
    }

    /// Priority ladder: critical anomaly or probability at/above the
    /// configured bar → critical action; high anomaly or any emitted
    /// prediction → high; the rest follow their source severity.
    fn derive_preventive_actions(
        &self,
        service: &str,
        anomalies: &[AnomalyRecord],
        predictions: &[ErrorPrediction],
        insights: &[Insight],
        now: DateTime<Utc>,
    ) -> Vec<PreventiveAction> {
        let trend_insight = insights.iter().find(|i| i.kind == InsightKind::Trend);
        let mut actions = Vec::new();

        for anomaly in anomalies {
            let (action_type, can_be_automated) = action_for_metric(&anomaly.metric_name);
            actions.push(PreventiveAction {
                id: Uuid::new_v4(),
                service: service.to_string(),
                action_type: action_type.to_string(),
                priority: anomaly.severity_level,
                status: PreventiveStatus::Recommended,
                can_be_automated,
                triggering_insight_id: trend_insight.map(|i| i.id),
                created_at: now,
            });
        }

        for prediction in predictions {
            let priority = if prediction.probability >= self.critical_probability {
                Severity::Critical
            } else {
                Severity::High
            };
            actions.push(PreventiveAction {
                id: Uuid::new_v4(),
                service: service.to_string(),
                action_type: "health_check_increase".to_string(),
                priority,
                status: PreventiveStatus::Recommended,
                can_be_automated: true,
                triggering_insight_id: trend_insight.map(|i| i.id),
                created_at: now,
            });
        }

        actions
    }
}

fn action_for_metric(metric_name: &str) -> (&'static str, bool) {
    let metric = metric_name.to_lowercase();
    if metric.contains("response_time") || metric.contains("latency") {
        ("connection_pool_increase", false)
    } else if metric.contains("error") {
        ("monitoring_alert", true)
    } else {
        ("scale_up_resources", false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::event::MetricSample;

    fn setup() -> (PredictionOrchestrator, Arc<Store>) {
        let config = RemedianConfig::default();
        let classifier = Arc::new(ErrorClassifier::new(&ClassifierConfig::default()).unwrap());
        let store = Arc::new(Store::default());
        let orchestrator =
            PredictionOrchestrator::new(&config, classifier, store.clone()).unwrap();
        (orchestrator, store)
    }

    fn seed_spiky_metric(store: &Store, service: &str, now: DateTime<Utc>) {
        for i in 0..24 {
            store.record_metric(
                service,
                "response_time_ms",
                MetricSample::new(
                    now - Duration::minutes(25 - i),
                    if i % 2 == 0 { 700.0 } else { 900.0 },
                ),
            );
        }
        store.record_metric(
            service,
            "response_time_ms",
            MetricSample::new(now - Duration::minutes(1), 1400.0),
        );
    }

    #[test]
    fn test_empty_service_yields_empty_report() {
        let (orchestrator, _) = setup();
        let report = orchestrator.run_full_analysis_at("ghost", Utc::now());
        assert!(report.anomalies.is_empty());
        assert!(report.predictions.is_empty());
        assert!(report.forecasts.is_empty());
        assert!(report.insights.is_empty());
        assert!(report.preventive_actions.is_empty());
    }

    #[test]
    fn test_spike_produces_anomaly_and_preventive_action() {
        let (orchestrator, store) = setup();
        let now = Utc::now();
        seed_spiky_metric(&store, "checkout", now);

        let report = orchestrator.run_full_analysis_at("checkout", now);

        assert_eq!(report.anomalies.len(), 1);
        let anomaly = &report.anomalies[0];
        assert_eq!(anomaly.severity_level, Severity::Critical);

        let pool_actions: Vec<_> = report
            .preventive_actions
            .iter()
            .filter(|a| a.action_type == "connection_pool_increase")
            .collect();
        assert_eq!(pool_actions.len(), 1);
        assert_eq!(pool_actions[0].priority, Severity::Critical);
    }

    #[test]
    fn test_rerun_does_not_duplicate_open_anomalies() {
        let (orchestrator, store) = setup();
        let now = Utc::now();
        seed_spiky_metric(&store, "checkout", now);

        let first = orchestrator.run_full_analysis_at("checkout", now);
        assert_eq!(first.anomalies.len(), 1);

        let second = orchestrator.run_full_analysis_at("checkout", now + Duration::minutes(1));
        assert!(second.anomalies.is_empty(), "re-run must not double-count");

        let stored = store.anomalies(&crate::store::AnomalyFilter::default());
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_acknowledged_anomaly_reopens_on_next_run()
    {
        let (orchestrator, store) = setup();
        let now = Utc::now();
        seed_spiky_metric(&store, "checkout", now);

        let first = orchestrator.run_full_analysis_at("checkout", now);
        store.acknowledge_anomaly(first.anomalies[0].id);

        let second = orchestrator.run_full_analysis_at("checkout", now + Duration::minutes(1));
        assert_eq!(second.anomalies.len(), 1, "acknowledged records release the window");
    }

    #[test]
    fn test_rising_errors_produce_prediction_and_trend_insight() {
        let (orchestrator, store) = setup();
        let now = Utc::now();

        // Sparse old history, then a dense burst over the last ~35 minutes.
        for i in 0..10i64 {
            store.record_event(
                ErrorEvent::new("checkout", "DatabaseTimeout", "query timed out")
                    .with_occurred_at(now - Duration::minutes(230 - i * 10))
                    .with_response_time(1_100),
            );
        }
        for i in 0..140i64 {
            store.record_event(
                ErrorEvent::new("checkout", "DatabaseTimeout", "query timed out")
                    .with_occurred_at(now - Duration::minutes((140 - i) / 4))
                    .with_response_time(1_300),
            );
        }

        let report = orchestrator.run_full_analysis_at("checkout", now);

        assert_eq!(report.predictions.len(), 1);
        let prediction = &report.predictions[0];
        assert_eq!(prediction.predicted_error_type, "DatabaseTimeout");
        assert!(prediction.probability >= 0.70);

        assert!(report
            .insights
            .iter()
            .any(|i| i.kind == InsightKind::Trend));
        assert!(report
            .preventive_actions
            .iter()
            .any(|a| a.action_type == "health_check_increase"));
    }

    #[test]
    fn test_forecasts_cover_each_metric_with_history() {
        let (orchestrator, store) = setup();
        let now = Utc::now();
        for i in 0..12 {
            store.record_metric(
                "api",
                "error_rate",
                MetricSample::new(now - Duration::hours(12 - i), 5.0 + i as f64),
            );
        }
        // Too short to forecast
        store.record_metric("api", "queue_depth", MetricSample::new(now, 3.0));

        let report = orchestrator.run_full_analysis_at("api", now);
        assert_eq!(report.forecasts.len(), 1);
        assert_eq!(report.forecasts[0].metric_name, "error_rate");
        assert!(store.forecasts_for("api").len() == 1);
    }

    #[test]
    fn test_root_cause_hypothesis_backfilled_from_incident_library() {
        use chrono::Timelike;

        let (orchestrator, store) = setup();
        let now = Utc::now();

        // queue_depth has no keyword association rule, so a spike there gets
        // its hypothesis from the closest resolved incident.
        store.record_incident(crate::analysis::root_cause::ResolvedIncident::new(
            "queue_depth",
            "api",
            Severity::Critical,
            now.hour(),
            "consumer crashed; queue drained after restart",
            now - Duration::days(2),
        ));

        for i in 0..20 {
            store.record_metric(
                "api",
                "queue_depth",
                MetricSample::new(now - Duration::minutes(21 - i), 500.0),
            );
        }
        store.record_metric(
            "api",
            "queue_depth",
            MetricSample::new(now - Duration::minutes(1), 900.0),
        );

        let report = orchestrator.run_full_analysis_at("api", now);
        let spike = report
            .anomalies
            .iter()
            .find(|a| a.metric_name == "queue_depth")
            .expect("queue spike must be detected");
        assert_eq!(
            spike.root_cause_hypothesis.as_deref(),
            Some("consumer crashed; queue drained after restart")
        );
    }

    #[test]
    fn test_error_mix_shift_produces_pattern_anomaly_and_insight() {
        let (orchestrator, store) = setup();
        let now = Utc::now();

        // A steady validation-error background, then a timeout burst in the
        // last hour that doubles the timeout share of the mix.
        for i in 0..24i64 {
            store.record_event(
                ErrorEvent::new("api", "ValidationError", "bad payload")
                    .with_occurred_at(now - Duration::minutes(180 - i * 5)),
            );
        }
        for i in 0..6i64 {
            store.record_event(
                ErrorEvent::new("api", "TimeoutError", "deadline exceeded")
                    .with_occurred_at(now - Duration::minutes(6 - i)),
            );
        }

        let report = orchestrator.run_full_analysis_at("api", now);
        let shift = report
            .anomalies
            .iter()
            .find(|a| a.metric_name == "error_type:TimeoutError")
            .expect("mix shift must be detected");
        assert_eq!(shift.anomaly_type, crate::analysis::anomaly::AnomalyType::PatternDeviation);
        assert!(report
            .insights
            .iter()
            .any(|i| i.kind == InsightKind::Pattern));
    }
}
