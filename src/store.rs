//! Durable record store and query boundary.
//!
//! Every entity the pipeline produces lands here: events, recovery chains,
//! anomalies, predictions, forecasts, insights, preventive actions, and the
//! resolved-incident library. Collections are capped in-memory rings behind
//! a single `parking_lot::RwLock`; the dashboard boundary reads through the
//! filter methods. Swapping in a real database is a persistence concern that
//! lives outside this crate.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use uuid::Uuid;

use crate::analysis::anomaly::AnomalyRecord;
use crate::analysis::forecast::Forecast;
use crate::analysis::orchestrator::{Insight, PreventiveAction, PreventiveStatus};
use crate::analysis::predictor::{ErrorPrediction, PredictionOutcome};
use crate::analysis::root_cause::ResolvedIncident;
use crate::config::StoreConfig;
use crate::event::{ErrorEvent, MetricSample, Severity};
use crate::recovery::executor::ChainOutcome;
use crate::recovery::RecoveryStrategy;

/// An event whose recovery chain was exhausted. Held for escalation
/// follow-up: past the configured age it is re-escalated one tier up, once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedEvent {
    pub event: ErrorEvent,
    pub classified_severity: Severity,
    pub failures: Vec<(RecoveryStrategy, String)>,
    pub recorded_at: DateTime<Utc>,
    pub re_escalated: bool,
}

/// Dashboard-style filter over anomaly records.
#[derive(Debug, Clone, Default)]
pub struct AnomalyFilter {
    pub service: Option<String>,
    pub min_severity: Option<Severity>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub acknowledged: Option<bool>,
}

/// Prediction accuracy totals, fed by outcome reconciliation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub reconciled: usize,
    pub occurred: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSummary {
    pub events: usize,
    pub chains: usize,
    pub unresolved: usize,
    pub anomalies: usize,
    pub predictions: usize,
    pub forecasts: usize,
    pub insights: usize,
    pub preventive_actions: usize,
    pub incidents: usize,
}

#[derive(Default)]
struct Inner {
    events: VecDeque<ErrorEvent>,
    chains: VecDeque<ChainOutcome>,
    unresolved: Vec<UnresolvedEvent>,
    anomalies: VecDeque<AnomalyRecord>,
    predictions: VecDeque<ErrorPrediction>,
    forecasts: VecDeque<Forecast>,
    insights: VecDeque<Insight>,
    preventive_actions: VecDeque<PreventiveAction>,
    incidents: Vec<ResolvedIncident>,
    metrics: HashMap<(String, String), VecDeque<MetricSample>>,
}

pub struct Store {
    config: StoreConfig,
    inner: RwLock<Inner>,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    // ------------------------------------------------------------------
    // Events & chains
    // ------------------------------------------------------------------

    pub fn record_event(&self, event: ErrorEvent) {
        let mut inner = self.inner.write();
        let cap = self.config.retention_cap;
        push_capped(&mut inner.events, event, cap);
    }

    pub fn events_for(&self, service: &str, since: DateTime<Utc>) -> Vec<ErrorEvent> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| e.service == service && e.occurred_at >= since)
            .cloned()
            .collect()
    }

    pub fn all_events(&self) -> Vec<ErrorEvent> {
        self.inner.read().events.iter().cloned().collect()
    }

    /// Every service seen in the event history, in stable order.
    pub fn services(&self) -> Vec<String> {
        let inner = self.inner.read();
        let set: BTreeSet<&str> = inner.events.iter().map(|e| e.service.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }

    pub fn record_chain(&self, outcome: ChainOutcome) {
        let mut inner = self.inner.write();
        let cap = self.config.retention_cap;
        push_capped(&mut inner.chains, outcome, cap);
    }

    pub fn chains_for(&self, service: &str) -> Vec<ChainOutcome> {
        self.inner
            .read()
            .chains
            .iter()
            .filter(|c| c.service == service)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Unresolved events
    // ------------------------------------------------------------------

    pub fn mark_unresolved(&self, unresolved: UnresolvedEvent) {
        let mut inner = self.inner.write();
        inner.unresolved.push(unresolved);
        let cap = self.config.retention_cap;
        if inner.unresolved.len() > cap {
            let excess = inner.unresolved.len() - cap;
            inner.unresolved.drain(..excess);
        }
    }

    /// Unresolved events past the age cutoff that have not been re-escalated.
    pub fn unresolved_older_than(&self, age: Duration, now: DateTime<Utc>) -> Vec<UnresolvedEvent> {
        self.inner
            .read()
            .unresolved
            .iter()
            .filter(|u| !u.re_escalated && now - u.recorded_at >= age)
            .cloned()
            .collect()
    }

    pub fn mark_re_escalated(&self, event_id: Uuid) {
        let mut inner = self.inner.write();
        if let Some(u) = inner.unresolved.iter_mut().find(|u| u.event.id == event_id) {
            u.re_escalated = true;
        }
    }

    pub fn unresolved_count(&self) -> usize {
        self.inner.read().unresolved.len()
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    pub fn record_metric(&self, service: &str, metric_name: &str, sample: MetricSample) {
        let mut inner = self.inner.write();
        let cap = self.config.metric_capacity;
        let series = inner
            .metrics
            .entry((service.to_string(), metric_name.to_string()))
            .or_default();
        push_capped(series, sample, cap);
    }

    pub fn metric_series(&self, service: &str, metric_name: &str) -> Vec<MetricSample> {
        self.inner
            .read()
            .metrics
            .get(&(service.to_string(), metric_name.to_string()))
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn metric_names(&self, service: &str) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner
            .metrics
            .keys()
            .filter(|(s, _)| s == service)
            .map(|(_, m)| m.clone())
            .collect();
        names.sort();
        names
    }

    // ------------------------------------------------------------------
    // Anomalies
    // ------------------------------------------------------------------

    pub fn record_anomaly(&self, record: AnomalyRecord) {
        let mut inner = self.inner.write();
        let cap = self.config.retention_cap;
        push_capped(&mut inner.anomalies, record, cap);
    }

    pub fn anomalies(&self, filter: &AnomalyFilter) -> Vec<AnomalyRecord> {
        self.inner
            .read()
            .anomalies
            .iter()
            .filter(|a| {
                filter.service.as_deref().is_none_or(|s| a.service == s)
                    && filter.min_severity.is_none_or(|s| a.severity_level >= s)
                    && filter.since.is_none_or(|t| a.detected_at >= t)
                    && filter.until.is_none_or(|t| a.detected_at <= t)
                    && filter.acknowledged.is_none_or(|f| a.acknowledged == f)
            })
            .cloned()
            .collect()
    }

    /// Acknowledgement is the only mutation an anomaly record sees.
    pub fn acknowledge_anomaly(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write();
        match inner.anomalies.iter_mut().find(|a| a.id == id) {
            Some(record) => {
                record.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Re-run dedup: is there already an open record for this
    /// `(service, metric)` detected inside the window?
    pub fn has_open_anomaly(
        &self,
        service: &str,
        metric_name: &str,
        window_start: DateTime<Utc>,
    ) -> bool {
        self.inner.read().anomalies.iter().any(|a| {
            !a.acknowledged
                && a.service == service
                && a.metric_name == metric_name
                && a.detected_at >= window_start
        })
    }

    // ------------------------------------------------------------------
    // Predictions
    // ------------------------------------------------------------------

    pub fn record_prediction(&self, prediction: ErrorPrediction) {
        let mut inner = self.inner.write();
        let cap = self.config.retention_cap;
        push_capped(&mut inner.predictions, prediction, cap);
    }

    pub fn predictions_for(&self, service: &str) -> Vec<ErrorPrediction> {
        self.inner
            .read()
            .predictions
            .iter()
            .filter(|p| p.service == service)
            .cloned()
            .collect()
    }

    pub fn unreconciled_predictions(&self) -> Vec<ErrorPrediction> {
        self.inner
            .read()
            .predictions
            .iter()
            .filter(|p| p.outcome.is_none())
            .cloned()
            .collect()
    }

    pub fn set_prediction_outcome(&self, id: Uuid, outcome: PredictionOutcome) {
        let mut inner = self.inner.write();
        if let Some(p) = inner.predictions.iter_mut().find(|p| p.id == id) {
            p.outcome = Some(outcome);
        }
    }

    pub fn prediction_accuracy(&self) -> AccuracySummary {
        let inner = self.inner.read();
        let reconciled: Vec<_> = inner
            .predictions
            .iter()
            .filter_map(|p| p.outcome)
            .collect();
        let occurred = reconciled
            .iter()
            .filter(|o| **o == PredictionOutcome::Occurred)
            .count();
        AccuracySummary {
            reconciled: reconciled.len(),
            occurred,
            hit_rate: if reconciled.is_empty() {
                0.0
            } else {
                occurred as f64 / reconciled.len() as f64
            },
        }
    }

    // ------------------------------------------------------------------
    // Forecasts, insights, preventive actions, incidents
    // ------------------------------------------------------------------

    pub fn record_forecast(&self, forecast: Forecast) {
        let mut inner = self.inner.write();
        let cap = self.config.retention_cap;
        push_capped(&mut inner.forecasts, forecast, cap);
    }

    pub fn forecasts_for(&self, service: &str) -> Vec<Forecast> {
        self.inner
            .read()
            .forecasts
            .iter()
            .filter(|f| f.service == service)
            .cloned()
            .collect()
    }

    pub fn record_insight(&self, insight: Insight) {
        let mut inner = self.inner.write();
        let cap = self.config.retention_cap;
        push_capped(&mut inner.insights, insight, cap);
    }

    pub fn insights_for(&self, service: &str) -> Vec<Insight> {
        self.inner
            .read()
            .insights
            .iter()
            .filter(|i| i.service == service)
            .cloned()
            .collect()
    }

    pub fn record_preventive_action(&self, action: PreventiveAction) {
        let mut inner = self.inner.write();
        let cap = self.config.retention_cap;
        push_capped(&mut inner.preventive_actions, action, cap);
    }

    pub fn preventive_actions_for(&self, service: &str) -> Vec<PreventiveAction> {
        self.inner
            .read()
            .preventive_actions
            .iter()
            .filter(|a| a.service == service)
            .cloned()
            .collect()
    }

    pub fn set_preventive_status(&self, id: Uuid, status: PreventiveStatus) -> bool {
        let mut inner = self.inner.write();
        match inner.preventive_actions.iter_mut().find(|a| a.id == id) {
            Some(action) => {
                action.status = status;
                true
            }
            None => false,
        }
    }

    pub fn record_incident(&self, incident: ResolvedIncident) {
        let mut inner = self.inner.write();
        inner.incidents.push(incident);
        let cap = self.config.retention_cap;
        if inner.incidents.len() > cap {
            let excess = inner.incidents.len() - cap;
            inner.incidents.drain(..excess);
        }
    }

    pub fn incidents(&self) -> Vec<ResolvedIncident> {
        self.inner.read().incidents.clone()
    }

    pub fn summary(&self) -> StoreSummary {
        let inner = self.inner.read();
        StoreSummary {
            events: inner.events.len(),
            chains: inner.chains.len(),
            unresolved: inner.unresolved.len(),
            anomalies: inner.anomalies.len(),
            predictions: inner.predictions.len(),
            forecasts: inner.forecasts.len(),
            insights: inner.insights.len(),
            preventive_actions: inner.preventive_actions.len(),
            incidents: inner.incidents.len(),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

fn push_capped<T>(deque: &mut VecDeque<T>, item: T, cap: usize) {
    deque.push_back(item);
    while deque.len() > cap {
        deque.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::anomaly::AnomalyType;

    fn anomaly(service: &str, metric: &str, severity: Severity, acknowledged: bool) -> AnomalyRecord {
        AnomalyRecord {
            id: Uuid::new_v4(),
            service: service.to_string(),
            metric_name: metric.to_string(),
            anomaly_score: 0.9,
            is_anomaly: true,
            severity_level: severity,
            anomaly_type: AnomalyType::Spike,
            detected_at: Utc::now(),
            root_cause_hypothesis: None,
            acknowledged,
            expected_value: 100.0,
            observed_value: 400.0,
            deviation_percent: 300.0,
        }
    }

    #[test]
    fn test_event_retention_cap() {
        let store = Store::new(StoreConfig {
            retention_cap: 3,
            metric_capacity: 8,
        });
        for i in 0..5 {
            store.record_event(ErrorEvent::new("api", "APIError", &format!("e{i}")));
        }
        let events = store.all_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "e2", "oldest records dropped first");
    }

    #[test]
    fn test_services_are_deduplicated_and_sorted() {
        let store = Store::default();
        store.record_event(ErrorEvent::new("search", "APIError", "x"));
        store.record_event(ErrorEvent::new("checkout", "APIError", "y"));
        store.record_event(ErrorEvent::new("search", "TimeoutError", "z"));
        assert_eq!(store.services(), vec!["checkout", "search"]);
    }

    #[test]
    fn test_anomaly_filtering() {
        let store = Store::default();
        store.record_anomaly(anomaly("checkout", "response_time_ms", Severity::Critical, false));
        store.record_anomaly(anomaly("checkout", "error_rate", Severity::Medium, true));
        store.record_anomaly(anomaly("search", "error_rate", Severity::High, false));

        let critical_checkout = store.anomalies(&AnomalyFilter {
            service: Some("checkout".to_string()),
            min_severity: Some(Severity::High),
            ..AnomalyFilter::default()
        });
        assert_eq!(critical_checkout.len(), 1);
        assert_eq!(critical_checkout[0].metric_name, "response_time_ms");

        let unacknowledged = store.anomalies(&AnomalyFilter {
            acknowledged: Some(false),
            ..AnomalyFilter::default()
        });
        assert_eq!(unacknowledged.len(), 2);
    }

    #[test]
    fn test_acknowledge_anomaly() {
        let store = Store::default();
        let record = anomaly("api", "error_rate", Severity::High, false);
        let id = record.id;
        store.record_anomaly(record);

        assert!(store.acknowledge_anomaly(id));
        assert!(!store.acknowledge_anomaly(Uuid::new_v4()));

        let acknowledged = store.anomalies(&AnomalyFilter {
            acknowledged: Some(true),
            ..AnomalyFilter::default()
        });
        assert_eq!(acknowledged.len(), 1);
    }

    #[test]
    fn test_open_anomaly_dedup_window() {
        let store = Store::default();
        store.record_anomaly(anomaly("api", "error_rate", Severity::High, false));

        let window_start = Utc::now() - Duration::hours(1);
        assert!(store.has_open_anomaly("api", "error_rate", window_start));
        assert!(!store.has_open_anomaly("api", "response_time_ms", window_start));
        assert!(!store.has_open_anomaly("search", "error_rate", window_start));
    }

    #[test]
    fn test_acknowledged_anomaly_does_not_block_dedup() {
        let store = Store::default();
        let record = anomaly("api", "error_rate", Severity::High, false);
        let id = record.id;
        store.record_anomaly(record);
        store.acknowledge_anomaly(id);

        assert!(!store.has_open_anomaly("api", "error_rate", Utc::now() - Duration::hours(1)));
    }

    #[test]
    fn test_metric_series_capped_and_ordered() {
        let store = Store::new(StoreConfig {
            retention_cap: 100,
            metric_capacity: 4,
        });
        let now = Utc::now();
        for i in 0..6 {
            store.record_metric(
                "api",
                "error_rate",
                MetricSample::new(now + Duration::minutes(i), i as f64),
            );
        }
        let series = store.metric_series("api", "error_rate");
        assert_eq!(series.len(), 4);
        assert_eq!(series[0].value, 2.0);
        assert_eq!(store.metric_names("api"), vec!["error_rate"]);
    }

    #[test]
    fn test_prediction_outcome_and_accuracy() {
        let store = Store::default();
        let mut p1 = sample_prediction("checkout");
        let p2 = sample_prediction("checkout");
        p1.outcome = None;
        let id1 = p1.id;
        store.record_prediction(p1);
        store.record_prediction(p2);

        assert_eq!(store.unreconciled_predictions().len(), 2);

        store.set_prediction_outcome(id1, PredictionOutcome::Occurred);
        assert_eq!(store.unreconciled_predictions().len(), 1);

        let accuracy = store.prediction_accuracy();
        assert_eq!(accuracy.reconciled, 1);
        assert_eq!(accuracy.occurred, 1);
        assert!((accuracy.hit_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unresolved_aging_and_single_re_escalation() {
        let store = Store::default();
        let event = ErrorEvent::new("checkout", "MemoryError", "oom");
        let id = event.id;
        store.mark_unresolved(UnresolvedEvent {
            event,
            classified_severity: Severity::Critical,
            failures: vec![(RecoveryStrategy::PoolIncrease, "quota".to_string())],
            recorded_at: Utc::now() - Duration::minutes(10),
            re_escalated: false,
        });

        let now = Utc::now();
        let stale = store.unresolved_older_than(Duration::minutes(5), now);
        assert_eq!(stale.len(), 1);

        store.mark_re_escalated(id);
        assert!(store.unresolved_older_than(Duration::minutes(5), now).is_empty());
    }

    fn sample_prediction(service: &str) -> ErrorPrediction {
        ErrorPrediction {
            id: Uuid::new_v4(),
            service: service.to_string(),
            predicted_error_type: "DatabaseTimeout".to_string(),
            probability: 0.8,
            confidence: 0.6,
            time_horizon_minutes: 30,
            predicted_at: Utc::now(),
            recommended_actions: vec![],
            contributing_factors: serde_json::Map::new(),
            outcome: None,
        }
    }
}
