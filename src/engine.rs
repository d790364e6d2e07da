//! Fault-Response Engine
//!
//! The façade wiring the pipeline together:
//!
//! ```text
//! ErrorEvent ──► ErrorClassifier ──► RecoveryExecutor ──► Store
//!                     │                    │
//!                     │              exhausted? ──► AlertGateway (escalation)
//!                     ▼
//!          PredictionOrchestrator (inline for the triggering service,
//!                                  periodic in batch via the scheduler)
//! ```
//!
//! The inline path handles one event synchronously: classify, run the chain,
//! persist, escalate if exhausted, then run a full analysis pass for the
//! affected service. Batch sweeps and reconciliation are driven externally
//! by the scheduler.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::alert::{AlertGateway, AlertKind, AlertRequest};
use crate::analysis::orchestrator::{AnalysisReport, PredictionOrchestrator};
use crate::analysis::predictor::ErrorPredictor;
use crate::classifier::ErrorClassifier;
use crate::config::RemedianConfig;
use crate::errors::Result;
use crate::event::{ErrorEvent, MetricSample, Severity};
use crate::recovery::executor::{ChainOutcome, RecoveryExecutor};
use crate::recovery::strategies::StrategyRunner;
use crate::store::{Store, UnresolvedEvent};

/// Outcome of the inline per-event path.
#[derive(Debug, Clone)]
pub struct HandledError {
    pub severity: Severity,
    pub outcome: ChainOutcome,
    pub report: AnalysisReport,
}

pub struct FaultResponseEngine {
    config: RemedianConfig,
    classifier: Arc<ErrorClassifier>,
    executor: RecoveryExecutor,
    orchestrator: PredictionOrchestrator,
    predictor: ErrorPredictor,
    store: Arc<Store>,
    gateway: Arc<dyn AlertGateway>,
}

impl FaultResponseEngine {
    pub fn new(
        config: RemedianConfig,
        runner: Arc<dyn StrategyRunner>,
        gateway: Arc<dyn AlertGateway>,
    ) -> Result<Self> {
        let classifier = Arc::new(ErrorClassifier::new(&config.classifier)?);
        let store = Arc::new(Store::new(config.store.clone()));
        let executor = RecoveryExecutor::new(config.recovery.clone(), runner);
        let orchestrator =
            PredictionOrchestrator::new(&config, classifier.clone(), store.clone())?;
        let predictor = ErrorPredictor::new(config.predictor.clone());

        Ok(Self {
            config,
            classifier,
            executor,
            orchestrator,
            predictor,
            store,
            gateway,
        })
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn executor(&self) -> &RecoveryExecutor {
        &self.executor
    }

    /// The inline path: classify, recover, persist, escalate on exhaustion,
    /// then analyze the affected service.
    pub async fn handle_error(&self, event: ErrorEvent) -> Result<HandledError> {
        let classification = self.classifier.classify(&event.error_type, &event.context);
        info!(
            service = %event.service,
            error_type = %event.error_type,
            severity = %classification.severity,
            chain_len = classification.chain.len(),
            "handling error event"
        );

        self.store.record_event(event.clone());

        let outcome = self.executor.run_chain(&event, &classification).await;
        self.store.record_chain(outcome.clone());

        if !outcome.recovered {
            warn!(
                service = %event.service,
                error_type = %event.error_type,
                "recovery chain exhausted, escalating"
            );
            self.store.mark_unresolved(UnresolvedEvent {
                event: event.clone(),
                classified_severity: classification.severity,
                failures: outcome.failure_reasons(),
                recorded_at: Utc::now(),
                re_escalated: false,
            });
            self.gateway
                .send(AlertRequest::escalation(
                    &event,
                    classification.severity,
                    &outcome,
                ))
                .await?;
        }

        let report = self.run_analysis(&event.service).await?;

        Ok(HandledError {
            severity: classification.severity,
            outcome,
            report,
        })
    }

    /// Record one metric observation from the metrics boundary.
    pub fn record_metric(&self, service: &str, metric_name: &str, value: f64) {
        self.store
            .record_metric(service, metric_name, MetricSample::new(Utc::now(), value));
    }

    /// One full analysis pass for a service, with alerts for what it finds:
    /// every emitted prediction, and anomalies at high severity or above.
    pub async fn run_analysis(&self, service: &str) -> Result<AnalysisReport> {
        let report = self.orchestrator.run_full_analysis(service);

        for prediction in &report.predictions {
            self.gateway
                .send(AlertRequest::predicted_error(prediction))
                .await?;
        }
        for anomaly in &report.anomalies {
            if anomaly.severity_level >= Severity::High {
                self.gateway.send(AlertRequest::anomaly(anomaly)).await?;
            }
        }

        Ok(report)
    }

    /// Reconcile predictions whose horizon has elapsed against the events
    /// that actually arrived. Feeds the accuracy summary; a quiet horizon is
    /// recorded, never raised.
    pub fn reconcile_predictions(&self) -> usize {
        let now = Utc::now();
        let events = self.store.all_events();
        let mut reconciled = 0;

        for prediction in self.store.unreconciled_predictions() {
            if let Some(outcome) = self.predictor.reconcile(&prediction, &events, now) {
                self.store.set_prediction_outcome(prediction.id, outcome);
                reconciled += 1;
            }
        }

        if reconciled > 0 {
            let accuracy = self.store.prediction_accuracy();
            info!(
                reconciled,
                hit_rate = accuracy.hit_rate,
                "prediction outcomes reconciled"
            );
        }
        reconciled
    }

    /// Re-escalate unresolved events past the configured age, one severity
    /// tier up, once per event.
    pub async fn sweep_unresolved(&self) -> Result<usize> {
        let age = Duration::seconds(self.config.recovery.escalation_age_secs as i64);
        let now = Utc::now();
        let stale = self.store.unresolved_older_than(age, now);
        let count = stale.len();

        for unresolved in stale {
            let elevated = unresolved.classified_severity.elevated();
            warn!(
                service = %unresolved.event.service,
                error_type = %unresolved.event.error_type,
                severity = %elevated,
                "event unresolved past threshold, re-escalating"
            );
            let alert = AlertRequest {
                kind: AlertKind::Escalation,
                severity: elevated,
                service: unresolved.event.service.clone(),
                headline: format!(
                    "{} on {} still unresolved past escalation threshold",
                    unresolved.event.error_type, unresolved.event.service
                ),
                score: None,
                probability: None,
                recommended_actions: vec!["manual investigation required".to_string()],
                detail: unresolved
                    .failures
                    .iter()
                    .map(|(strategy, reason)| format!("{strategy}: {reason}"))
                    .collect(),
            };
            self.gateway.send(alert).await?;
            self.store.mark_re_escalated(unresolved.event.id);
        }

        Ok(count)
    }
}
