//! Periodic batch analysis.
//!
//! Sweeps every known service on an interval: full analysis pass, prediction
//! reconciliation, and unresolved-event re-escalation. A sweep for a service
//! is skipped - not queued, not cancelled - while the previous one is still
//! running; the per-service `try_lock` makes the schedule non-overlapping.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::engine::FaultResponseEngine;

pub struct AnalysisScheduler {
    engine: Arc<FaultResponseEngine>,
    interval: Duration,
    running: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AnalysisScheduler {
    pub fn new(engine: Arc<FaultResponseEngine>, config: &SchedulerConfig) -> Self {
        Self {
            engine,
            interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Run sweeps forever. Intended to be spawned as a background task.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "analysis scheduler started");

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// One sweep across every service seen so far. Returns how many services
    /// were analyzed (services still busy from the last sweep are skipped).
    pub async fn run_once(&self) -> usize {
        let services = self.engine.store().services();
        let mut analyzed = 0;

        for service in services {
            let lock = self.service_lock(&service);
            let Ok(guard) = lock.clone().try_lock_owned() else {
                debug!(service = %service, "previous analysis still running, skipping sweep");
                continue;
            };

            let engine = self.engine.clone();
            let service_name = service.clone();
            analyzed += 1;
            tokio::spawn(async move {
                let _guard = guard;
                if let Err(err) = engine.run_analysis(&service_name).await {
                    tracing::warn!(service = %service_name, error = %err, "batch analysis failed");
                }
            });
        }

        self.engine.reconcile_predictions();
        if let Err(err) = self.engine.sweep_unresolved().await {
            tracing::warn!(error = %err, "unresolved sweep failed");
        }

        analyzed
    }

    fn service_lock(&self, service: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.running
            .lock()
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::TracingAlertGateway;
    use crate::config::RemedianConfig;
    use crate::event::ErrorEvent;
    use crate::recovery::strategies::TracingRunner;

    fn scheduler() -> (Arc<AnalysisScheduler>, Arc<FaultResponseEngine>) {
        let config = RemedianConfig::default();
        let scheduler_config = config.scheduler.clone();
        let engine = Arc::new(
            FaultResponseEngine::new(
                config,
                Arc::new(TracingRunner),
                Arc::new(TracingAlertGateway),
            )
            .unwrap(),
        );
        (
            Arc::new(AnalysisScheduler::new(engine.clone(), &scheduler_config)),
            engine,
        )
    }

    #[tokio::test]
    async fn test_run_once_covers_known_services() {
        let (scheduler, engine) = scheduler();
        engine.store().record_event(ErrorEvent::new("checkout", "APIError", "x"));
        engine.store().record_event(ErrorEvent::new("search", "APIError", "y"));

        let analyzed = scheduler.run_once().await;
        assert_eq!(analyzed, 2);
    }

    #[tokio::test]
    async fn test_run_once_with_no_services_is_a_noop() {
        let (scheduler, _) = scheduler();
        assert_eq!(scheduler.run_once().await, 0);
    }

    #[tokio::test]
    async fn test_busy_service_is_skipped_not_queued() {
        let (scheduler, engine) = scheduler();
        engine.store().record_event(ErrorEvent::new("checkout", "APIError", "x"));

        // Hold the service lock as if a previous sweep were still running.
        let lock = scheduler.service_lock("checkout");
        let _held = lock.lock().await;

        let analyzed = scheduler.run_once().await;
        assert_eq!(analyzed, 0, "busy service must be skipped");
    }
}
