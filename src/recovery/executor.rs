//! Sequential strategy-chain execution with per-attempt timeouts.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::classifier::Classification;
use crate::config::RecoveryConfig;
use crate::errors::RecoveryError;
use crate::event::ErrorEvent;
use crate::recovery::strategies::{RecoveryContext, StrategyRunner};
use crate::recovery::{ActionStatus, RecoveryAction, RecoveryStrategy};

/// Result of running one strategy chain to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOutcome {
    pub event_id: uuid::Uuid,
    pub service: String,
    /// Every attempted action, in chain order. Ends at the first success.
    pub actions: Vec<RecoveryAction>,
    pub recovered: bool,
    pub completed_at: DateTime<Utc>,
}

impl ChainOutcome {
    /// `(strategy, reason)` for every failed attempt, for escalation detail.
    pub fn failure_reasons(&self) -> Vec<(RecoveryStrategy, String)> {
        self.actions
            .iter()
            .filter(|a| a.status == ActionStatus::Failed)
            .map(|a| {
                (
                    a.strategy,
                    a.result_detail.clone().unwrap_or_else(|| "unknown".to_string()),
                )
            })
            .collect()
    }
}

/// Executor statistics
#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub chains_run: AtomicU64,
    pub chains_recovered: AtomicU64,
    pub chains_exhausted: AtomicU64,
    pub attempts: AtomicU64,
}

/// Drives strategy chains: strictly sequential per chain, serialized per
/// service, bounded per attempt.
pub struct RecoveryExecutor {
    config: RecoveryConfig,
    runner: Arc<dyn StrategyRunner>,
    /// One async mutex per service. Two chains for the same service must not
    /// interleave: both might be adjusting the same pool or breaker.
    service_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    stats: ExecutorStats,
}

impl RecoveryExecutor {
    pub fn new(config: RecoveryConfig, runner: Arc<dyn StrategyRunner>) -> Self {
        Self {
            config,
            runner,
            service_locks: Mutex::new(HashMap::new()),
            stats: ExecutorStats::default(),
        }
    }

    fn service_lock(&self, service: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.service_locks
            .lock()
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run the chain for one event. Strategies execute one at a time; the
    /// chain stops at the first success or when every strategy has failed or
    /// timed out. Never blocks past the per-attempt timeout.
    pub async fn run_chain(
        &self,
        event: &ErrorEvent,
        classification: &Classification,
    ) -> ChainOutcome {
        let lock = self.service_lock(&event.service);
        let _guard = lock.lock().await;

        self.stats.chains_run.fetch_add(1, Ordering::Relaxed);

        let ctx = RecoveryContext {
            event_id: event.id,
            service: event.service.clone(),
            error_type: event.error_type.clone(),
        };

        let attempt_budget = Duration::from_secs(self.config.strategy_timeout_secs);
        let mut actions = Vec::with_capacity(classification.chain.len());
        let mut recovered = false;

        for strategy in &classification.chain {
            let mut action = RecoveryAction::new(event.id, *strategy);
            action.begin();
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            let attempt = self.attempt(*strategy, &action.parameters, &ctx);
            match timeout(attempt_budget, attempt).await {
                Ok(Ok(detail)) => {
                    info!(
                        service = %event.service,
                        strategy = %strategy,
                        "recovery strategy succeeded"
                    );
                    action.succeed(detail);
                    actions.push(action);
                    recovered = true;
                    break;
                }
                Ok(Err(err)) => {
                    warn!(
                        service = %event.service,
                        strategy = %strategy,
                        error = %err,
                        "recovery strategy failed, advancing chain"
                    );
                    action.fail(err.to_string());
                    actions.push(action);
                }
                Err(_elapsed) => {
                    let err = RecoveryError::StrategyTimeout {
                        strategy: strategy.name().to_string(),
                        seconds: self.config.strategy_timeout_secs,
                    };
                    warn!(
                        service = %event.service,
                        strategy = %strategy,
                        "recovery strategy timed out, advancing chain"
                    );
                    action.fail(err.to_string());
                    actions.push(action);
                }
            }
        }

        if recovered {
            self.stats.chains_recovered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.chains_exhausted.fetch_add(1, Ordering::Relaxed);
        }

        ChainOutcome {
            event_id: event.id,
            service: event.service.clone(),
            actions,
            recovered,
            completed_at: Utc::now(),
        }
    }

    async fn attempt(
        &self,
        strategy: RecoveryStrategy,
        parameters: &Map<String, Value>,
        ctx: &RecoveryContext,
    ) -> Result<String, RecoveryError> {
        match strategy {
            RecoveryStrategy::Retry => self.retry_with_backoff(parameters, ctx).await,
            other => self.runner.run(other, parameters, ctx).await,
        }
    }

    /// Retry is one chain slot but embeds its own bounded backoff loop:
    /// exponentially growing delay with jitter, capped attempts, capped delay.
    async fn retry_with_backoff(
        &self,
        parameters: &Map<String, Value>,
        ctx: &RecoveryContext,
    ) -> Result<String, RecoveryError> {
        let max_attempts = self.config.retry_max_attempts.max(1);
        let mut delay = Duration::from_millis(self.config.retry_base_delay_ms);
        let max_delay = Duration::from_millis(self.config.retry_max_delay_ms);
        let mut last_error = RecoveryError::StrategyFailed {
            strategy: "retry".to_string(),
            reason: "no attempts made".to_string(),
        };

        for attempt in 1..=max_attempts {
            match self
                .runner
                .run(RecoveryStrategy::Retry, parameters, ctx)
                .await
            {
                Ok(detail) => {
                    return Ok(format!("{detail} (attempt {attempt}/{max_attempts})"));
                }
                Err(err) => {
                    last_error = err;
                    if attempt < max_attempts {
                        let jitter_cap = (delay.as_millis() as u64 / 2).max(1);
                        let jitter = rand::rng().random_range(0..=jitter_cap);
                        sleep(delay + Duration::from_millis(jitter)).await;
                        delay = (delay * 2).min(max_delay);
                    }
                }
            }
        }

        Err(last_error)
    }

    pub fn summary(&self) -> ExecutorSummary {
        let run = self.stats.chains_run.load(Ordering::Relaxed);
        let recovered = self.stats.chains_recovered.load(Ordering::Relaxed);
        ExecutorSummary {
            chains_run: run,
            chains_recovered: recovered,
            chains_exhausted: self.stats.chains_exhausted.load(Ordering::Relaxed),
            attempts: self.stats.attempts.load(Ordering::Relaxed),
            recovery_rate: if run > 0 {
                recovered as f64 / run as f64
            } else {
                0.0
            },
        }
    }
}

/// Executor summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSummary {
    pub chains_run: u64,
    pub chains_recovered: u64,
    pub chains_exhausted: u64,
    pub attempts: u64,
    pub recovery_rate: f64,
}
