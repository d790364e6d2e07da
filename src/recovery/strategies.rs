//! The infrastructure seam for recovery strategies.
//!
//! A strategy attempt is a side effect against external resources - resizing
//! a pool, tripping a breaker, restarting a unit. Those mechanics belong to
//! the deployment, not to this crate, so the executor drives everything
//! through the [`StrategyRunner`] trait and only records outcomes.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::errors::RecoveryError;
use crate::recovery::RecoveryStrategy;

/// What the runner knows about the failure it is remedying.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub event_id: Uuid,
    pub service: String,
    pub error_type: String,
}

/// Executes one strategy attempt against the infrastructure.
///
/// Implementations must be cancel-safe: the executor wraps every call in a
/// timeout and will abandon an attempt that overruns it.
#[async_trait]
pub trait StrategyRunner: Send + Sync {
    async fn run(
        &self,
        strategy: RecoveryStrategy,
        parameters: &Map<String, Value>,
        ctx: &RecoveryContext,
    ) -> Result<String, RecoveryError>;
}

/// Default runner: emits the intended infrastructure change as a structured
/// log line and reports success. Deployments wire in a real controller.
pub struct TracingRunner;

#[async_trait]
impl StrategyRunner for TracingRunner {
    async fn run(
        &self,
        strategy: RecoveryStrategy,
        parameters: &Map<String, Value>,
        ctx: &RecoveryContext,
    ) -> Result<String, RecoveryError> {
        let detail = match strategy {
            RecoveryStrategy::Retry => "operation retried".to_string(),
            RecoveryStrategy::TimeoutIncrease => format!(
                "timeout raised to {}ms",
                parameters
                    .get("new_timeout_ms")
                    .and_then(Value::as_u64)
                    .unwrap_or(15_000)
            ),
            RecoveryStrategy::CacheClear => "cache cleared".to_string(),
            RecoveryStrategy::PoolIncrease => format!(
                "connection pool grown to {}",
                parameters
                    .get("new_size")
                    .and_then(Value::as_u64)
                    .unwrap_or(25)
            ),
            RecoveryStrategy::ResourceScale => "scale-up requested".to_string(),
            RecoveryStrategy::CircuitBreak => "circuit breaker opened".to_string(),
            RecoveryStrategy::ServiceFallback => "switched to degraded fallback".to_string(),
            RecoveryStrategy::QueuePriority => "queue priority boosted".to_string(),
            RecoveryStrategy::RequestThrottle => "request throttling enabled".to_string(),
            RecoveryStrategy::ServiceRestart => "graceful restart scheduled".to_string(),
        };

        info!(
            service = %ctx.service,
            error_type = %ctx.error_type,
            strategy = %strategy,
            "executing recovery strategy"
        );
        Ok(detail)
    }
}
