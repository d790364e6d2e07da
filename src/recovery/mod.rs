//! Recovery Execution
//!
//! Given a classified error and its strategy chain, this module drives the
//! chain one strategy at a time until something works or nothing is left:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Recovery Executor                         │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐   │
//! │  │ Strategy      │  │ Attempt       │  │ Per-Service   │   │
//! │  │ Chain         │  │ Timeouts      │  │ Serialization │   │
//! │  └───────────────┘  └───────────────┘  └───────────────┘   │
//! │           │                  │                  │           │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        StrategyRunner (infrastructure seam)          │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each attempt is a `RecoveryAction` record walking a bounded state machine
//! (pending → executing → succeeded | failed). The executor owns sequencing,
//! timing, and outcome recording; the actual infrastructure changes happen
//! behind the [`StrategyRunner`](strategies::StrategyRunner) trait.

pub mod executor;
pub mod strategies;

pub use executor::{ChainOutcome, RecoveryExecutor};
pub use strategies::{RecoveryContext, StrategyRunner, TracingRunner};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// The ten recovery strategies. Their resource-adjustment mechanics live
/// behind the runner seam; this enum is the vocabulary of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    TimeoutIncrease,
    CacheClear,
    PoolIncrease,
    ResourceScale,
    CircuitBreak,
    ServiceFallback,
    QueuePriority,
    RequestThrottle,
    ServiceRestart,
}

impl RecoveryStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::TimeoutIncrease => "timeout_increase",
            Self::CacheClear => "cache_clear",
            Self::PoolIncrease => "pool_increase",
            Self::ResourceScale => "resource_scale",
            Self::CircuitBreak => "circuit_break",
            Self::ServiceFallback => "service_fallback",
            Self::QueuePriority => "queue_priority",
            Self::RequestThrottle => "request_throttle",
            Self::ServiceRestart => "service_restart",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "retry" => Some(Self::Retry),
            "timeout_increase" => Some(Self::TimeoutIncrease),
            "cache_clear" => Some(Self::CacheClear),
            "pool_increase" => Some(Self::PoolIncrease),
            "resource_scale" => Some(Self::ResourceScale),
            "circuit_break" => Some(Self::CircuitBreak),
            "service_fallback" => Some(Self::ServiceFallback),
            "queue_priority" => Some(Self::QueuePriority),
            "request_throttle" => Some(Self::RequestThrottle),
            "service_restart" => Some(Self::ServiceRestart),
            _ => None,
        }
    }

    /// Declared parameter defaults for this strategy, recorded on the action
    /// for audit and passed to the runner.
    pub fn default_parameters(&self) -> Map<String, Value> {
        let value = match self {
            Self::Retry => json!({
                "max_attempts": 3,
                "base_delay_ms": 100,
                "exponential_backoff": true,
            }),
            Self::TimeoutIncrease => json!({
                "current_timeout_ms": 5_000,
                "new_timeout_ms": 15_000,
            }),
            Self::CacheClear => json!({
                "scope": "service",
                "graceful": true,
            }),
            Self::PoolIncrease => json!({
                "resource": "db_connection_pool",
                "current_size": 10,
                "new_size": 25,
            }),
            Self::ResourceScale => json!({
                "resource_type": "cpu",
                "scale_factor": 1.5,
            }),
            Self::CircuitBreak => json!({
                "failure_threshold": 5,
                "reset_timeout_secs": 60,
                "half_open_requests": 1,
            }),
            Self::ServiceFallback => json!({
                "fallback_mode": "degraded",
            }),
            Self::QueuePriority => json!({
                "new_priority": "high",
                "boost_factor": 2,
            }),
            Self::RequestThrottle => json!({
                "requests_per_minute": 100,
                "burst_size": 10,
            }),
            Self::ServiceRestart => json!({
                "graceful": true,
                "drain_timeout_secs": 30,
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of one recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Executing,
    Succeeded,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One attempted remedy for an error event. Owned by the executor while the
/// chain runs, then persisted for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub id: Uuid,
    pub event_id: Uuid,
    pub strategy: RecoveryStrategy,
    pub parameters: Map<String, Value>,
    pub status: ActionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_detail: Option<String>,
}

impl RecoveryAction {
    pub fn new(event_id: Uuid, strategy: RecoveryStrategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            strategy,
            parameters: strategy.default_parameters(),
            status: ActionStatus::Pending,
            started_at: None,
            finished_at: None,
            result_detail: None,
        }
    }

    pub(crate) fn begin(&mut self) {
        debug_assert_eq!(self.status, ActionStatus::Pending);
        self.status = ActionStatus::Executing;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn succeed(&mut self, detail: String) {
        debug_assert_eq!(self.status, ActionStatus::Executing);
        self.status = ActionStatus::Succeeded;
        self.finished_at = Some(Utc::now());
        self.result_detail = Some(detail);
    }

    pub(crate) fn fail(&mut self, reason: String) {
        debug_assert_eq!(self.status, ActionStatus::Executing);
        self.status = ActionStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.result_detail = Some(reason);
    }
}
