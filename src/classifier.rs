//! Error Classification
//!
//! Maps a raw error event to a severity tier and an ordered chain of recovery
//! strategies. Classification is a pure function: the same
//! `(error_type, context)` always yields the same result, which keeps the
//! recovery path testable end to end.
//!
//! Raw `error_type` strings resolve through a tagged category enum rather
//! than loose string matching. The built-in table covers the common families;
//! deployments extend it through [`ClassifierConfig`] overrides, which are
//! validated at load time so an unknown category name is a configuration
//! error instead of a silent mismatch. Error types absent from the table fall
//! to the `Unknown` category - low severity with the generic retry/fallback
//! chain, never dropped.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::errors::{ClassifyError, Result};
use crate::event::Severity;
use crate::recovery::RecoveryStrategy;

/// Tagged error category. Each category carries a severity tier and a default
/// strategy ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Memory, disk, pool, or quota exhaustion. The service is starving.
    ResourceExhaustion,
    /// Operations that exceeded their deadline.
    Timeout,
    /// Refused, reset, or unreachable peers.
    Connectivity,
    /// Rejected input or schema mismatch.
    Validation,
    /// Application logic and dependency contract failures.
    Logic,
    /// Anything not in the table. Fails closed to low severity.
    Unknown,
}

impl ErrorCategory {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "resource_exhaustion" => Some(Self::ResourceExhaustion),
            "timeout" => Some(Self::Timeout),
            "connectivity" => Some(Self::Connectivity),
            "validation" => Some(Self::Validation),
            "logic" => Some(Self::Logic),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceExhaustion => "resource_exhaustion",
            Self::Timeout => "timeout",
            Self::Connectivity => "connectivity",
            Self::Validation => "validation",
            Self::Logic => "logic",
            Self::Unknown => "unknown",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::ResourceExhaustion => Severity::Critical,
            Self::Timeout | Self::Connectivity => Severity::High,
            Self::Validation | Self::Logic => Severity::Medium,
            Self::Unknown => Severity::Low,
        }
    }

    /// Default strategy ordering for this category. Categories may reorder
    /// within their severity bucket: connection-class errors try a plain
    /// retry before tripping the circuit breaker.
    pub fn strategy_chain(&self) -> Vec<RecoveryStrategy> {
        match self {
            Self::ResourceExhaustion => vec![
                RecoveryStrategy::PoolIncrease,
                RecoveryStrategy::ResourceScale,
                RecoveryStrategy::ServiceRestart,
            ],
            Self::Timeout => vec![
                RecoveryStrategy::TimeoutIncrease,
                RecoveryStrategy::CacheClear,
                RecoveryStrategy::CircuitBreak,
            ],
            Self::Connectivity => vec![
                RecoveryStrategy::Retry,
                RecoveryStrategy::CircuitBreak,
                RecoveryStrategy::ServiceFallback,
            ],
            Self::Validation | Self::Logic => vec![
                RecoveryStrategy::ServiceFallback,
                RecoveryStrategy::RequestThrottle,
            ],
            Self::Unknown => vec![RecoveryStrategy::Retry, RecoveryStrategy::ServiceFallback],
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in raw error-type → category table.
static BUILTIN_CATEGORIES: Lazy<HashMap<&'static str, ErrorCategory>> = Lazy::new(|| {
    use ErrorCategory::*;
    HashMap::from([
        ("MemoryError", ResourceExhaustion),
        ("OutOfMemoryError", ResourceExhaustion),
        ("DiskFullError", ResourceExhaustion),
        ("DatabaseError", ResourceExhaustion),
        ("PoolExhaustedError", ResourceExhaustion),
        ("ResourceExhaustedError", ResourceExhaustion),
        ("TimeoutError", Timeout),
        ("ConnectionTimeout", Timeout),
        ("DatabaseTimeout", Timeout),
        ("RequestTimeout", Timeout),
        ("GatewayTimeout", Timeout),
        ("ConnectionError", Connectivity),
        ("ConnectionRefused", Connectivity),
        ("ConnectionReset", Connectivity),
        ("NetworkError", Connectivity),
        ("BrokenPipeError", Connectivity),
        ("ServiceUnavailableError", Connectivity),
        ("ValidationError", Validation),
        ("SchemaValidationError", Validation),
        ("IntegrityError", Validation),
        ("ValueError", Validation),
        ("APIError", Logic),
        ("HTTPError", Logic),
        ("AuthenticationError", Logic),
        ("KeyError", Logic),
        ("TypeError", Logic),
        ("AssertionError", Logic),
    ])
});

/// Result of classifying one error event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub chain: Vec<RecoveryStrategy>,
}

/// Maps error events to `(severity, strategy_chain)`.
pub struct ErrorClassifier {
    table: HashMap<String, ErrorCategory>,
}

impl ErrorClassifier {
    /// Build a classifier from the built-in table plus validated config
    /// overrides. Unknown category names in the overrides fail construction.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let mut table: HashMap<String, ErrorCategory> = BUILTIN_CATEGORIES
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();

        for (error_type, category_name) in &config.category_overrides {
            let category =
                ErrorCategory::from_name(category_name).ok_or_else(|| ClassifyError::UnknownCategory {
                    name: category_name.clone(),
                })?;
            table.insert(error_type.clone(), category);
        }

        Ok(Self { table })
    }

    /// Classify an error type. Pure: no state is read besides the immutable
    /// table, so identical inputs always produce identical output.
    pub fn classify(&self, error_type: &str, _context: &Map<String, Value>) -> Classification {
        let category = match self.table.get(error_type) {
            Some(category) => *category,
            None => {
                debug!(error_type, "unrecognized error type, defaulting to low severity");
                ErrorCategory::Unknown
            }
        };

        Classification {
            category,
            severity: category.severity(),
            chain: category.strategy_chain(),
        }
    }

    /// The category an error type resolves to, for callers that only need
    /// the bucket (e.g. recommendation text).
    pub fn category_of(&self, error_type: &str) -> ErrorCategory {
        self.table
            .get(error_type)
            .copied()
            .unwrap_or(ErrorCategory::Unknown)
    }
}
