//! Core event and metric types shared across the fault-response pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Discrete urgency tier driving alerting and strategy ordering.
///
/// Variants are ordered so that `Low < Medium < High < Critical`, which lets
/// severity comparisons and elevation read naturally.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Elevate one tier, saturating at critical.
    pub fn elevated(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High => Severity::Critical,
            Severity::Critical => Severity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An observed application error, as delivered by the error-capture boundary.
///
/// Immutable once constructed; downstream components read it but never write
/// back. `context` is an arbitrary-depth JSON map carried verbatim from the
/// capture side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub id: Uuid,
    pub service: String,
    pub error_type: String,
    /// Severity as seeded by the capture boundary. The classifier assigns its
    /// own severity from the error type; the seed is kept for audit.
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
    /// Response time of the failed operation, when the boundary captured one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ErrorEvent {
    pub fn new(service: &str, error_type: &str, message: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            service: service.to_string(),
            error_type: error_type.to_string(),
            severity: Severity::Low,
            message: message.to_string(),
            context: Map::new(),
            occurred_at: Utc::now(),
            response_time_ms: None,
            endpoint: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }
}

/// One numeric observation from the metrics boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub at: DateTime<Utc>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(at: DateTime<Utc>, value: f64) -> Self {
        Self { at, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_elevated_caps_at_critical() {
        assert_eq!(Severity::Low.elevated(), Severity::Medium);
        assert_eq!(Severity::High.elevated(), Severity::Critical);
        assert_eq!(Severity::Critical.elevated(), Severity::Critical);
    }

    #[test]
    fn test_severity_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        let parsed: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(parsed, Severity::High);
    }

    #[test]
    fn test_error_event_builder() {
        let event = ErrorEvent::new("checkout", "ConnectionTimeout", "upstream timed out")
            .with_severity(Severity::High)
            .with_context("pool", serde_json::json!({"in_use": 10}))
            .with_response_time(1400)
            .with_endpoint("/api/orders");

        assert_eq!(event.service, "checkout");
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.response_time_ms, Some(1400));
        assert!(event.context.contains_key("pool"));
    }

    #[test]
    fn test_error_event_roundtrip() {
        let event = ErrorEvent::new("api", "ValidationError", "bad payload");
        let json = serde_json::to_string(&event).unwrap();
        let back: ErrorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.error_type, "ValidationError");
    }
}
