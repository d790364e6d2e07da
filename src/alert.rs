//! Alerting boundary.
//!
//! The core produces alert requests; delivery (mail, chat, pager) is an
//! external collaborator behind the [`AlertGateway`] trait. Escalations carry
//! the full diagnostic trail - error type, severity, every attempted
//! strategy and its failure reason - so a human picking up after exhausted
//! automation is never short of detail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::analysis::anomaly::AnomalyRecord;
use crate::analysis::predictor::ErrorPrediction;
use crate::errors::Result;
use crate::event::{ErrorEvent, Severity};
use crate::recovery::executor::ChainOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Escalation,
    PredictedError,
    Anomaly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRequest {
    pub kind: AlertKind,
    pub severity: Severity,
    pub service: String,
    pub headline: String,
    /// Anomaly score, when the alert came from the detector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Prediction probability, when the alert came from the predictor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    pub recommended_actions: Vec<String>,
    /// Free-form diagnostic lines (attempted strategies, failure reasons).
    pub detail: Vec<String>,
}

impl AlertRequest {
    /// Escalation after an exhausted chain, one detail line per failed
    /// attempt. `severity` may already be elevated by the caller.
    pub fn escalation(event: &ErrorEvent, severity: Severity, outcome: &ChainOutcome) -> Self {
        let detail = outcome
            .failure_reasons()
            .into_iter()
            .map(|(strategy, reason)| format!("{strategy}: {reason}"))
            .collect();

        Self {
            kind: AlertKind::Escalation,
            severity,
            service: event.service.clone(),
            headline: format!(
                "{} unresolved on {} after {} recovery attempts",
                event.error_type,
                event.service,
                outcome.actions.len()
            ),
            score: None,
            probability: None,
            recommended_actions: vec!["manual investigation required".to_string()],
            detail,
        }
    }

    pub fn predicted_error(prediction: &ErrorPrediction) -> Self {
        Self {
            kind: AlertKind::PredictedError,
            severity: if prediction.probability >= 0.9 {
                Severity::Critical
            } else {
                Severity::High
            },
            service: prediction.service.clone(),
            headline: format!(
                "{} predicted on {} within {} minutes",
                prediction.predicted_error_type,
                prediction.service,
                prediction.time_horizon_minutes
            ),
            score: None,
            probability: Some(prediction.probability),
            recommended_actions: prediction.recommended_actions.clone(),
            detail: vec![format!("confidence {:.2}", prediction.confidence)],
        }
    }

    pub fn anomaly(record: &AnomalyRecord) -> Self {
        let mut detail = vec![format!(
            "{}: expected {:.1}, observed {:.1}",
            record.metric_name, record.expected_value, record.observed_value
        )];
        if let Some(hypothesis) = &record.root_cause_hypothesis {
            detail.push(hypothesis.clone());
        }

        Self {
            kind: AlertKind::Anomaly,
            severity: record.severity_level,
            service: record.service.clone(),
            headline: format!(
                "{} {} on {}",
                record.metric_name, record.anomaly_type, record.service
            ),
            score: Some(record.anomaly_score),
            probability: None,
            recommended_actions: vec!["acknowledge and investigate".to_string()],
            detail,
        }
    }
}

/// Receives alert requests. Transport and formatting live outside the core.
#[async_trait]
pub trait AlertGateway: Send + Sync {
    async fn send(&self, alert: AlertRequest) -> Result<()>;
}

/// Default gateway: structured log lines at a level matching severity.
pub struct TracingAlertGateway;

#[async_trait]
impl AlertGateway for TracingAlertGateway {
    async fn send(&self, alert: AlertRequest) -> Result<()> {
        match alert.severity {
            Severity::Critical | Severity::High => error!(
                service = %alert.service,
                kind = ?alert.kind,
                severity = %alert.severity,
                headline = %alert.headline,
                detail = ?alert.detail,
                "alert"
            ),
            _ => warn!(
                service = %alert.service,
                kind = ?alert.kind,
                severity = %alert.severity,
                headline = %alert.headline,
                "alert"
            ),
        }
        Ok(())
    }
}
