//! Root-cause ranking against a library of resolved incidents.
//!
//! Similarity is a weighted match over the categorical signature
//! (error type, service, hour-of-day bucket, severity); no inference, just
//! distance. The top-k matches surface their recorded resolutions as
//! candidate causes.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::anomaly::AnomalyRecord;
use crate::analysis::predictor::ErrorPrediction;
use crate::event::{ErrorEvent, Severity};

/// A closed incident with its recorded resolution. The library these build
/// up is the analyzer's only knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedIncident {
    pub id: Uuid,
    pub error_type: String,
    pub service: String,
    pub severity: Severity,
    pub hour_of_day: u32,
    pub resolution: String,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedIncident {
    pub fn new(
        error_type: &str,
        service: &str,
        severity: Severity,
        hour_of_day: u32,
        resolution: &str,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            error_type: error_type.to_string(),
            service: service.to_string(),
            severity,
            hour_of_day: hour_of_day % 24,
            resolution: resolution.to_string(),
            resolved_at,
        }
    }
}

/// The feature signature a query is matched on.
#[derive(Debug, Clone)]
pub struct IncidentSignature {
    pub error_type: String,
    pub service: String,
    pub severity: Severity,
    pub hour_of_day: u32,
}

impl IncidentSignature {
    pub fn from_event(event: &ErrorEvent, severity: Severity) -> Self {
        Self {
            error_type: event.error_type.clone(),
            service: event.service.clone(),
            severity,
            hour_of_day: event.occurred_at.hour(),
        }
    }

    pub fn from_anomaly(record: &AnomalyRecord) -> Self {
        Self {
            error_type: record.metric_name.clone(),
            service: record.service.clone(),
            severity: record.severity_level,
            hour_of_day: record.detected_at.hour(),
        }
    }

    pub fn from_prediction(prediction: &ErrorPrediction) -> Self {
        Self {
            error_type: prediction.predicted_error_type.clone(),
            service: prediction.service.clone(),
            severity: Severity::High,
            hour_of_day: prediction.predicted_at.hour(),
        }
    }
}

/// One ranked candidate cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateCause {
    pub incident_id: Uuid,
    pub resolution: String,
    pub similarity: f64,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityWeights {
    pub error_type: f64,
    pub service: f64,
    pub severity: f64,
    pub hour: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            error_type: 0.40,
            service: 0.25,
            severity: 0.15,
            hour: 0.20,
        }
    }
}

pub struct RootCauseAnalyzer {
    weights: SimilarityWeights,
    top_k: usize,
}

impl RootCauseAnalyzer {
    pub fn new(top_k: usize) -> Self {
        Self {
            weights: SimilarityWeights::default(),
            top_k: top_k.max(1),
        }
    }

    pub fn with_weights(top_k: usize, weights: SimilarityWeights) -> Self {
        Self {
            weights,
            top_k: top_k.max(1),
        }
    }

    /// Rank candidate causes: similarity descending, ties broken by recency.
    pub fn analyze(
        &self,
        query: &IncidentSignature,
        library: &[ResolvedIncident],
    ) -> Vec<CandidateCause> {
        let mut candidates: Vec<CandidateCause> = library
            .iter()
            .map(|incident| CandidateCause {
                incident_id: incident.id,
                resolution: incident.resolution.clone(),
                similarity: self.similarity(query, incident),
                resolved_at: incident.resolved_at,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.resolved_at.cmp(&a.resolved_at))
        });
        candidates.truncate(self.top_k);
        candidates
    }

    fn similarity(&self, query: &IncidentSignature, incident: &ResolvedIncident) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;
        if query.error_type == incident.error_type {
            score += w.error_type;
        }
        if query.service == incident.service {
            score += w.service;
        }
        // Severity distance over the four tiers.
        let severity_gap = (query.severity as i64 - incident.severity as i64).abs() as f64;
        score += w.severity * (1.0 - severity_gap / 3.0);
        // Circular hour-of-day distance, 12 hours apart = fully dissimilar.
        let raw_gap = (query.hour_of_day as i64 - incident.hour_of_day as i64).rem_euclid(24);
        let hour_gap = raw_gap.min(24 - raw_gap) as f64;
        score += w.hour * (1.0 - hour_gap / 12.0);
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn library(now: DateTime<Utc>) -> Vec<ResolvedIncident> {
        vec![
            ResolvedIncident::new(
                "DatabaseTimeout",
                "checkout",
                Severity::High,
                14,
                "connection pool exhausted by nightly export; pool raised to 40",
                now - Duration::days(3),
            ),
            ResolvedIncident::new(
                "DatabaseTimeout",
                "search",
                Severity::High,
                3,
                "slow query on unindexed column; index added",
                now - Duration::days(10),
            ),
            ResolvedIncident::new(
                "ValidationError",
                "checkout",
                Severity::Medium,
                14,
                "client sent legacy payload after deploy; tolerant parser shipped",
                now - Duration::days(1),
            ),
        ]
    }

    fn query() -> IncidentSignature {
        IncidentSignature {
            error_type: "DatabaseTimeout".to_string(),
            service: "checkout".to_string(),
            severity: Severity::High,
            hour_of_day: 14,
        }
    }

    #[test]
    fn test_exact_signature_ranks_first() {
        let now = Utc::now();
        let causes = RootCauseAnalyzer::new(3).analyze(&query(), &library(now));

        assert_eq!(causes.len(), 3);
        assert!(causes[0].resolution.contains("pool raised"));
        assert!((causes[0].similarity - 1.0).abs() < 1e-9);
        assert!(causes[0].similarity > causes[1].similarity);
        assert!(causes[1].similarity >= causes[2].similarity);
    }

    #[test]
    fn test_top_k_truncates() {
        let now = Utc::now();
        let causes = RootCauseAnalyzer::new(2).analyze(&query(), &library(now));
        assert_eq!(causes.len(), 2);
    }

    #[test]
    fn test_tie_broken_by_recency() {
        let now = Utc::now();
        let older = ResolvedIncident::new(
            "TimeoutError",
            "api",
            Severity::High,
            10,
            "older resolution",
            now - Duration::days(30),
        );
        let newer = ResolvedIncident::new(
            "TimeoutError",
            "api",
            Severity::High,
            10,
            "newer resolution",
            now - Duration::days(2),
        );
        let query = IncidentSignature {
            error_type: "TimeoutError".to_string(),
            service: "api".to_string(),
            severity: Severity::High,
            hour_of_day: 10,
        };

        let causes = RootCauseAnalyzer::new(2).analyze(&query, &[older, newer]);
        assert_eq!(causes[0].resolution, "newer resolution");
    }

    #[test]
    fn test_empty_library_yields_no_candidates() {
        let causes = RootCauseAnalyzer::new(3).analyze(&query(), &[]);
        assert!(causes.is_empty());
    }

    #[test]
    fn test_hour_distance_is_circular() {
        let analyzer = RootCauseAnalyzer::new(1);
        let at_23 = ResolvedIncident::new(
            "APIError",
            "api",
            Severity::Medium,
            23,
            "near-midnight fix",
            Utc::now(),
        );
        let at_11 = ResolvedIncident::new(
            "APIError",
            "api",
            Severity::Medium,
            11,
            "mid-day fix",
            Utc::now(),
        );
        let query = IncidentSignature {
            error_type: "APIError".to_string(),
            service: "api".to_string(),
            severity: Severity::Medium,
            hour_of_day: 1,
        };

        // 23:00 is two hours from 01:00 around the clock; 11:00 is ten away.
        let causes = analyzer.analyze(&query, &[at_11, at_23]);
        assert_eq!(causes[0].resolution, "near-midnight fix");
    }

    #[test]
    fn test_signature_constructors() {
        let event = ErrorEvent::new("checkout", "ConnectionError", "refused");
        let sig = IncidentSignature::from_event(&event, Severity::High);
        assert_eq!(sig.error_type, "ConnectionError");
        assert_eq!(sig.severity, Severity::High);
    }
}
