//! Predictive Analysis
//!
//! The parallel track to recovery execution: lightweight statistical models
//! over recent error and metric history.
//!
//! - [`features`] - feature extraction from error-event history
//! - [`anomaly`] - z-score and trend-deviation anomaly scoring
//! - [`predictor`] - error probability, confidence, and horizon estimation
//! - [`forecast`] - exponential-smoothing metric forecasts
//! - [`root_cause`] - similarity ranking against resolved incidents
//! - [`orchestrator`] - the full per-service analysis pass
//!
//! These are heuristics, not learned models: each scoring component sits
//! behind a trait so a heavier implementation can be swapped in through
//! configuration without touching the pipeline.

pub mod anomaly;
pub mod features;
pub mod forecast;
pub mod orchestrator;
pub mod predictor;
pub mod root_cause;

pub use anomaly::{AnomalyDetector, AnomalyRecord, AnomalyScorer, AnomalyType, StatisticalScorer};
pub use features::{FeatureExtractor, FeatureVector};
pub use forecast::{Forecast, ForecastPoint, TimeSeriesForecaster, TrendDirection};
pub use orchestrator::{
    AnalysisReport, Insight, InsightKind, PredictionOrchestrator, PreventiveAction,
    PreventiveStatus,
};
pub use predictor::{ErrorPrediction, ErrorPredictor, PredictionOutcome};
pub use root_cause::{CandidateCause, IncidentSignature, ResolvedIncident, RootCauseAnalyzer};
