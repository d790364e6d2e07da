//! Remedian - automated fault response.
//!
//! Given an observed application error, classify its severity, run a chain of
//! recovery strategies until one works, and - on a parallel track - use
//! lightweight statistical models to detect anomalies, predict future errors,
//! and recommend preventive actions.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Fault-Response Engine                        │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐        │
//! │  │ Error         │  │ Recovery      │  │ Alert         │        │
//! │  │ Classifier    │  │ Executor      │  │ Gateway       │        │
//! │  └───────────────┘  └───────────────┘  └───────────────┘        │
//! │           │                  │                  │                │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐        │
//! │  │ Anomaly       │  │ Error         │  │ Time-Series   │        │
//! │  │ Detector      │  │ Predictor     │  │ Forecaster    │        │
//! │  └───────────────┘  └───────────────┘  └───────────────┘        │
//! │           └────────── Prediction Orchestrator ──────────┘        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The "models" here are statistical heuristics - z-score thresholds,
//! exponential smoothing, rule-based classifiers - behind trait seams, so a
//! heavier implementation can be swapped in via configuration.
//!
//! # Quick Start
//!
//! ```ignore
//! use remedian::{FaultResponseEngine, RemedianConfig, ErrorEvent};
//! use remedian::recovery::TracingRunner;
//! use remedian::alert::TracingAlertGateway;
//! use std::sync::Arc;
//!
//! let engine = FaultResponseEngine::new(
//!     RemedianConfig::default(),
//!     Arc::new(TracingRunner),
//!     Arc::new(TracingAlertGateway),
//! )?;
//! let handled = engine
//!     .handle_error(ErrorEvent::new("checkout", "ConnectionTimeout", "upstream timed out"))
//!     .await?;
//! ```

pub mod alert;
pub mod analysis;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod errors;
pub mod event;
pub mod recovery;
pub mod scheduler;
pub mod store;
pub mod telemetry;

pub use alert::{AlertGateway, AlertKind, AlertRequest, TracingAlertGateway};
pub use analysis::{AnalysisReport, PredictionOrchestrator};
pub use classifier::{Classification, ErrorCategory, ErrorClassifier};
pub use config::RemedianConfig;
pub use engine::{FaultResponseEngine, HandledError};
pub use errors::{RemedianError, Result};
pub use event::{ErrorEvent, MetricSample, Severity};
pub use recovery::{ChainOutcome, RecoveryExecutor, RecoveryStrategy, StrategyRunner};
pub use scheduler::AnalysisScheduler;
pub use store::{AnomalyFilter, Store};
