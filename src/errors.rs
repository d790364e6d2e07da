use thiserror::Error;

/// The central error type for the Remedian system.
///
/// This hierarchy enables programmatic recovery and unified error handling
/// across the classification, recovery, and analysis layers.
#[derive(Error, Debug)]
pub enum RemedianError {
    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Alert error: {0}")]
    Alert(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Unknown error category '{name}' in classifier mapping")]
    UnknownCategory { name: String },

    #[error("Category '{category}' maps to an empty strategy chain")]
    EmptyChain { category: String },
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Strategy '{strategy}' timed out after {seconds} seconds")]
    StrategyTimeout { strategy: String, seconds: u64 },

    #[error("Strategy '{strategy}' failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },

    #[error("Unknown recovery strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid action transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient samples: needed {needed}, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    #[error("Unknown anomaly scorer: {0}")]
    UnknownScorer(String),
}

pub type Result<T> = std::result::Result<T, RemedianError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RemedianError::Recovery(RecoveryError::StrategyTimeout {
            strategy: "cache_clear".to_string(),
            seconds: 30,
        });
        assert!(err.to_string().contains("cache_clear"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_error_from_sub_enum() {
        let err: RemedianError = ClassifyError::UnknownCategory {
            name: "bogus".to_string(),
        }
        .into();
        assert!(matches!(err, RemedianError::Classify(_)));
    }

    #[test]
    fn test_error_from_anyhow() {
        let err: RemedianError = anyhow::anyhow!("plumbing failure").into();
        assert!(matches!(err, RemedianError::Other(_)));
    }
}
