use thiserror::Error;

/// Failure kinds surfaced by the prediction pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    /// Market data is missing. The predictor recovers from this locally with
    /// the 1-1 draw; other stages report it.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient data for season {season}: {reason}")]
    InsufficientData { season: String, reason: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl PredictError {
    pub fn store(err: anyhow::Error) -> Self {
        PredictError::StoreUnavailable(format!("{err:#}"))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::DataUnavailable(_) => "DataUnavailable",
            PredictError::InvalidInput(_) => "InvalidInput",
            PredictError::InsufficientData { .. } => "InsufficientData",
            PredictError::StoreUnavailable(_) => "StoreUnavailable",
        }
    }
}
