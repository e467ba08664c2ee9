use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnomalyError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown sensitivity: {0}")]
    UnknownSensitivity(String),
}
