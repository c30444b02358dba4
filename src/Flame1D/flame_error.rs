use crate::Providers::provider_api::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlameError {
    /// malformed or out-of-range run parameters, raised before any solver object exists
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Property evaluation failed: {0}")]
    PropertyEvaluationFailure(String),
    #[error("Newton iteration diverged: {0}")]
    NewtonDivergence(String),
    #[error("Grid refinement limit exceeded: {points} points requested, maximum is {max_points}")]
    RefinementLimitExceeded { points: usize, max_points: usize },
    #[error("Singular Jacobian at column {column}")]
    SingularJacobian { column: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<ProviderError> for FlameError {
    fn from(err: ProviderError) -> Self {
        FlameError::PropertyEvaluationFailure(err.to_string())
    }
}

impl FlameError {
    /// short tag used in run summaries
    pub fn kind(&self) -> &'static str {
        match self {
            FlameError::InvalidInput(_) => "InvalidInput",
            FlameError::PropertyEvaluationFailure(_) => "PropertyEvaluationFailure",
            FlameError::NewtonDivergence(_) => "NewtonDivergence",
            FlameError::RefinementLimitExceeded { .. } => "RefinementLimitExceeded",
            FlameError::SingularJacobian { .. } => "SingularJacobian",
            FlameError::Io(_) => "Io",
            FlameError::Serde(_) => "Serde",
        }
    }
}
