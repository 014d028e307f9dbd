use thiserror::Error;

/// Error type for the heatscape engine.
///
/// Projecting beyond the fitted domain is deliberately absent: extrapolation always
/// succeeds numerically and is only reported as a notice.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeatscapeError {
    #[error("Insufficient data for a fit. Required at least {required} distinct points, got {found}")]
    InsufficientData { required: usize, found: usize },
    #[error("Malformed data: {0}")]
    DataError(String),
    #[error("Invalid input: {0}")]
    ValidationError(String),
    #[error("{collaborator} is unavailable: {details}")]
    CollaboratorUnavailable {
        collaborator: String,
        details: String,
    },
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl HeatscapeError {
    pub fn collaborator(collaborator: &str, details: impl ToString) -> Self {
        HeatscapeError::CollaboratorUnavailable {
            collaborator: collaborator.to_string(),
            details: details.to_string(),
        }
    }
}

/// Convenience type for `Result<T, HeatscapeError>`.
pub type HeatscapeResult<T> = Result<T, HeatscapeError>;
