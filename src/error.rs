//! Error types for the optimization core.
//!
//! Two failure classes are kept apart:
//! - **Invalid input** (`InvalidRequest`, `InvalidConfig`): rejected before
//!   any optimizer runs.
//! - **Invariant violation**: a programming error inside an optimizer
//!   (empty population, dominated pair in a Pareto front).
//!
//! Infeasible constraints are *not* errors. They surface as violations on
//! the returned [`Schedule`](crate::models::Schedule).

use thiserror::Error;

use crate::validation::ValidationError;

/// Errors returned by the optimizers and the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    /// The request, weather windows or growth calendar failed validation.
    #[error("invalid request: {}", join_messages(.0))]
    InvalidRequest(Vec<ValidationError>),

    /// An algorithm configuration is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An internal invariant was broken.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// Configuration could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(String),
}

impl OptimizerError {
    /// Whether this error was caused by caller input rather than a bug.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::InvalidConfig(_) | Self::ConfigParse(_)
        )
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OptimizerError>;
