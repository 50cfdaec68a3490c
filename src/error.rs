use thiserror::Error;

use crate::structs::goal::GoalKind;

/// Raised when a [Goal](crate::structs::goal::Goal) is constructed from invalid input.
///
/// Goals are never coerced into a valid state, construction fails instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GoalError {
    #[error("Invalid goal kind: '{0}'")]
    InvalidGoalKind(String),

    #[error("Goal kind '{0}' requires a volume value")]
    MissingVolumeValue(GoalKind),

    #[error("Invalid value for '{name}': {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Errors raised while assembling or running an optimization
#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error(transparent)]
    Goal(#[from] GoalError),

    #[error("Grid mismatch for {what}: expected {expected:?}, got {found:?}")]
    GridMismatch {
        what: String,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("Goal kind '{0}' is not yet supported by the objective evaluator")]
    Unsupported(GoalKind),

    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("Dose prediction failed: {0}")]
    Prediction(String),

    #[error("Solver failed: {0}")]
    Solver(String),

    #[error("Beam weights are empty or sum to zero")]
    EmptyWeights,
}
