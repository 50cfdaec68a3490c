use serde::{Deserialize, Serialize};

use crate::error::OptimizationError;
use crate::structs::weights::Weights;

pub mod sobol;

/// Where a search starts in weight space
///
/// - `Uniform`: every beam gets the same weight
/// - `Weights`: caller-supplied weights, clamped and normalized before use
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq, Default)]
pub enum StartingPoint {
    #[default]
    Uniform,
    Weights(Weights),
}

impl StartingPoint {
    /// Resolve to a normalized weight vector for `n_beams` beams
    pub fn resolve(&self, n_beams: usize) -> Result<Weights, OptimizationError> {
        match self {
            StartingPoint::Uniform => {
                if n_beams == 0 {
                    return Err(OptimizationError::EmptyWeights);
                }
                Ok(Weights::uniform(n_beams))
            }
            StartingPoint::Weights(weights) => {
                if weights.len() != n_beams {
                    return Err(OptimizationError::Solver(format!(
                        "Initial weights have {} entries, but there are {} beams",
                        weights.len(),
                        n_beams
                    )));
                }
                weights.normalized().ok_or(OptimizationError::EmptyWeights)
            }
        }
    }
}
