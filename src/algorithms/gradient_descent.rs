use crate::algorithms::{Algorithm, RunContext, Status, Strategy, StrategyOutput};
use crate::error::OptimizationError;
use crate::routines::evaluation::objective::ObjectiveFunction;
use crate::routines::settings::Settings;
use crate::structs::weights::Weights;

/// Times the step is halved before concluding that no descent step exists
const MAX_BACKTRACKS: usize = 30;

/// Projected gradient descent on the beam weights
///
/// Each iteration steps against the finite-difference gradient, clamps at zero and renormalizes.
/// When the full step would raise the objective it is halved until it does not, so the
/// objective trace never increases.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl GradientDescent {
    pub fn new(settings: &Settings) -> Self {
        Self {
            learning_rate: settings.parameters.learning_rate,
            max_iterations: settings.parameters.max_iterations,
            tolerance: settings.parameters.tolerance,
        }
    }

    /// Same search with another iteration budget and learning rate
    pub fn with_budget(mut self, max_iterations: usize, learning_rate: f64) -> Self {
        self.max_iterations = max_iterations;
        self.learning_rate = learning_rate;
        self
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// First candidate along `-gradient` that does not raise the objective
    fn descend(
        &self,
        objective: &ObjectiveFunction<'_>,
        weights: &Weights,
        gradient: &[f64],
        current: f64,
    ) -> Result<Option<(Weights, f64)>, OptimizationError> {
        let mut step = self.learning_rate;
        for _ in 0..=MAX_BACKTRACKS {
            let stepped: Weights = weights
                .iter()
                .zip(gradient)
                .map(|(w, g)| (w - step * g).max(0.0))
                .collect::<Vec<f64>>()
                .into();
            if let Some(candidate) = stepped.normalized() {
                let value = objective.value(candidate.as_slice())?;
                if value <= current {
                    return Ok(Some((candidate, value)));
                }
            }
            step *= 0.5;
        }
        Ok(None)
    }
}

impl Strategy for GradientDescent {
    fn algorithm(&self) -> Algorithm {
        Algorithm::GradientDescent
    }

    fn run(
        &mut self,
        objective: &ObjectiveFunction<'_>,
        start: &Weights,
        ctx: &mut RunContext<'_>,
    ) -> Result<StrategyOutput, OptimizationError> {
        let mut weights = start.normalized().ok_or(OptimizationError::EmptyWeights)?;
        let mut value = objective.value(weights.as_slice())?;
        let mut trace = vec![value];

        for iteration in 0..self.max_iterations {
            ctx.report(iteration, value, weights.as_slice());
            if ctx.should_stop(&trace, iteration) {
                tracing::info!("Stopped by the stopping criteria at iteration {}", iteration);
                return Ok(StrategyOutput {
                    weights,
                    trace,
                    iterations: iteration,
                    status: Status::Stopped,
                });
            }

            if value == 0.0 {
                tracing::debug!("All goals met at iteration {}", iteration);
                return Ok(StrategyOutput {
                    weights,
                    trace,
                    iterations: iteration,
                    status: Status::Converged,
                });
            }

            let gradient = objective.gradient(weights.as_slice())?;
            let (candidate, next) = match self.descend(objective, &weights, &gradient, value)? {
                Some(step) => step,
                None => {
                    tracing::debug!("No descent step found at iteration {}", iteration);
                    return Ok(StrategyOutput {
                        weights,
                        trace,
                        iterations: iteration + 1,
                        status: Status::Converged,
                    });
                }
            };

            let improvement = (value - next) / value.abs();
            weights = candidate;
            value = next;
            trace.push(value);

            if iteration % 10 == 0 {
                tracing::debug!("Iteration {}: objective = {:.6}", iteration, value);
            }

            if improvement < self.tolerance {
                tracing::info!("Converged after {} iterations", iteration + 1);
                return Ok(StrategyOutput {
                    weights,
                    trace,
                    iterations: iteration + 1,
                    status: Status::Converged,
                });
            }
        }

        tracing::info!(
            "Reached the maximum of {} iterations, objective = {:.6}",
            self.max_iterations,
            value
        );
        Ok(StrategyOutput {
            weights,
            trace,
            iterations: self.max_iterations,
            status: Status::Exhausted,
        })
    }
}
