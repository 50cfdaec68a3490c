use argmin::core::{Error, Executor};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use rand::Rng;

use crate::algorithms::{Algorithm, RunContext, Status, Strategy, StrategyOutput};
use crate::error::OptimizationError;
use crate::routines::evaluation::objective::ObjectiveFunction;
use crate::routines::settings::Settings;
use crate::structs::weights::Weights;

/// History length of the L-BFGS approximation
const LBFGS_MEMORY: usize = 7;

/// Basin hopping: L-BFGS local minimizations joined by random hops
///
/// A hop perturbs every weight uniformly within `stepsize`, minimizes locally and is accepted
/// by the Metropolis criterion at `temperature`. The trace holds the best objective after
/// each hop.
#[derive(Debug, Clone)]
pub struct BasinHopping {
    hops: usize,
    temperature: f64,
    stepsize: f64,
    local_iterations: u64,
    tolerance: f64,
}

impl BasinHopping {
    pub fn new(settings: &Settings) -> Self {
        Self {
            hops: settings.parameters.max_iterations,
            temperature: settings.basin_hopping.temperature,
            stepsize: settings.basin_hopping.stepsize,
            local_iterations: settings.basin_hopping.local_iterations,
            tolerance: settings.parameters.tolerance,
        }
    }

    fn lbfgs(&self, objective: &ObjectiveFunction<'_>, x0: Vec<f64>) -> Result<Vec<f64>, Error> {
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, LBFGS_MEMORY).with_tolerance_grad(self.tolerance)?;

        let res = Executor::new(objective.clone(), solver)
            .configure(|state| state.param(x0.clone()).max_iters(self.local_iterations))
            .run()?;

        Ok(res.state().best_param.clone().unwrap_or(x0))
    }

    /// Local minimum near `x0`, projected to non-negative weights
    ///
    /// A failing local search leaves the point where it was. A point with no positive weight
    /// scores `f64::INFINITY` and is never accepted.
    fn local_minimize(
        &self,
        objective: &ObjectiveFunction<'_>,
        x0: Vec<f64>,
    ) -> Result<(Vec<f64>, f64), OptimizationError> {
        let x = match self.lbfgs(objective, x0.clone()) {
            Ok(x) => x,
            Err(e) => {
                tracing::debug!("Local minimization failed: {}", e);
                x0
            }
        };
        let x: Vec<f64> = x.into_iter().map(|w| w.max(0.0)).collect();
        let value = objective.value_on_simplex(&x)?;
        Ok((x, value))
    }
}

impl Strategy for BasinHopping {
    fn algorithm(&self) -> Algorithm {
        Algorithm::BasinHopping
    }

    fn run(
        &mut self,
        objective: &ObjectiveFunction<'_>,
        start: &Weights,
        ctx: &mut RunContext<'_>,
    ) -> Result<StrategyOutput, OptimizationError> {
        let start = start.normalized().ok_or(OptimizationError::EmptyWeights)?;
        let (mut current, mut current_value) = self.local_minimize(objective, start.to_vec())?;
        let mut best = current.clone();
        let mut best_value = current_value;
        let mut trace = Vec::with_capacity(self.hops);

        for hop in 0..self.hops {
            let reported = Weights::from_vec(best.clone());
            let reported = reported.normalized().unwrap_or(reported);
            ctx.report(hop, best_value, reported.as_slice());
            if ctx.should_stop(&trace, hop) {
                tracing::info!("Stopped by the stopping criteria at hop {}", hop);
                return Ok(StrategyOutput {
                    weights: best.into(),
                    trace,
                    iterations: hop,
                    status: Status::Stopped,
                });
            }
            if best_value == 0.0 {
                tracing::debug!("All goals met after {} hops", hop);
                return Ok(StrategyOutput {
                    weights: best.into(),
                    trace,
                    iterations: hop,
                    status: Status::Converged,
                });
            }

            let step = self.stepsize;
            let perturbed: Vec<f64> = current
                .iter()
                .map(|w| w + ctx.rng().random_range(-step..=step))
                .collect();
            let (candidate, value) = self.local_minimize(objective, perturbed)?;

            let accept = value < current_value
                || ctx.rng().random::<f64>() < (-(value - current_value) / self.temperature).exp();
            if accept {
                current = candidate;
                current_value = value;
                if current_value < best_value {
                    best = current.clone();
                    best_value = current_value;
                }
            }
            trace.push(best_value);

            tracing::debug!(
                "Hop {}: objective = {:.6} ({}), best = {:.6}",
                hop,
                value,
                if accept { "accepted" } else { "rejected" },
                best_value
            );
        }

        Ok(StrategyOutput {
            weights: best.into(),
            trace,
            iterations: self.hops,
            status: Status::Exhausted,
        })
    }
}
