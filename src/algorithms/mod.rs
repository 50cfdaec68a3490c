use std::str::FromStr;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::OptimizationError;
use crate::kbp::DosePredictor;
use crate::routines::evaluation::objective::ObjectiveFunction;
use crate::routines::progress::ProgressReporter;
use crate::routines::settings::Settings;
use crate::structs::weights::Weights;

use basin_hopping::BasinHopping;
use evolutionary::DifferentialEvolution;
use gradient_descent::GradientDescent;
use hierarchical::Hierarchical;
use predictive::Predictive;

pub mod basin_hopping;
pub mod evolutionary;
pub mod gradient_descent;
pub mod hierarchical;
pub mod predictive;

/// The search strategies a [GoalOptimizer](crate::optimizer::GoalOptimizer) can run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    GradientDescent,
    Evolutionary,
    BasinHopping,
    Hierarchical,
    Predictive,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::GradientDescent => "gradient_descent",
            Algorithm::Evolutionary => "evolutionary",
            Algorithm::BasinHopping => "basin_hopping",
            Algorithm::Hierarchical => "hierarchical",
            Algorithm::Predictive => "predictive",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gradient_descent" | "gd" => Ok(Algorithm::GradientDescent),
            "evolutionary" | "de" => Ok(Algorithm::Evolutionary),
            "basin_hopping" => Ok(Algorithm::BasinHopping),
            "hierarchical" => Ok(Algorithm::Hierarchical),
            "predictive" | "kbp" => Ok(Algorithm::Predictive),
            other => eyre::bail!("Unknown algorithm '{}'", other),
        }
    }
}

/// Strategy run within each stage of [Algorithm::Hierarchical]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BaseStrategy {
    #[default]
    GradientDescent,
    Evolutionary,
    BasinHopping,
}

impl BaseStrategy {
    pub fn build(&self, settings: &Settings) -> Box<dyn Strategy> {
        match self {
            BaseStrategy::GradientDescent => Box::new(GradientDescent::new(settings)),
            BaseStrategy::Evolutionary => Box::new(DifferentialEvolution::new(settings)),
            BaseStrategy::BasinHopping => Box::new(BasinHopping::new(settings)),
        }
    }
}

impl From<BaseStrategy> for Algorithm {
    fn from(base: BaseStrategy) -> Self {
        match base {
            BaseStrategy::GradientDescent => Algorithm::GradientDescent,
            BaseStrategy::Evolutionary => Algorithm::Evolutionary,
            BaseStrategy::BasinHopping => Algorithm::BasinHopping,
        }
    }
}

/// Represents the status of an optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No optimization has been run yet
    Idle,
    /// A search is in progress
    Running,
    /// The search met its convergence criterion
    Converged,
    /// The iteration budget ran out
    Exhausted,
    /// The stopping criteria requested an early stop
    Stopped,
    /// The optimization could not run
    Failed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => write!(f, "Idle"),
            Status::Running => write!(f, "In progress"),
            Status::Converged => write!(f, "Converged"),
            Status::Exhausted => write!(f, "Maximum iterations reached"),
            Status::Stopped => write!(f, "Stopped by stopping criteria"),
            Status::Failed => write!(f, "Failed"),
        }
    }
}

/// Cooperative stop predicate, called once per iteration with the objective history so far and
/// the iteration number
pub type StopCriterion = dyn Fn(&[f64], usize) -> bool + Send + Sync;

/// What a strategy hands back to the driver
#[derive(Debug, Clone)]
pub struct StrategyOutput {
    /// Best weights found, not necessarily normalized
    pub weights: Weights,
    /// Objective per iteration; empty for strategies that keep no trace
    pub trace: Vec<f64>,
    pub iterations: usize,
    pub status: Status,
}

/// Per-run collaborators shared by every strategy
pub struct RunContext<'r> {
    reporter: &'r ProgressReporter,
    stop: Option<&'r StopCriterion>,
    rng: &'r mut StdRng,
    offset: usize,
}

impl<'r> RunContext<'r> {
    pub fn new(
        reporter: &'r ProgressReporter,
        stop: Option<&'r StopCriterion>,
        rng: &'r mut StdRng,
    ) -> Self {
        Self {
            reporter,
            stop,
            rng,
            offset: 0,
        }
    }

    /// A context whose reported iterations are shifted by `offset`, for nested runs
    pub fn with_offset(&mut self, offset: usize) -> RunContext<'_> {
        RunContext {
            reporter: self.reporter,
            stop: self.stop,
            rng: &mut *self.rng,
            offset: self.offset + offset,
        }
    }

    pub fn report(&self, iteration: usize, objective: f64, weights: &[f64]) {
        self.reporter.report(self.offset + iteration, objective, weights);
    }

    pub fn should_stop(&self, history: &[f64], iteration: usize) -> bool {
        match self.stop {
            Some(stop) => stop(history, self.offset + iteration),
            None => false,
        }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut *self.rng
    }
}

/// A search over beam weights minimizing an [ObjectiveFunction]
pub trait Strategy {
    fn algorithm(&self) -> Algorithm;

    fn run(
        &mut self,
        objective: &ObjectiveFunction<'_>,
        start: &Weights,
        ctx: &mut RunContext<'_>,
    ) -> Result<StrategyOutput, OptimizationError>;
}

pub fn dispatch_strategy<'p>(
    settings: &Settings,
    predictor: Option<&'p dyn DosePredictor>,
) -> Box<dyn Strategy + 'p> {
    match settings.config.algorithm {
        Algorithm::GradientDescent => Box::new(GradientDescent::new(settings)),
        Algorithm::Evolutionary => Box::new(DifferentialEvolution::new(settings)),
        Algorithm::BasinHopping => Box::new(BasinHopping::new(settings)),
        Algorithm::Hierarchical => Box::new(Hierarchical::new(settings)),
        Algorithm::Predictive => Box::new(Predictive::new(settings, predictor)),
    }
}
