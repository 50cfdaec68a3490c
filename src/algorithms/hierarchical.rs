use std::collections::BTreeSet;

use crate::algorithms::{Algorithm, BaseStrategy, RunContext, Status, Strategy, StrategyOutput};
use crate::error::OptimizationError;
use crate::routines::evaluation::objective::ObjectiveFunction;
use crate::routines::settings::Settings;
use crate::structs::goal::Goal;
use crate::structs::weights::Weights;

/// Relative slack allowed on a higher-priority penalty before a stage is rejected
const REGRESSION_SLACK: f64 = 1e-9;

/// Staged search in increasing priority order
///
/// Stage `p` optimizes all goals with priority `<= p`, starting from the weights of the previous
/// stage. A stage whose weights would raise the penalty of any goal from an earlier stage is
/// discarded, so goals of a higher priority never get worse than when they were optimized on
/// their own.
#[derive(Debug, Clone)]
pub struct Hierarchical {
    base: BaseStrategy,
    settings: Settings,
}

impl Hierarchical {
    pub fn new(settings: &Settings) -> Self {
        Self {
            base: settings.hierarchical.base,
            settings: settings.clone(),
        }
    }

    pub fn base(&self) -> BaseStrategy {
        self.base
    }
}

fn regressed(before: &[f64], after: &[f64]) -> bool {
    before
        .iter()
        .zip(after)
        .any(|(b, a)| *a > b + REGRESSION_SLACK * (1.0 + b.abs()))
}

impl Strategy for Hierarchical {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Hierarchical
    }

    fn run(
        &mut self,
        objective: &ObjectiveFunction<'_>,
        start: &Weights,
        ctx: &mut RunContext<'_>,
    ) -> Result<StrategyOutput, OptimizationError> {
        let goals = objective.goals();
        let priorities: BTreeSet<u32> = goals.iter().map(|g| g.priority()).collect();

        let mut weights = start.normalized().ok_or(OptimizationError::EmptyWeights)?;
        let mut trace = Vec::new();
        let mut iterations = 0;
        let mut status = Status::Converged;

        for &priority in &priorities {
            let stage_goals: Vec<Goal> = goals
                .iter()
                .filter(|g| g.priority() <= priority)
                .cloned()
                .collect();
            let settled: Vec<Goal> = goals
                .iter()
                .filter(|g| g.priority() < priority)
                .cloned()
                .collect();
            tracing::info!(
                "Stage for priority {}: {} goals, base strategy {}",
                priority,
                stage_goals.len(),
                Algorithm::from(self.base)
            );

            let stage = objective.with_goals(&stage_goals);
            let guard = objective.with_goals(&settled);
            let before = guard.penalties(weights.as_slice())?;

            let mut strategy = self.base.build(&self.settings);
            let mut stage_ctx = ctx.with_offset(iterations);
            let out = strategy.run(&stage, &weights, &mut stage_ctx)?;
            iterations += out.iterations;

            match out.weights.normalized() {
                Some(candidate) => {
                    let after = guard.penalties(candidate.as_slice())?;
                    if regressed(&before, &after) {
                        tracing::warn!(
                            "Stage for priority {} degrades a higher priority goal; keeping the previous weights",
                            priority
                        );
                    } else {
                        weights = candidate;
                        trace.extend(out.trace);
                    }
                }
                None => {
                    tracing::warn!(
                        "Stage for priority {} produced no usable weights; keeping the previous weights",
                        priority
                    );
                }
            }

            match out.status {
                Status::Stopped => {
                    status = Status::Stopped;
                    break;
                }
                Status::Exhausted => status = Status::Exhausted,
                _ => {}
            }
        }

        Ok(StrategyOutput {
            weights,
            trace,
            iterations,
            status,
        })
    }
}
