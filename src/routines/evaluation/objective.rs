//! Goal penalties and the priority-scaled objective
//!
//! Each goal maps a dose matrix to a non-negative penalty, zero when the goal is met.
//! Goals are grouped by priority and each group's weighted sum is scaled by `10^(6 - priority)`
//! before being added to the total, so a higher priority group (lower number) dominates every
//! group below it.

use std::collections::BTreeMap;

use argmin::core::{CostFunction, Gradient};
use ndarray::{Array3, ArrayView1};
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};

use crate::error::OptimizationError;
use crate::routines::evaluation::gradient::forward_difference;
use crate::structs::beams::BeamDoseSet;
use crate::structs::goal::{Goal, GoalKind};
use crate::structs::structures::{Structure, StructureRegistry};

/// Fraction of the target dose used as conformity reference when no volume value is given
const DEFAULT_CONFORMITY_LEVEL: f64 = 0.95;

/// Why a goal could not be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The goal names a structure that is not registered
    MissingStructure,
    /// The structure is registered but has no voxels
    EmptyStructure,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingStructure => write!(f, "structure not found"),
            SkipReason::EmptyStructure => write!(f, "structure has no voxels"),
        }
    }
}

/// Outcome of evaluating one goal against a dose matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assessment {
    Evaluated {
        /// Non-negative penalty, zero when the goal is met
        penalty: f64,
        /// The dose metric the goal constrains, e.g. the minimum dose for [GoalKind::MinDose]
        actual: f64,
    },
    Skipped(SkipReason),
}

impl Assessment {
    /// Penalty contributed to the objective; skipped goals contribute nothing
    pub fn penalty(&self) -> f64 {
        match self {
            Assessment::Evaluated { penalty, .. } => *penalty,
            Assessment::Skipped(_) => 0.0,
        }
    }
}

/// Value a goal's `actual` metric is compared against when reporting
pub fn target_value(goal: &Goal) -> f64 {
    match goal.kind() {
        GoalKind::UniformDose => 0.0,
        GoalKind::Conformity => 1.0,
        _ => goal.dose_value(),
    }
}

/// Dose at the DVH level `volume` (percent): the dose received by at least that share of voxels
///
/// `sorted` must be in ascending order.
fn dose_at_volume(sorted: &[f64], volume: f64) -> f64 {
    let n = sorted.len();
    // 100 - v is exact for whole percentages, 1 - v/100 is not
    let index = (n as f64 * (100.0 - volume) / 100.0).floor() as usize;
    sorted[index.min(n - 1)]
}

/// Evaluate a single goal on a dose matrix
pub fn assess(
    goal: &Goal,
    dose: &Array3<f64>,
    registry: &StructureRegistry,
) -> Result<Assessment, OptimizationError> {
    let structure = match registry.get(goal.structure_name()) {
        Some(structure) => structure,
        None => return Ok(Assessment::Skipped(SkipReason::MissingStructure)),
    };
    assess_structure(goal, dose, structure)
}

pub(crate) fn assess_structure(
    goal: &Goal,
    dose: &Array3<f64>,
    structure: &Structure,
) -> Result<Assessment, OptimizationError> {
    if goal.kind() == GoalKind::DoseFallOff {
        return Err(OptimizationError::Unsupported(GoalKind::DoseFallOff));
    }
    if structure.is_empty() {
        return Ok(Assessment::Skipped(SkipReason::EmptyStructure));
    }

    let values: Vec<f64> = structure
        .voxels()
        .iter()
        .map(|&[z, y, x]| dose[[z, y, x]])
        .collect();
    let view = ArrayView1::from(&values[..]);
    let target = goal.dose_value();

    let (penalty, actual) = match goal.kind() {
        GoalKind::MinDose => {
            let min = *view.min_skipnan();
            ((target - min).max(0.0).powi(2), min)
        }
        GoalKind::MaxDose => {
            let max = *view.max_skipnan();
            ((max - target).max(0.0).powi(2), max)
        }
        GoalKind::MeanDose => {
            let mean = view.sum() / values.len() as f64;
            ((mean - target).max(0.0).powi(2), mean)
        }
        GoalKind::MinDvh | GoalKind::MaxDvh => {
            let volume = goal
                .volume_value()
                .ok_or(crate::error::GoalError::MissingVolumeValue(goal.kind()))?;
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let level = dose_at_volume(&sorted, volume);
            let excess = if goal.kind() == GoalKind::MinDvh {
                target - level
            } else {
                level - target
            };
            (excess.max(0.0).powi(2), level)
        }
        GoalKind::UniformDose => {
            let variance = view.var(0.0);
            (variance, variance.sqrt())
        }
        GoalKind::Conformity => {
            let reference = match goal.volume_value() {
                Some(v) => v / 100.0 * target,
                None => DEFAULT_CONFORMITY_LEVEL * target,
            };
            let treated = dose.iter().filter(|&&d| d >= reference).count() as f64;
            let own = structure.voxel_count() as f64;
            let ratio = treated / own;
            ((ratio - 1.0).powi(2), ratio)
        }
        GoalKind::DoseFallOff => return Err(OptimizationError::Unsupported(GoalKind::DoseFallOff)),
    };

    Ok(Assessment::Evaluated { penalty, actual })
}

/// Scaling applied to the summed penalty of a priority group
pub fn priority_scale(priority: u32) -> f64 {
    10f64.powi(6 - priority.min(i32::MAX as u32) as i32)
}

/// The priority-weighted objective over a set of goals and beams
///
/// Weights passed in are clamped at zero and normalized to sum to one before the dose is
/// formed, so every strategy sees the same relative-weight semantics.
#[derive(Debug, Clone)]
pub struct ObjectiveFunction<'a> {
    goals: &'a [Goal],
    registry: &'a StructureRegistry,
    beams: &'a BeamDoseSet,
}

impl<'a> ObjectiveFunction<'a> {
    pub fn new(goals: &'a [Goal], registry: &'a StructureRegistry, beams: &'a BeamDoseSet) -> Self {
        Self {
            goals,
            registry,
            beams,
        }
    }

    /// The same problem restricted to another set of goals
    pub fn with_goals<'s>(&'s self, goals: &'s [Goal]) -> ObjectiveFunction<'s> {
        ObjectiveFunction {
            goals,
            registry: self.registry,
            beams: self.beams,
        }
    }

    pub fn goals(&self) -> &'a [Goal] {
        self.goals
    }

    pub fn registry(&self) -> &'a StructureRegistry {
        self.registry
    }

    pub fn beams(&self) -> &'a BeamDoseSet {
        self.beams
    }

    pub fn n_beams(&self) -> usize {
        self.beams.len()
    }

    /// Dose for a weighting, after clamping and normalization
    pub fn dose(&self, weights: &[f64]) -> Array3<f64> {
        let clamped: Vec<f64> = weights.iter().map(|w| w.max(0.0)).collect();
        let sum: f64 = clamped.iter().sum();
        let mut dose = self.beams.combine(&clamped);
        if sum > 0.0 {
            dose /= sum;
        }
        dose
    }

    /// Total objective for a weighting
    pub fn value(&self, weights: &[f64]) -> Result<f64, OptimizationError> {
        self.aggregate(&self.dose(weights))
    }

    /// Objective for weights that project onto the simplex
    ///
    /// `f64::INFINITY` when no weight is positive, since the zero dose would trivially meet
    /// every upper-bound goal.
    pub fn value_on_simplex(&self, weights: &[f64]) -> Result<f64, OptimizationError> {
        if weights.iter().any(|&w| w > 0.0) {
            self.value(weights)
        } else {
            Ok(f64::INFINITY)
        }
    }

    /// Total objective for a dose matrix
    pub fn aggregate(&self, dose: &Array3<f64>) -> Result<f64, OptimizationError> {
        let mut groups: BTreeMap<u32, f64> = BTreeMap::new();
        for goal in self.goals {
            let penalty = assess(goal, dose, self.registry)?.penalty();
            *groups.entry(goal.priority()).or_insert(0.0) += penalty * goal.weight();
        }
        Ok(groups
            .iter()
            .map(|(&priority, &sum)| sum * priority_scale(priority))
            .sum())
    }

    /// Penalty of each goal for a weighting, in goal order
    pub fn penalties(&self, weights: &[f64]) -> Result<Vec<f64>, OptimizationError> {
        let dose = self.dose(weights);
        self.goals
            .iter()
            .map(|goal| assess(goal, &dose, self.registry).map(|a| a.penalty()))
            .collect()
    }

    /// Forward-difference gradient of [ObjectiveFunction::value]
    pub fn gradient(&self, weights: &[f64]) -> Result<Vec<f64>, OptimizationError> {
        forward_difference(self, weights)
    }
}

impl CostFunction for ObjectiveFunction<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.value(param)?)
    }
}

impl Gradient for ObjectiveFunction<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        Ok(forward_difference(self, param)?)
    }
}
