use std::collections::BTreeSet;
use std::time::Instant;

use ndarray::{Array1, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::algorithms::{dispatch_strategy, Algorithm, RunContext, Status, StopCriterion};
use crate::error::OptimizationError;
use crate::kbp::DosePredictor;
use crate::routines::evaluation::objective::{assess, target_value, ObjectiveFunction};
use crate::routines::initialization::StartingPoint;
use crate::routines::output::{Failure, GoalEvaluation, OptimizationResult, Outcome};
use crate::routines::progress::{ProgressCallback, ProgressReporter};
use crate::routines::settings::Settings;
use crate::structs::beams::BeamDoseSet;
use crate::structs::goal::{Goal, GoalKind};
use crate::structs::structures::StructureRegistry;
use crate::structs::weights::Weights;

/// Finds beam weights that best satisfy a set of clinical goals
///
/// Register structures and beam doses, add goals, pick an [Algorithm] in the settings and call
/// [GoalOptimizer::optimize]. Each instance owns its own problem; run concurrent optimizations
/// on separate instances.
pub struct GoalOptimizer {
    settings: Settings,
    goals: Vec<Goal>,
    registry: StructureRegistry,
    beams: BeamDoseSet,
    start: StartingPoint,
    reporter: ProgressReporter,
    stop: Option<Box<StopCriterion>>,
    predictor: Option<Box<dyn DosePredictor>>,
    status: Status,
    result: Option<OptimizationResult>,
}

impl GoalOptimizer {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            goals: Vec::new(),
            registry: StructureRegistry::new(),
            beams: BeamDoseSet::default(),
            start: StartingPoint::default(),
            reporter: ProgressReporter::new(),
            stop: None,
            predictor: None,
            status: Status::Idle,
            result: None,
        }
    }

    /// An optimizer running `algorithm` with default settings
    pub fn with_algorithm(algorithm: Algorithm) -> Self {
        let mut settings = Settings::new();
        settings.set_algorithm(algorithm);
        Self::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.settings.set_algorithm(algorithm);
    }

    /// Seed for the stochastic strategies, overriding the one in the settings
    pub fn set_seed(&mut self, seed: u64) {
        self.settings.set_seed(seed);
    }

    pub fn add_structure(
        &mut self,
        name: impl Into<String>,
        mask: Array3<bool>,
    ) -> Result<(), OptimizationError> {
        self.registry.insert(name, mask)
    }

    /// Voxel spacing in mm (z, y, x), used for volumes and distances
    pub fn set_voxel_size(&mut self, voxel_size: [f64; 3]) {
        self.registry.set_voxel_size(voxel_size);
    }

    pub fn set_structures(&mut self, registry: StructureRegistry) {
        self.registry = registry;
    }

    pub fn structures(&self) -> &StructureRegistry {
        &self.registry
    }

    /// Replace the beam dose matrices; any initial weights set earlier are discarded
    pub fn set_beam_doses(&mut self, beams: Vec<Array3<f64>>) -> Result<(), OptimizationError> {
        self.beams = BeamDoseSet::new(beams)?;
        self.start = StartingPoint::Uniform;
        tracing::info!("Set {} beam dose matrices", self.beams.len());
        Ok(())
    }

    pub fn beams(&self) -> &BeamDoseSet {
        &self.beams
    }

    /// Start the search from these weights instead of uniform weights
    pub fn set_initial_weights(&mut self, weights: Vec<f64>) -> Result<(), OptimizationError> {
        if weights.len() != self.beams.len() {
            return Err(OptimizationError::Solver(format!(
                "Initial weights have {} entries, but there are {} beams",
                weights.len(),
                self.beams.len()
            )));
        }
        self.start = StartingPoint::Weights(Weights::from_vec(weights));
        Ok(())
    }

    pub fn add_goal(&mut self, goal: Goal) {
        tracing::info!("Added goal: {}", goal);
        self.goals.push(goal);
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn clear_goals(&mut self) {
        self.goals.clear();
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.reporter = ProgressReporter::with_callback(callback);
    }

    pub fn set_progress_reporter(&mut self, reporter: ProgressReporter) {
        self.reporter = reporter;
    }

    /// Predicate checked once per iteration with the objective history and iteration number;
    /// returning `true` ends the search early
    pub fn set_stopping_criteria<F>(&mut self, criteria: F)
    where
        F: Fn(&[f64], usize) -> bool + Send + Sync + 'static,
    {
        self.stop = Some(Box::new(criteria));
    }

    pub fn set_predictor(&mut self, predictor: Box<dyn DosePredictor>) {
        self.predictor = Some(predictor);
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Result of the last successful optimization
    pub fn result(&self) -> Option<&OptimizationResult> {
        self.result.as_ref()
    }

    /// The objective of the current problem
    pub fn objective(&self) -> ObjectiveFunction<'_> {
        ObjectiveFunction::new(&self.goals, &self.registry, &self.beams)
    }

    /// Dose of the last optimized weights
    pub fn optimized_dose(&self) -> Option<Array3<f64>> {
        let result = self.result.as_ref()?;
        Some(self.beams.combine(result.weights().as_slice()))
    }

    /// Doses inside one structure under the last optimized weights
    pub fn dose_for_structure(&self, name: &str) -> Option<Array1<f64>> {
        let dose = self.optimized_dose()?;
        let structure = self.registry.get(name)?;
        Some(
            structure
                .voxels()
                .iter()
                .map(|&[z, y, x]| dose[[z, y, x]])
                .collect(),
        )
    }

    fn check_preconditions(&self) -> Result<(), String> {
        if let Err(e) = self.settings.validate() {
            return Err(format!("Invalid settings: {}", e));
        }
        if self.goals.is_empty() {
            return Err("No optimization goals defined".to_string());
        }
        if self.beams.is_empty() {
            return Err("No beam dose contributions defined".to_string());
        }
        if self.registry.is_empty() {
            return Err("No structures defined".to_string());
        }
        if let (Some(grid), Some(dose)) = (self.registry.shape(), self.beams.shape()) {
            if grid != dose {
                return Err(format!(
                    "Beam dose grid {:?} does not match the structure grid {:?}",
                    dose, grid
                ));
            }
        }
        if let Some(goal) = self
            .goals
            .iter()
            .find(|g| g.kind() == GoalKind::DoseFallOff)
        {
            return Err(format!(
                "{} (goal '{}')",
                OptimizationError::Unsupported(GoalKind::DoseFallOff),
                goal
            ));
        }
        Ok(())
    }

    fn fail(&mut self, message: String) -> Outcome {
        tracing::error!("{}", message);
        self.status = Status::Failed;
        self.result = None;
        Outcome::Failed(Failure::new(message))
    }

    /// Run the configured strategy
    ///
    /// Missing preconditions and strategy errors are reported as [Outcome::Failed].
    pub fn optimize(&mut self) -> Outcome {
        if let Err(message) = self.check_preconditions() {
            return self.fail(message);
        }

        let missing: BTreeSet<&str> = self
            .goals
            .iter()
            .map(|g| g.structure_name())
            .filter(|name| !self.registry.contains(name))
            .collect();
        for name in &missing {
            tracing::warn!(
                "Structure '{}' not found; its goals are skipped and add no penalty",
                name
            );
        }

        self.status = Status::Running;
        match self.run() {
            Ok(result) => {
                self.status = *result.status();
                self.result = Some(result.clone());
                Outcome::Completed(Box::new(result))
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn run(&self) -> Result<OptimizationResult, OptimizationError> {
        let now = Instant::now();
        let algorithm = self.settings.config.algorithm;
        let seed = self.settings.config.seed;
        tracing::info!(
            "Starting {} with {} beams and {} goals",
            algorithm,
            self.beams.len(),
            self.goals.len()
        );

        let objective = self.objective();
        let start = self.start.resolve(self.beams.len())?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ctx = RunContext::new(&self.reporter, self.stop.as_deref(), &mut rng);
        let mut strategy = dispatch_strategy(&self.settings, self.predictor.as_deref());
        let output = strategy.run(&objective, &start, &mut ctx)?;

        let weights = output.weights.normalized().unwrap_or_else(|| {
            tracing::warn!("Search ended without a positive weight; using uniform weights");
            Weights::uniform(self.beams.len())
        });
        let dose = objective.dose(weights.as_slice());
        let objective_value = objective.aggregate(&dose)?;
        let elapsed = now.elapsed().as_secs_f64();
        tracing::info!(
            "{} finished in {:.2}s after {} iterations ({}), objective = {:.6}",
            algorithm,
            elapsed,
            output.iterations,
            output.status,
            objective_value
        );

        let evaluations = self
            .goals
            .iter()
            .map(|goal| {
                assess(goal, &dose, &self.registry)
                    .map(|a| GoalEvaluation::new(goal, a, target_value(goal)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OptimizationResult::new(
            algorithm,
            self.goals.clone(),
            weights,
            objective_value,
            output.trace,
            elapsed,
            output.iterations,
            output.status,
            self.settings.parameters,
            evaluations,
            seed,
        ))
    }
}

impl Default for GoalOptimizer {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl std::fmt::Debug for GoalOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoalOptimizer")
            .field("algorithm", &self.settings.config.algorithm)
            .field("goals", &self.goals.len())
            .field("structures", &self.registry.names())
            .field("beams", &self.beams.len())
            .field("status", &self.status)
            .finish()
    }
}
