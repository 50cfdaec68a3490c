use std::collections::BTreeMap;
use std::fs::{create_dir_all, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::algorithms::{Algorithm, Status};
use crate::routines::evaluation::objective::{Assessment, SkipReason};
use crate::routines::settings::Parameters;
use crate::structs::goal::Goal;
use crate::structs::weights::Weights;
use csv::WriterBuilder;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

/// A goal counts as satisfied when its final penalty is below this value
pub const SATISFACTION_THRESHOLD: f64 = 0.01;

/// Achievement of one goal under the final weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalEvaluation {
    pub goal: Goal,
    /// `None` when the goal was evaluated, otherwise why it was skipped
    #[serde(default)]
    pub skipped: Option<SkipReason>,
    /// Final penalty; absent for skipped goals
    #[serde(default)]
    pub value: Option<f64>,
    /// The dose metric the goal constrains; absent for skipped goals
    #[serde(default)]
    pub actual_value: Option<f64>,
    pub target_value: f64,
    pub is_satisfied: bool,
    pub description: String,
}

impl GoalEvaluation {
    pub fn new(goal: &Goal, assessment: Assessment, target_value: f64) -> Self {
        let description = goal.to_string();
        match assessment {
            Assessment::Evaluated { penalty, actual } => {
                let is_satisfied = penalty < SATISFACTION_THRESHOLD;
                tracing::info!(
                    "Goal: {} - {} (penalty = {:.6})",
                    description,
                    if is_satisfied { "satisfied" } else { "NOT satisfied" },
                    penalty
                );
                GoalEvaluation {
                    goal: goal.clone(),
                    skipped: None,
                    value: Some(penalty),
                    actual_value: Some(actual),
                    target_value,
                    is_satisfied,
                    description,
                }
            }
            Assessment::Skipped(reason) => {
                tracing::info!("Goal: {} - skipped ({})", description, reason);
                GoalEvaluation {
                    goal: goal.clone(),
                    skipped: Some(reason),
                    value: None,
                    actual_value: None,
                    target_value,
                    is_satisfied: false,
                    description,
                }
            }
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// Key each evaluation by `structure_kind`, suffixing repeated keys with `_2`, `_3`, ...
pub fn keyed_evaluations(
    evaluations: Vec<GoalEvaluation>,
) -> BTreeMap<String, GoalEvaluation> {
    let mut map = BTreeMap::new();
    for evaluation in evaluations {
        let base = evaluation.goal.key();
        let mut key = base.clone();
        let mut n = 1;
        while map.contains_key(&key) {
            n += 1;
            key = format!("{}_{}", base, n);
        }
        map.insert(key, evaluation);
    }
    map
}

/// Defines the result of a completed optimization
///
/// Serializes to the persisted plan record: `algorithm`, `goals`, `optimized_weights`,
/// `objective_value`, `optimization_time`, `iterations`, `parameters` and `goal_evaluation`,
/// alongside the objective trace, final status, seed and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    algorithm: Algorithm,
    goals: Vec<Goal>,
    #[serde(rename = "optimized_weights")]
    weights: Weights,
    objective_value: f64,
    #[serde(default, alias = "convergence_history")]
    objective_trace: Vec<f64>,
    /// Wall time in seconds
    optimization_time: f64,
    iterations: usize,
    status: Status,
    parameters: Parameters,
    goal_evaluation: BTreeMap<String, GoalEvaluation>,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    created: String,
}

#[allow(clippy::too_many_arguments)]
impl OptimizationResult {
    pub fn new(
        algorithm: Algorithm,
        goals: Vec<Goal>,
        weights: Weights,
        objective_value: f64,
        objective_trace: Vec<f64>,
        optimization_time: f64,
        iterations: usize,
        status: Status,
        parameters: Parameters,
        evaluations: Vec<GoalEvaluation>,
        seed: u64,
    ) -> Self {
        Self {
            algorithm,
            goals,
            weights,
            objective_value,
            objective_trace,
            optimization_time,
            iterations,
            status,
            parameters,
            goal_evaluation: keyed_evaluations(evaluations),
            seed,
            created: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn objective_value(&self) -> f64 {
        self.objective_value
    }

    pub fn objective_trace(&self) -> &[f64] {
        &self.objective_trace
    }

    pub fn optimization_time(&self) -> f64 {
        self.optimization_time
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn goal_evaluation(&self) -> &BTreeMap<String, GoalEvaluation> {
        &self.goal_evaluation
    }

    /// Evaluation of a goal by its key, e.g. `PTV_min_dose`
    pub fn evaluation(&self, key: &str) -> Option<&GoalEvaluation> {
        self.goal_evaluation.get(key)
    }

    /// True when every goal was evaluated and satisfied
    pub fn all_satisfied(&self) -> bool {
        self.goal_evaluation.values().all(|e| e.is_satisfied)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn created(&self) -> &str {
        &self.created
    }

    /// Write the result as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let serialized = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)
                    .wrap_err_with(|| format!("Failed to create directories for {:?}", parent))?;
            }
        }
        std::fs::write(path, serialized)
            .wrap_err_with(|| format!("Failed to write result to {:?}", path))?;
        tracing::info!("Saved optimization result to {:?}", path);
        Ok(())
    }

    /// Read a result previously written by [OptimizationResult::save]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).wrap_err_with(|| format!("Failed to open result file {:?}", path))?;
        let result: OptimizationResult = serde_json::from_reader(std::io::BufReader::new(file))
            .wrap_err_with(|| format!("Failed to parse result file {:?}", path))?;
        Ok(result)
    }

    /// Writes the objective trace as `iteration,objective` to `trace.csv` in `folder`
    pub fn write_trace(&self, folder: &str) -> Result<PathBuf> {
        tracing::debug!("Writing objective trace...");
        let outputfile = OutputFile::new(folder, "trace.csv")?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(outputfile.file());

        writer.write_record(["iteration", "objective"])?;
        for (iteration, value) in self.objective_trace.iter().enumerate() {
            writer.write_record(&[iteration.to_string(), value.to_string()])?;
        }
        writer.flush()?;
        Ok(outputfile.relative_path().to_path_buf())
    }
}

/// Why an optimization could not run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub message: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Failure {
            success: false,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Optimization failed: {}", self.message)
    }
}

/// Returned by [GoalOptimizer::optimize](crate::optimizer::GoalOptimizer::optimize)
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Box<OptimizationResult>),
    Failed(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn result(&self) -> Option<&OptimizationResult> {
        match self {
            Outcome::Completed(result) => Some(result),
            Outcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Failed(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> std::result::Result<OptimizationResult, Failure> {
        match self {
            Outcome::Completed(result) => Ok(*result),
            Outcome::Failed(failure) => Err(failure),
        }
    }
}

/// Contains all the necessary information of an output file
#[derive(Debug)]
pub struct OutputFile {
    file: File,
    relative_path: PathBuf,
}

impl OutputFile {
    pub fn new(folder: &str, file_name: &str) -> Result<Self> {
        let relative_path = Path::new(&folder).join(file_name);

        if let Some(parent) = relative_path.parent() {
            create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create directories for {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&relative_path)
            .wrap_err_with(|| format!("Failed to open file: {:?}", relative_path))?;

        Ok(OutputFile {
            file,
            relative_path,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_owned(self) -> File {
        self.file
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }
}
