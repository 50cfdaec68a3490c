//! Goal-based beam weight optimization for radiotherapy treatment planning
//!
//! Clinical objectives ([Goal](structs::goal::Goal)s) on named structures are turned into a
//! priority-weighted penalty on the dose, which is the weighted sum of per-beam dose matrices.
//! A [GoalOptimizer](optimizer::GoalOptimizer) searches the beam weights with one of several
//! strategies (see [Algorithm](algorithms::Algorithm)) and reports per-goal achievement.
//!
//! ```no_run
//! use ndarray::Array3;
//! use rtopt::prelude::*;
//!
//! let mut optimizer = GoalOptimizer::with_algorithm(Algorithm::GradientDescent);
//! optimizer.add_structure("PTV", Array3::from_elem((1, 1, 10), true))?;
//! optimizer.set_beam_doses(vec![
//!     Array3::from_elem((1, 1, 10), 30.0),
//!     Array3::from_elem((1, 1, 10), 10.0),
//! ])?;
//! optimizer.add_goal(Goal::builder("PTV", GoalKind::MinDose, 35.0).build()?);
//!
//! match optimizer.optimize() {
//!     Outcome::Completed(result) => result.save("outputs/result.json")?,
//!     Outcome::Failed(failure) => eprintln!("{}", failure),
//! }
//! # Ok::<(), eyre::Report>(())
//! ```

/// Search strategies and their dispatch
pub mod algorithms;
/// Typed errors
pub mod error;
/// Knowledge-based planning features and dose prediction
pub mod kbp;
/// The optimization driver
pub mod optimizer;
/// Evaluation, settings, logging, output and progress routines
pub mod routines;
/// Core data structures
pub mod structs;

pub mod prelude {
    pub use crate::algorithms::{Algorithm, BaseStrategy, Status};
    pub use crate::error::{GoalError, OptimizationError};
    pub use crate::kbp::{DosePredictor, FeatureVector, LinearDosePredictor, LinearModel};
    pub use crate::optimizer::GoalOptimizer;
    pub use crate::routines::evaluation::objective::{
        assess, Assessment, ObjectiveFunction, SkipReason,
    };
    pub use crate::routines::logger::setup_log;
    pub use crate::routines::output::{Failure, GoalEvaluation, OptimizationResult, Outcome};
    pub use crate::routines::progress::{ProgressEvent, ProgressReporter};
    pub use crate::routines::settings::{self, Settings};
    pub use crate::structs::beams::BeamDoseSet;
    pub use crate::structs::goal::{Goal, GoalKind, GoalRecord};
    pub use crate::structs::structures::{Structure, StructureRegistry};
    pub use crate::structs::weights::Weights;
}
