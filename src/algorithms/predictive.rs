use crate::algorithms::gradient_descent::GradientDescent;
use crate::algorithms::{Algorithm, RunContext, Strategy, StrategyOutput};
use crate::error::OptimizationError;
use crate::kbp::{extract_features, DosePredictor};
use crate::routines::evaluation::objective::ObjectiveFunction;
use crate::routines::settings::Settings;
use crate::structs::goal::{Goal, GoalKind};
use crate::structs::weights::Weights;

/// Knowledge-based warm start followed by a shortened gradient descent
///
/// The predictor estimates the achievable dose of each structure. Every beam is scored by the
/// objective its dose alone would reach against those estimates, and beams with lower scores
/// start with more weight. When no predictor is set, or features or prediction fail, the search
/// falls back to a full gradient descent from the given start.
pub struct Predictive<'p> {
    settings: Settings,
    predictor: Option<&'p dyn DosePredictor>,
}

impl<'p> Predictive<'p> {
    pub fn new(settings: &Settings, predictor: Option<&'p dyn DosePredictor>) -> Self {
        Self {
            settings: settings.clone(),
            predictor,
        }
    }

    /// Gradient descent used after a successful warm start
    fn refinement(&self) -> GradientDescent {
        let parameters = &self.settings.parameters;
        let fraction = self.settings.predictive.iteration_fraction;
        let iterations = ((parameters.max_iterations as f64 * fraction).ceil() as usize).max(1);
        let learning_rate = parameters.learning_rate * self.settings.predictive.learning_rate_factor;
        GradientDescent::new(&self.settings).with_budget(iterations, learning_rate)
    }

    /// Initial weights from the predicted achievable doses
    pub fn warm_start(
        &self,
        objective: &ObjectiveFunction<'_>,
    ) -> Result<Weights, OptimizationError> {
        let predictor = self.predictor.ok_or_else(|| {
            OptimizationError::Prediction("no dose prediction model is set".to_string())
        })?;
        let features = extract_features(objective.registry(), objective.goals())?;
        let predicted = predictor
            .predict(&features)
            .map_err(|e| OptimizationError::Prediction(format!("{:#}", e)))?;
        if predicted.is_empty() {
            return Err(OptimizationError::Prediction(
                "the model returned no predictions".to_string(),
            ));
        }

        let targets = objective
            .goals()
            .iter()
            .map(|goal| match predicted.get(goal.structure_name()) {
                Some(&dose)
                    if !matches!(goal.kind(), GoalKind::UniformDose | GoalKind::Conformity) =>
                {
                    goal.with_dose_value(dose)
                }
                _ => Ok(goal.clone()),
            })
            .collect::<Result<Vec<Goal>, _>>()?;
        let predicted_objective = objective.with_goals(&targets);

        let n = objective.n_beams();
        let mut scores = Vec::with_capacity(n);
        for beam in 0..n {
            let mut alone = vec![0.0; n];
            alone[beam] = 1.0;
            scores.push(predicted_objective.value(&alone)?);
        }
        tracing::debug!("Beam scores against predicted doses: {:?}", scores);

        let mean = scores.iter().sum::<f64>() / n as f64;
        if !(mean > 0.0) || !mean.is_finite() {
            return Ok(Weights::uniform(n));
        }
        let raw: Weights = scores
            .iter()
            .map(|s| 1.0 / (1.0 + s / mean))
            .collect::<Vec<f64>>()
            .into();
        raw.normalized().ok_or(OptimizationError::EmptyWeights)
    }
}

impl Strategy for Predictive<'_> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Predictive
    }

    fn run(
        &mut self,
        objective: &ObjectiveFunction<'_>,
        start: &Weights,
        ctx: &mut RunContext<'_>,
    ) -> Result<StrategyOutput, OptimizationError> {
        match self.warm_start(objective) {
            Ok(initial) => {
                tracing::info!("Predicted initial weights: {:?}", initial.to_vec());
                self.refinement().run(objective, &initial, ctx)
            }
            Err(e) => {
                tracing::warn!("{}; falling back to gradient descent", e);
                GradientDescent::new(&self.settings).run(objective, start, ctx)
            }
        }
    }
}
