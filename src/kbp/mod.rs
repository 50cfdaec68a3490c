//! Knowledge-based planning: features and dose prediction for the predictive warm start
//!
//! A [DosePredictor] maps a [FeatureVector] to an estimate of the achievable dose for each
//! structure. Models are trained offline; [LinearDosePredictor] evaluates a linear model stored
//! as JSON, and any other model can be plugged in by implementing the trait.

use std::collections::BTreeMap;
use std::path::Path;

use eyre::{bail, Result, WrapErr};
use serde::{Deserialize, Serialize};

pub mod features;

pub use features::{extract_features, FeatureVector};

/// Predicts achievable per-structure doses (Gy) from patient features
pub trait DosePredictor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<BTreeMap<String, f64>>;
}

/// One linear model: `intercept + Σ coefficient · feature`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
}

impl LinearModel {
    pub fn evaluate(&self, features: &FeatureVector) -> Result<f64> {
        let mut value = self.intercept;
        for (name, coefficient) in &self.coefficients {
            match features.get(name) {
                Some(x) => value += coefficient * x,
                None => bail!("Feature '{}' is not available", name),
            }
        }
        Ok(value)
    }
}

/// Linear regression per structure, read from a JSON object of the form
/// `{"Cord": {"intercept": 20.0, "coefficients": {"Cord_distance_to_ptv": -0.5}}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinearDosePredictor {
    models: BTreeMap<String, LinearModel>,
}

impl LinearDosePredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, structure: impl Into<String>, model: LinearModel) -> Self {
        self.models.insert(structure.into(), model);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let predictor: LinearDosePredictor =
            serde_json::from_str(json).wrap_err("Failed to parse dose prediction model")?;
        Ok(predictor)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read dose prediction model {:?}", path))?;
        let predictor = Self::from_json(&json)?;
        tracing::info!(
            "Loaded dose prediction model for {} structures from {:?}",
            predictor.models.len(),
            path
        );
        Ok(predictor)
    }

    pub fn structures(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }
}

impl DosePredictor for LinearDosePredictor {
    fn predict(&self, features: &FeatureVector) -> Result<BTreeMap<String, f64>> {
        self.models
            .iter()
            .map(|(structure, model)| {
                let dose = model
                    .evaluate(features)
                    .wrap_err_with(|| format!("Model for '{}'", structure))?;
                Ok((structure.clone(), dose.max(0.0)))
            })
            .collect()
    }
}
