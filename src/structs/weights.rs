use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// The relative weight of each beam in the plan.
///
/// This is a thin wrapper around [ndarray::Array1<f64>]. After an optimization the weights
/// are non-negative and sum to one; the absolute dose scale is applied downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    weights: Array1<f64>,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            weights: Array1::zeros(0),
        }
    }
}

impl Weights {
    pub fn new(weights: Array1<f64>) -> Self {
        Self { weights }
    }

    /// Create a new [Weights] instance from a vector of weights.
    pub fn from_vec(weights: Vec<f64>) -> Self {
        Self {
            weights: Array1::from_vec(weights),
        }
    }

    /// Equal weight for each of `n` beams
    pub fn uniform(n: usize) -> Self {
        if n == 0 {
            return Self::default();
        }
        Self {
            weights: Array1::from_elem(n, 1.0 / n as f64),
        }
    }

    /// Get a reference to the weights.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Get a mutable reference to the weights.
    pub fn weights_mut(&mut self) -> &mut Array1<f64> {
        &mut self.weights
    }

    /// Get the number of weights.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.sum()
    }

    /// Get a vector representation of the weights.
    pub fn to_vec(&self) -> Vec<f64> {
        self.weights.to_vec()
    }

    pub fn as_slice(&self) -> &[f64] {
        self.weights
            .as_slice()
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.weights.iter().cloned()
    }

    /// Negative entries set to zero, then scaled to sum to one
    ///
    /// Returns `None` when nothing positive is left to normalize.
    pub fn normalized(&self) -> Option<Weights> {
        let clamped = self.weights.mapv(|w| w.max(0.0));
        let sum = clamped.sum();
        if sum > 0.0 && sum.is_finite() {
            Some(Weights::new(clamped / sum))
        } else {
            None
        }
    }

    /// True when all entries are non-negative and they sum to one within `tolerance`
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        self.weights.iter().all(|&w| w >= 0.0) && (self.sum() - 1.0).abs() <= tolerance
    }
}

impl Serialize for Weights {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_vec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Weights {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let weights_vec = Vec::<f64>::deserialize(deserializer)?;
        Ok(Self::from_vec(weights_vec))
    }
}

impl From<Vec<f64>> for Weights {
    fn from(weights: Vec<f64>) -> Self {
        Self::from_vec(weights)
    }
}

impl From<Array1<f64>> for Weights {
    fn from(weights: Array1<f64>) -> Self {
        Self { weights }
    }
}

impl Index<usize> for Weights {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.weights[index]
    }
}

impl IndexMut<usize> for Weights {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.weights[index]
    }
}
