use ndarray::{Array3, Zip};

use crate::error::OptimizationError;

/// Per-beam dose matrices, index-aligned with the beam weight vector
///
/// The dose delivered by a weighting is the weighted sum of the matrices. All matrices share
/// the planning grid of the [StructureRegistry](crate::structs::structures::StructureRegistry).
#[derive(Debug, Clone, Default)]
pub struct BeamDoseSet {
    beams: Vec<Array3<f64>>,
}

impl BeamDoseSet {
    pub fn new(beams: Vec<Array3<f64>>) -> Result<Self, OptimizationError> {
        if let Some(first) = beams.first() {
            let expected = first.dim();
            for (i, beam) in beams.iter().enumerate().skip(1) {
                if beam.dim() != expected {
                    return Err(OptimizationError::GridMismatch {
                        what: format!("beam {}", i),
                        expected,
                        found: beam.dim(),
                    });
                }
            }
        }
        Ok(Self { beams })
    }

    pub fn len(&self) -> usize {
        self.beams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }

    pub fn shape(&self) -> Option<(usize, usize, usize)> {
        self.beams.first().map(|b| b.dim())
    }

    pub fn beam(&self, index: usize) -> &Array3<f64> {
        &self.beams[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Array3<f64>> {
        self.beams.iter()
    }

    /// Weighted sum of the beam matrices
    ///
    /// Weights are used as given; clamping and normalization are up to the caller.
    pub fn combine(&self, weights: &[f64]) -> Array3<f64> {
        let shape = self.shape().unwrap_or((0, 0, 0));
        let mut dose = Array3::<f64>::zeros(shape);
        for (beam, &w) in self.beams.iter().zip(weights) {
            if w != 0.0 {
                dose.scaled_add(w, beam);
            }
        }
        dose
    }

    /// Dose of `base` after adding `delta` of one beam and rescaling, written into `out`
    ///
    /// Used to evaluate single-weight perturbations in one pass over the grid.
    pub fn perturb_into(
        &self,
        base: &Array3<f64>,
        index: usize,
        delta: f64,
        scale: f64,
        out: &mut Array3<f64>,
    ) {
        Zip::from(out)
            .and(base)
            .and(&self.beams[index])
            .for_each(|o, &b, &d| *o = (b + delta * d) * scale);
    }
}
