use ndarray::Array3;

use crate::error::OptimizationError;
use crate::routines::evaluation::objective::ObjectiveFunction;

/// Step used for the forward difference
pub const FINITE_DIFFERENCE_STEP: f64 = 1e-6;

/// Forward-difference gradient of the objective with respect to each (unnormalized) weight
///
/// The objective clamps and normalizes its weights, so perturbing weight `i` by `h` changes the
/// dose to `(D + δ·B_i) / (S + δ)`, where `D` is the clamped weighted sum, `S` the clamped weight
/// sum and `δ` the change of the clamped weight. Each partial derivative therefore costs a single
/// pass over the grid instead of a full re-summation of all beams.
pub fn forward_difference(
    objective: &ObjectiveFunction<'_>,
    weights: &[f64],
) -> Result<Vec<f64>, OptimizationError> {
    let h = FINITE_DIFFERENCE_STEP;
    let beams = objective.beams();
    let clamped: Vec<f64> = weights.iter().map(|w| w.max(0.0)).collect();
    let sum: f64 = clamped.iter().sum();
    let raw = beams.combine(&clamped);

    let base = if sum > 0.0 { &raw / sum } else { raw.clone() };
    let f0 = objective.aggregate(&base)?;

    let mut perturbed = Array3::<f64>::zeros(raw.dim());
    let mut gradient = vec![0.0; weights.len()];
    for (i, (&w, &c)) in weights.iter().zip(&clamped).enumerate().take(beams.len()) {
        let delta = (w + h).max(0.0) - c;
        if delta == 0.0 {
            continue;
        }
        let total = sum + delta;
        let scale = if total > 0.0 { 1.0 / total } else { 1.0 };
        beams.perturb_into(&raw, i, delta, scale, &mut perturbed);
        let f1 = objective.aggregate(&perturbed)?;
        gradient[i] = (f1 - f0) / h;
    }
    Ok(gradient)
}
