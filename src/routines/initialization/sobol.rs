use ndarray::Array2;
use sobol_burley::{sample, NUM_DIMENSIONS};

/// Generates a 2-dimensional array containing a Sobol sequence within the given ranges.
///
/// This function samples the space using a Sobol sequence of `points` points, distributed along `ranges.len()` dimensions.
/// It provides the initial population of the evolutionary search, so the weight space is covered evenly from the start.
///
/// Dimensions beyond the generator's limit reuse the lower dimensions with a decorrelating seed.
///
/// # Returns
///
/// A 2D array where each row is a point in the Sobol sequence, and each column corresponds to a beam.
/// The value in each column is scaled to be within the corresponding range.
pub fn generate(points: usize, ranges: &[(f64, f64)], seed: u64) -> Array2<f64> {
    let dims = NUM_DIMENSIONS as usize;
    Array2::from_shape_fn((points, ranges.len()), |(i, j)| {
        let block = (j / dims) as u64;
        let scrambler = (seed.wrapping_add(block.wrapping_mul(0x9E37_79B9)) & 0xFFFF_FFFF) as u32;
        let unscaled = sample(i as u32, (j % dims) as u32, scrambler) as f64;
        let (lower, upper) = ranges[j];
        lower + unscaled * (upper - lower)
    })
}
