/// Per-beam dose matrices
pub mod beams;
/// Clinical goals and their validation
pub mod goal;
/// Structure masks on the planning grid
pub mod structures;
/// Beam weight vectors
pub mod weights;
