// Finite-difference gradient of the objective
pub mod gradient;
// Goal penalties and their priority-scaled aggregation
pub mod objective;
