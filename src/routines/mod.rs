// Routines for evaluating the objective
pub mod evaluation;
// Routines for initialization
pub mod initialization;
// Routines for logging
pub mod logger;
// Routines for output
pub mod output;
// Routines for progress reporting
pub mod progress;
// Routines for settings
pub mod settings;
