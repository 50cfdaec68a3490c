use crate::algorithms::{Algorithm, BaseStrategy};
use crate::routines::output::OutputFile;
use config::Config as eConfig;
use eyre::{bail, Result};
use serde::{Deserialize, Serialize};

/// Contains all settings for a beam weight optimization
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// General configuration settings
    pub config: Config,
    /// Search budget and hyperparameters shared by the strategies
    pub parameters: Parameters,
    /// Options for differential evolution
    pub evolutionary: Evolutionary,
    /// Options for basin hopping
    pub basin_hopping: BasinHopping,
    /// Options for the staged, priority ordered search
    pub hierarchical: Hierarchical,
    /// Options for the knowledge-based warm start
    pub predictive: Predictive,
    /// Configuration for logging
    pub log: Log,
    /// Configuration for the output files
    pub output: Output,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        self.parameters.validate()?;
        self.evolutionary.validate()?;
        self.basin_hopping.validate()?;
        self.predictive.validate()?;
        Ok(())
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.config.algorithm = algorithm;
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.config.seed = seed;
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.parameters.max_iterations = max_iterations;
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.parameters.tolerance = tolerance;
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.parameters.learning_rate = learning_rate;
    }

    pub fn set_population_size(&mut self, population_size: usize) {
        self.parameters.population_size = population_size;
    }

    pub fn set_mutation_rate(&mut self, mutation_rate: f64) {
        self.parameters.mutation_rate = mutation_rate;
    }

    pub fn set_hierarchical_base(&mut self, base: BaseStrategy) {
        self.hierarchical.base = base;
    }

    pub fn set_log_level(&mut self, level: impl Into<String>) {
        self.log.level = level.into();
    }

    /// Set the log file name, `None` disables the file layer
    pub fn set_log_file(&mut self, file: Option<String>) {
        self.log.file = file;
    }

    pub fn set_output_path(&mut self, path: impl Into<String>) {
        self.output.path = path.into();
    }
}

/// General configuration settings
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Denotes the search strategy to use
    pub algorithm: Algorithm,
    /// Seed for the random number generator of the stochastic strategies
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: Algorithm::GradientDescent,
            seed: 22,
        }
    }
}

/// Search budget and hyperparameters
///
/// These are the run parameters persisted with every [OptimizationResult](crate::routines::output::OptimizationResult).
#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Parameters {
    /// Iteration budget (generations for differential evolution, hops for basin hopping)
    pub max_iterations: usize,
    /// Relative improvement below which a search is considered converged
    pub tolerance: f64,
    /// Step size of gradient descent
    pub learning_rate: f64,
    /// Number of candidates in the differential evolution population
    pub population_size: usize,
    /// Differential weight of differential evolution
    pub mutation_rate: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            max_iterations: 100,
            tolerance: 1e-4,
            learning_rate: 0.1,
            population_size: 50,
            mutation_rate: 0.2,
        }
    }
}

impl Parameters {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            bail!("The iteration budget must be positive");
        }
        if !(self.tolerance > 0.0) {
            bail!("Tolerance must be positive, got {}", self.tolerance);
        }
        if !(self.learning_rate > 0.0) {
            bail!("Learning rate must be positive, got {}", self.learning_rate);
        }
        if self.population_size < 4 {
            bail!(
                "Population size must be at least 4, got {}",
                self.population_size
            );
        }
        if !(self.mutation_rate > 0.0 && self.mutation_rate <= 2.0) {
            bail!(
                "Mutation rate must be in (0, 2], got {}",
                self.mutation_rate
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Evolutionary {
    /// Probability of taking each coordinate from the mutant vector
    pub crossover_rate: f64,
}

impl Default for Evolutionary {
    fn default() -> Self {
        Evolutionary {
            crossover_rate: 0.7,
        }
    }
}

impl Evolutionary {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            bail!(
                "Crossover rate must be in [0, 1], got {}",
                self.crossover_rate
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct BasinHopping {
    /// Temperature of the Metropolis acceptance test
    pub temperature: f64,
    /// Maximum displacement of each weight in a hop
    pub stepsize: f64,
    /// Iteration budget of each local L-BFGS minimization
    pub local_iterations: u64,
}

impl Default for BasinHopping {
    fn default() -> Self {
        BasinHopping {
            temperature: 1.0,
            stepsize: 0.1,
            local_iterations: 50,
        }
    }
}

impl BasinHopping {
    pub fn validate(&self) -> Result<()> {
        if !(self.temperature > 0.0) {
            bail!("Temperature must be positive, got {}", self.temperature);
        }
        if !(self.stepsize > 0.0) {
            bail!("Step size must be positive, got {}", self.stepsize);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Hierarchical {
    /// Strategy run within each priority stage
    pub base: BaseStrategy,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Predictive {
    /// Share of the iteration budget given to the refining gradient descent
    pub iteration_fraction: f64,
    /// Factor applied to the learning rate of the refining gradient descent
    pub learning_rate_factor: f64,
}

impl Default for Predictive {
    fn default() -> Self {
        Predictive {
            iteration_fraction: 0.5,
            learning_rate_factor: 0.5,
        }
    }
}

impl Predictive {
    pub fn validate(&self) -> Result<()> {
        if !(self.iteration_fraction > 0.0 && self.iteration_fraction <= 1.0) {
            bail!(
                "Iteration fraction must be in (0, 1], got {}",
                self.iteration_fraction
            );
        }
        if !(self.learning_rate_factor > 0.0) {
            bail!(
                "Learning rate factor must be positive, got {}",
                self.learning_rate_factor
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// The maximum log level to display
    ///
    /// Any [EnvFilter](tracing_subscriber::EnvFilter) directive is accepted, e.g. `info` or `rtopt=debug`.
    pub level: String,
    /// The file to write the log to, relative to the output path
    pub file: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: String::from("info"),
            file: None,
        }
    }
}

/// Configuration for the output files
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Output {
    /// The (relative) path to write the output files to
    pub path: String,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            path: String::from("outputs/"),
        }
    }
}

/// Parses the settings from a TOML configuration file
///
/// Entries in the TOML file may be overridden by environment variables prefixed with `RTOPT`, using a
/// double underscore as separator for nested entries. For example, `RTOPT__CONFIG__SEED=7`
/// overrides the seed.
pub fn read(path: impl Into<String>) -> Result<Settings> {
    let settings_path = path.into();

    let parsed = eConfig::builder()
        .add_source(config::File::with_name(&settings_path).format(config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("RTOPT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = parsed.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}

/// Writes a copy of the settings as `settings.json` in the output folder
pub fn write_settings_to_file(settings: &Settings) -> Result<()> {
    let serialized = serde_json::to_string_pretty(settings)?;

    let outputfile = OutputFile::new(settings.output.path.as_str(), "settings.json")?;
    let mut file = outputfile.file_owned();
    std::io::Write::write_all(&mut file, serialized.as_bytes())?;
    Ok(())
}
