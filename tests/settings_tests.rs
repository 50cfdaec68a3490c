use std::io::Write;

use eyre::Result;
use rtopt::prelude::*;

fn write_toml(contents: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

/// Sections and keys missing from the file keep their defaults
#[test]
fn test_read_partial_file() -> Result<()> {
    let file = write_toml(
        r#"
[config]
algorithm = "basin_hopping"
seed = 7

[parameters]
max_iterations = 25
learning_rate = 0.05

[basin_hopping]
temperature = 2.5
"#,
    )?;

    let settings = settings::read(file.path().to_string_lossy())?;
    assert_eq!(settings.config.algorithm, Algorithm::BasinHopping);
    assert_eq!(settings.config.seed, 7);
    assert_eq!(settings.parameters.max_iterations, 25);
    assert_eq!(settings.parameters.learning_rate, 0.05);
    assert_eq!(settings.parameters.population_size, 50);
    assert_eq!(settings.basin_hopping.temperature, 2.5);
    assert_eq!(settings.basin_hopping.stepsize, 0.1);
    assert_eq!(settings.output.path, "outputs/");
    Ok(())
}

/// The hierarchical base strategy is read by name
#[test]
fn test_read_hierarchical_base() -> Result<()> {
    let file = write_toml(
        r#"
[config]
algorithm = "hierarchical"

[hierarchical]
base = "evolutionary"
"#,
    )?;
    let settings = settings::read(file.path().to_string_lossy())?;
    assert_eq!(settings.config.algorithm, Algorithm::Hierarchical);
    assert_eq!(settings.hierarchical.base, BaseStrategy::Evolutionary);
    Ok(())
}

/// Misspelled keys are rejected instead of silently ignored
#[test]
fn test_unknown_keys_are_rejected() -> Result<()> {
    let file = write_toml(
        r#"
[parameters]
max_iteration = 10
"#,
    )?;
    assert!(settings::read(file.path().to_string_lossy()).is_err());
    Ok(())
}

/// Files that parse but hold invalid values fail validation
#[test]
fn test_invalid_values_are_rejected() -> Result<()> {
    let file = write_toml(
        r#"
[parameters]
population_size = 2
"#,
    )?;
    assert!(settings::read(file.path().to_string_lossy()).is_err());

    let file = write_toml(
        r#"
[predictive]
iteration_fraction = 1.5
"#,
    )?;
    assert!(settings::read(file.path().to_string_lossy()).is_err());
    Ok(())
}

/// Settings survive a JSON round trip, as written next to the results
#[test]
fn test_settings_serialization() -> Result<()> {
    let mut settings = Settings::new();
    settings.set_algorithm(Algorithm::Evolutionary);
    settings.set_mutation_rate(0.5);
    settings.set_log_file(Some("run.log".to_string()));

    let json = serde_json::to_string(&settings)?;
    let restored: Settings = serde_json::from_str(&json)?;
    assert_eq!(restored.config.algorithm, Algorithm::Evolutionary);
    assert_eq!(restored.parameters, settings.parameters);
    assert_eq!(restored.log.file.as_deref(), Some("run.log"));
    Ok(())
}

/// A copy of the settings is written into the output folder
#[test]
fn test_write_settings_to_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut settings = Settings::new();
    settings.set_output_path(dir.path().to_string_lossy());
    settings::write_settings_to_file(&settings)?;

    let written = std::fs::read_to_string(dir.path().join("settings.json"))?;
    let restored: Settings = serde_json::from_str(&written)?;
    assert_eq!(restored.output.path, settings.output.path);
    Ok(())
}
