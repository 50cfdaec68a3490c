use eyre::Result;
use ndarray::Array3;
use rtopt::prelude::*;

fn solved() -> Result<OptimizationResult> {
    let mut optimizer = GoalOptimizer::with_algorithm(Algorithm::GradientDescent);
    optimizer.add_structure("PTV", Array3::from_elem((1, 1, 10), true))?;
    optimizer.set_beam_doses(vec![
        Array3::from_elem((1, 1, 10), 30.0),
        Array3::from_elem((1, 1, 10), 10.0),
    ])?;
    optimizer.add_goal(Goal::builder("PTV", GoalKind::MinDose, 35.0).build()?);
    optimizer.add_goal(
        Goal::builder("PTV", GoalKind::MaxDose, 40.0)
            .priority(2)
            .build()?,
    );
    optimizer
        .optimize()
        .into_result()
        .map_err(|f| eyre::eyre!(f.message))
}

/// A saved result loads back unchanged
#[test]
fn test_save_and_load() -> Result<()> {
    let result = solved()?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("plans").join("result.json");

    result.save(&path)?;
    let loaded = OptimizationResult::load(&path)?;
    assert_eq!(loaded.goals(), result.goals());
    assert_eq!(loaded.algorithm(), Algorithm::GradientDescent);
    assert_eq!(loaded.iterations(), result.iterations());
    assert_eq!(loaded.status(), result.status());
    assert_eq!(loaded.seed(), result.seed());
    for (a, b) in loaded.weights().iter().zip(result.weights().iter()) {
        assert!((a - b).abs() < 1e-12);
    }
    assert_eq!(
        loaded.goal_evaluation().keys().collect::<Vec<_>>(),
        result.goal_evaluation().keys().collect::<Vec<_>>()
    );
    Ok(())
}

/// The persisted record uses the plan field names
#[test]
fn test_persisted_field_names() -> Result<()> {
    let result = solved()?;
    let value = serde_json::to_value(&result)?;
    for field in [
        "algorithm",
        "goals",
        "optimized_weights",
        "objective_value",
        "optimization_time",
        "iterations",
        "parameters",
        "goal_evaluation",
    ] {
        assert!(value.get(field).is_some(), "missing field '{}'", field);
    }
    assert_eq!(value["algorithm"], "gradient_descent");
    assert!(value["goal_evaluation"].get("PTV_min_dose").is_some());
    assert!(value["goal_evaluation"].get("PTV_max_dose").is_some());
    Ok(())
}

/// Loading a file that is not a result fails with context
#[test]
fn test_load_rejects_other_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("other.json");
    std::fs::write(&path, r#"{"weights": [1.0]}"#)?;
    let error = OptimizationResult::load(&path).unwrap_err();
    assert!(format!("{:#}", error).contains("Failed to parse result file"));
    assert!(OptimizationResult::load(dir.path().join("missing.json")).is_err());
    Ok(())
}

/// The objective trace is written with one row per entry
#[test]
fn test_write_trace() -> Result<()> {
    let result = solved()?;
    let dir = tempfile::tempdir()?;
    let path = result.write_trace(&dir.path().to_string_lossy())?;

    let mut reader = csv::Reader::from_path(&path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    assert_eq!(headers, vec!["iteration", "objective"]);
    let rows: Vec<(usize, f64)> = reader
        .deserialize()
        .collect::<std::result::Result<_, csv::Error>>()?;
    assert_eq!(rows.len(), result.objective_trace().len());
    assert_eq!(rows[0].0, 0);
    let first = result.objective_trace()[0];
    assert!((rows[0].1 - first).abs() <= 1e-12 * first.abs().max(1.0));
    Ok(())
}

/// Failures serialize with an explicit success flag
#[test]
fn test_failure_record() -> Result<()> {
    let failure = Failure::new("No optimization goals defined");
    let value = serde_json::to_value(&failure)?;
    assert_eq!(value["success"], false);
    assert_eq!(value["message"], "No optimization goals defined");
    Ok(())
}
