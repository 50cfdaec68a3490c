use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use eyre::Result;
use ndarray::Array3;
use rtopt::prelude::*;

const SHAPE: (usize, usize, usize) = (1, 2, 5);

fn uniform_dose(value: f64) -> Array3<f64> {
    Array3::from_elem(SHAPE, value)
}

/// Three beams over a target and an organ at risk; the beams trade target coverage against
/// organ sparing differently
fn head_and_neck(algorithm: Algorithm) -> Result<GoalOptimizer> {
    let mut optimizer = GoalOptimizer::with_algorithm(algorithm);
    optimizer.settings_mut().set_seed(42);
    optimizer.add_structure("PTV", Array3::from_shape_fn(SHAPE, |(_, y, _)| y == 0))?;
    optimizer.add_structure("Parotid", Array3::from_shape_fn(SHAPE, |(_, y, _)| y == 1))?;
    optimizer.set_beam_doses(vec![
        Array3::from_shape_fn(SHAPE, |(_, y, x)| if y == 0 { 70.0 - x as f64 } else { 40.0 }),
        Array3::from_shape_fn(SHAPE, |(_, y, _)| if y == 0 { 60.0 } else { 10.0 }),
        Array3::from_shape_fn(SHAPE, |(_, y, x)| if y == 0 { 50.0 + x as f64 } else { 25.0 }),
    ])?;
    optimizer.add_goal(Goal::builder("PTV", GoalKind::MinDose, 60.0).build()?);
    optimizer.add_goal(
        Goal::builder("Parotid", GoalKind::MeanDose, 20.0)
            .priority(2)
            .build()?,
    );
    optimizer.add_goal(
        Goal::builder("PTV", GoalKind::UniformDose, 0.0)
            .priority(3)
            .weight(0.5)
            .build()?,
    );
    Ok(optimizer)
}

/// One beam that already satisfies the only goal
#[test]
fn test_single_beam_already_satisfied() -> Result<()> {
    let mut optimizer = GoalOptimizer::with_algorithm(Algorithm::GradientDescent);
    optimizer.add_structure("PTV", Array3::from_elem(SHAPE, true))?;
    optimizer.set_beam_doses(vec![uniform_dose(50.0)])?;
    optimizer.add_goal(Goal::builder("PTV", GoalKind::MinDose, 40.0).build()?);

    assert_eq!(optimizer.objective().value(&[1.0])?, 0.0);

    let result = optimizer.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;
    assert_eq!(result.weights().to_vec(), vec![1.0]);
    assert_eq!(result.objective_value(), 0.0);
    assert_eq!(optimizer.status(), Status::Converged);
    Ok(())
}

/// Two beams that cannot reach the prescription: all weight goes to the stronger beam and the
/// goal is reported as unmet
#[test]
fn test_infeasible_goal_favours_the_stronger_beam() -> Result<()> {
    let mut optimizer = GoalOptimizer::with_algorithm(Algorithm::GradientDescent);
    optimizer.add_structure("PTV", Array3::from_elem(SHAPE, true))?;
    optimizer.set_beam_doses(vec![uniform_dose(30.0), uniform_dose(10.0)])?;
    optimizer.add_goal(
        Goal::builder("PTV", GoalKind::MinDose, 35.0)
            .required(true)
            .build()?,
    );

    let result = optimizer.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;
    assert!(result.weights()[0] > 0.99, "weights: {:?}", result.weights());

    let evaluation = result.evaluation("PTV_min_dose").expect("evaluation present");
    assert!(!evaluation.is_satisfied);
    let actual = evaluation.actual_value.expect("goal was evaluated");
    assert!((actual - 30.0).abs() < 0.5, "actual = {}", actual);
    Ok(())
}

/// Weights are non-negative and sum to one for every single-stage strategy
#[test]
fn test_weights_are_normalized() -> Result<()> {
    for algorithm in [
        Algorithm::GradientDescent,
        Algorithm::Evolutionary,
        Algorithm::BasinHopping,
    ] {
        let mut optimizer = head_and_neck(algorithm)?;
        optimizer.settings_mut().set_max_iterations(20);
        optimizer.settings_mut().set_population_size(8);

        let outcome = optimizer.optimize();
        let result = outcome.result().expect("optimization succeeds");
        assert_eq!(result.algorithm(), algorithm);
        assert!(
            result.weights().is_normalized(1e-6),
            "{}: {:?}",
            algorithm,
            result.weights()
        );
        assert_eq!(result.goal_evaluation().len(), 3);
    }
    Ok(())
}

/// Evolutionary search keeps no trace
#[test]
fn test_evolutionary_has_no_trace() -> Result<()> {
    let mut optimizer = head_and_neck(Algorithm::Evolutionary)?;
    optimizer.settings_mut().set_max_iterations(5);
    optimizer.settings_mut().set_population_size(6);
    let result = optimizer.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;
    assert!(result.objective_trace().is_empty());
    assert!(result.iterations() <= 5);
    Ok(())
}

/// The gradient descent trace never increases
#[test]
fn test_gradient_descent_trace_is_non_increasing() -> Result<()> {
    let mut optimizer = head_and_neck(Algorithm::GradientDescent)?;
    let result = optimizer.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;
    let trace = result.objective_trace();
    assert!(!trace.is_empty());
    let increasing = trace.windows(2).filter(|w| w[1] > w[0] + 1e-9).count();
    assert_eq!(increasing, 0, "trace: {:?}", trace);
    Ok(())
}

/// Running the same stochastic strategy twice with the same seed gives the same weights
#[test]
fn test_seed_makes_runs_reproducible() -> Result<()> {
    let run = |seed: u64| -> Result<Vec<f64>> {
        let mut optimizer = head_and_neck(Algorithm::Evolutionary)?;
        optimizer.set_seed(seed);
        optimizer.settings_mut().set_max_iterations(10);
        optimizer.settings_mut().set_population_size(8);
        let result = optimizer.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;
        Ok(result.weights().to_vec())
    };
    assert_eq!(run(5)?, run(5)?);
    Ok(())
}

/// Staged optimization never leaves a higher-priority goal worse than optimizing it alone
#[test]
fn test_hierarchical_does_not_degrade_higher_priorities() -> Result<()> {
    let mut hierarchical = head_and_neck(Algorithm::Hierarchical)?;
    let staged = hierarchical
        .optimize()
        .into_result()
        .map_err(|f| eyre::eyre!(f.message))?;

    let mut alone = head_and_neck(Algorithm::GradientDescent)?;
    let top: Vec<Goal> = alone
        .goals()
        .iter()
        .filter(|g| g.priority() == 1)
        .cloned()
        .collect();
    alone.clear_goals();
    for goal in top.iter().cloned() {
        alone.add_goal(goal);
    }
    let reference = alone.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;

    let objective = hierarchical.objective();
    let top_only = objective.with_goals(&top);
    let staged_penalties = top_only.penalties(staged.weights().as_slice())?;
    let reference_penalties = top_only.penalties(reference.weights().as_slice())?;
    for (s, r) in staged_penalties.iter().zip(&reference_penalties) {
        assert!(*s <= r + 1e-6 * (1.0 + r.abs()), "staged {} vs alone {}", s, r);
    }
    Ok(())
}

/// Hierarchical search can run on a population-based base strategy
#[test]
fn test_hierarchical_with_evolutionary_base() -> Result<()> {
    let mut optimizer = head_and_neck(Algorithm::Hierarchical)?;
    optimizer
        .settings_mut()
        .set_hierarchical_base(BaseStrategy::Evolutionary);
    optimizer.settings_mut().set_max_iterations(5);
    optimizer.settings_mut().set_population_size(6);
    let result = optimizer.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;
    assert!(result.weights().is_normalized(1e-6));
    assert_eq!(result.algorithm(), Algorithm::Hierarchical);
    Ok(())
}

/// Missing preconditions are reported as a failure, not a panic
#[test]
fn test_preconditions() -> Result<()> {
    let mut optimizer = GoalOptimizer::default();
    let failure = optimizer.optimize().failure().cloned().expect("must fail");
    assert!(!failure.success);
    assert!(failure.message.contains("goals"));
    assert_eq!(optimizer.status(), Status::Failed);

    optimizer.add_goal(Goal::builder("PTV", GoalKind::MinDose, 60.0).build()?);
    let failure = optimizer.optimize().failure().cloned().expect("must fail");
    assert!(failure.message.contains("beam"));

    optimizer.set_beam_doses(vec![uniform_dose(60.0)])?;
    let failure = optimizer.optimize().failure().cloned().expect("must fail");
    assert!(failure.message.contains("structures"));
    Ok(())
}

/// A dose fall-off goal fails the run before any search
#[test]
fn test_fall_off_goal_is_rejected() -> Result<()> {
    let mut optimizer = GoalOptimizer::default();
    optimizer.add_structure("PTV", Array3::from_elem(SHAPE, true))?;
    optimizer.set_beam_doses(vec![uniform_dose(60.0)])?;
    optimizer.add_goal(Goal::builder("PTV", GoalKind::DoseFallOff, 5.0).build()?);
    let outcome = optimizer.optimize();
    let failure = outcome.failure().expect("must fail");
    assert!(failure.message.contains("not yet supported"));
    Ok(())
}

/// Goals on unknown structures are skipped, reported as such and do not stop the run
#[test]
fn test_missing_structure_is_skipped() -> Result<()> {
    let mut optimizer = GoalOptimizer::default();
    optimizer.add_structure("PTV", Array3::from_elem(SHAPE, true))?;
    optimizer.set_beam_doses(vec![uniform_dose(60.0), uniform_dose(50.0)])?;
    optimizer.add_goal(Goal::builder("PTV", GoalKind::MinDose, 55.0).build()?);
    optimizer.add_goal(Goal::builder("Cord", GoalKind::MaxDose, 45.0).build()?);

    let result = optimizer.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;
    let cord = result.evaluation("Cord_max_dose").expect("evaluation present");
    assert_eq!(cord.skipped, Some(SkipReason::MissingStructure));
    assert!(!cord.is_satisfied);
    assert!(result.evaluation("PTV_min_dose").expect("present").is_satisfied);
    Ok(())
}

/// Progress events arrive once per iteration and the stopping criteria ends the run early
#[test]
fn test_progress_and_stopping_criteria() -> Result<()> {
    // the prescription is out of reach and small steps keep the search from settling early
    let mut optimizer = GoalOptimizer::with_algorithm(Algorithm::GradientDescent);
    optimizer.add_structure("PTV", Array3::from_elem(SHAPE, true))?;
    optimizer.set_beam_doses(vec![uniform_dose(30.0), uniform_dose(10.0)])?;
    optimizer.add_goal(Goal::builder("PTV", GoalKind::MinDose, 35.0).build()?);
    optimizer.settings_mut().set_learning_rate(1e-10);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    optimizer.set_progress_callback(Box::new(move |event: ProgressEvent| {
        sink.lock().unwrap().push(event.iteration);
    }));
    let lengths = Arc::new(Mutex::new(Vec::new()));
    let history_sink = lengths.clone();
    optimizer.set_stopping_criteria(move |history, iteration| {
        history_sink.lock().unwrap().push(history.len());
        iteration >= 2
    });

    let result = optimizer.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;
    assert_eq!(*result.status(), Status::Stopped);
    assert_eq!(optimizer.status(), Status::Stopped);
    assert_eq!(result.iterations(), 2);
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(*lengths.lock().unwrap(), vec![1, 2, 3]);
    Ok(())
}

/// Every strategy reports clamped, normalized weights in its progress events
#[test]
fn test_progress_weights_are_normalized() -> Result<()> {
    for algorithm in [
        Algorithm::GradientDescent,
        Algorithm::Evolutionary,
        Algorithm::BasinHopping,
    ] {
        let mut optimizer = head_and_neck(algorithm)?;
        optimizer.settings_mut().set_max_iterations(5);
        optimizer.settings_mut().set_population_size(6);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        optimizer.set_progress_callback(Box::new(move |event: ProgressEvent| {
            sink.lock().unwrap().push(event.weights);
        }));
        optimizer.set_initial_weights(vec![2.0, 1.0, 1.0])?;
        optimizer.optimize();

        let events = events.lock().unwrap();
        for weights in events.iter() {
            let weights = Weights::from_vec(weights.clone());
            assert!(weights.is_normalized(1e-9), "{}: {:?}", algorithm, weights);
        }
    }
    Ok(())
}

/// A failed run discards the result of the previous successful one
#[test]
fn test_failure_clears_previous_result() -> Result<()> {
    let mut optimizer = GoalOptimizer::default();
    optimizer.add_structure("PTV", Array3::from_elem(SHAPE, true))?;
    optimizer.set_beam_doses(vec![uniform_dose(50.0)])?;
    optimizer.add_goal(Goal::builder("PTV", GoalKind::MinDose, 40.0).build()?);
    assert!(optimizer.optimize().is_success());
    assert!(optimizer.result().is_some());

    optimizer.clear_goals();
    assert!(!optimizer.optimize().is_success());
    assert_eq!(optimizer.status(), Status::Failed);
    assert!(optimizer.result().is_none());
    assert!(optimizer.optimized_dose().is_none());
    assert!(optimizer.dose_for_structure("PTV").is_none());
    Ok(())
}

/// Progress can be delivered over a channel to another thread
#[test]
fn test_progress_over_channel() -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut optimizer = head_and_neck(Algorithm::GradientDescent)?;
    optimizer.settings_mut().set_max_iterations(3);
    optimizer.set_progress_reporter(ProgressReporter::channel(tx));

    let handle = std::thread::spawn(move || optimizer.optimize().is_success());
    assert!(handle.join().expect("worker panicked"));

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e.weights.len() == 3));
    Ok(())
}

/// Caller-supplied initial weights are used as the starting point
#[test]
fn test_initial_weights() -> Result<()> {
    let mut optimizer = head_and_neck(Algorithm::GradientDescent)?;
    optimizer.set_initial_weights(vec![0.0, 1.0, 0.0])?;
    let first = Arc::new(Mutex::new(None));
    let sink = first.clone();
    optimizer.set_progress_callback(Box::new(move |event: ProgressEvent| {
        let mut first = sink.lock().unwrap();
        if first.is_none() {
            *first = Some(event.weights);
        }
    }));
    optimizer.optimize();
    assert_eq!(first.lock().unwrap().clone(), Some(vec![0.0, 1.0, 0.0]));
    Ok(())
}

/// Dose accessors follow the optimized weights
#[test]
fn test_dose_accessors() -> Result<()> {
    let mut optimizer = GoalOptimizer::default();
    optimizer.add_structure("PTV", Array3::from_elem(SHAPE, true))?;
    optimizer.set_beam_doses(vec![uniform_dose(50.0)])?;
    optimizer.add_goal(Goal::builder("PTV", GoalKind::MinDose, 40.0).build()?);
    assert!(optimizer.optimized_dose().is_none());

    optimizer.optimize();
    let dose = optimizer.optimized_dose().expect("optimized");
    assert!(dose.iter().all(|&d| (d - 50.0).abs() < 1e-12));
    let ptv = optimizer.dose_for_structure("PTV").expect("known structure");
    assert_eq!(ptv.len(), 10);
    assert!(optimizer.dose_for_structure("Cord").is_none());
    Ok(())
}

struct SparingModel;

impl DosePredictor for SparingModel {
    fn predict(&self, _features: &FeatureVector) -> Result<BTreeMap<String, f64>> {
        Ok(BTreeMap::from([("Parotid".to_string(), 15.0)]))
    }
}

/// The predictive strategy runs with a model, and falls back to gradient descent without one
#[test]
fn test_predictive_with_and_without_model() -> Result<()> {
    let mut with_model = head_and_neck(Algorithm::Predictive)?;
    with_model.set_predictor(Box::new(SparingModel));
    let result = with_model
        .optimize()
        .into_result()
        .map_err(|f| eyre::eyre!(f.message))?;
    assert!(result.weights().is_normalized(1e-6));
    assert!(result.iterations() <= 50);

    let mut fallback = head_and_neck(Algorithm::Predictive)?;
    let fallback_result = fallback
        .optimize()
        .into_result()
        .map_err(|f| eyre::eyre!(f.message))?;

    let mut plain = head_and_neck(Algorithm::GradientDescent)?;
    let plain_result = plain.optimize().into_result().map_err(|f| eyre::eyre!(f.message))?;
    assert_eq!(fallback_result.weights(), plain_result.weights());
    assert_eq!(fallback_result.algorithm(), Algorithm::Predictive);
    Ok(())
}
