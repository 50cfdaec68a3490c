use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array3;
use rtopt::prelude::*;
use rtopt::routines::evaluation::gradient::forward_difference;

const SHAPE: (usize, usize, usize) = (20, 64, 64);

/// A target in the middle of the grid, an organ at risk next to it and `n` beams
fn problem(n: usize) -> (Vec<Goal>, StructureRegistry, BeamDoseSet) {
    let mut registry = StructureRegistry::new();
    registry
        .insert(
            "PTV",
            Array3::from_shape_fn(SHAPE, |(_, y, x)| (24..40).contains(&y) && (24..40).contains(&x)),
        )
        .unwrap();
    registry
        .insert(
            "Cord",
            Array3::from_shape_fn(SHAPE, |(_, y, x)| (44..50).contains(&y) && (28..36).contains(&x)),
        )
        .unwrap();
    let beams = BeamDoseSet::new(
        (0..n)
            .map(|b| Array3::from_shape_fn(SHAPE, |(z, y, x)| 60.0 - ((x + y * b + z) % 17) as f64))
            .collect(),
    )
    .unwrap();
    let goals = vec![
        Goal::builder("PTV", GoalKind::MinDvh, 57.0).volume(95.0).build().unwrap(),
        Goal::builder("PTV", GoalKind::UniformDose, 0.0).priority(3).build().unwrap(),
        Goal::builder("Cord", GoalKind::MaxDose, 45.0).priority(2).build().unwrap(),
    ];
    (goals, registry, beams)
}

/// Benchmark a single objective evaluation and a full finite-difference gradient
fn benchmark_objective(c: &mut Criterion) {
    let mut group = c.benchmark_group("objective");
    for n in [5, 9] {
        let (goals, registry, beams) = problem(n);
        let objective = ObjectiveFunction::new(&goals, &registry, &beams);
        let weights = vec![1.0 / n as f64; n];

        group.bench_with_input(BenchmarkId::new("value", n), &weights, |b, w| {
            b.iter(|| objective.value(black_box(w)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("gradient", n), &weights, |b, w| {
            b.iter(|| forward_difference(&objective, black_box(w)).unwrap());
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(std::time::Duration::from_secs(10))
        .noise_threshold(0.10);
    targets = benchmark_objective
}
criterion_main!(benches);
