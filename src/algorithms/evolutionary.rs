use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_stats::QuantileExt;
use rand::Rng;

use crate::algorithms::{Algorithm, RunContext, Status, Strategy, StrategyOutput};
use crate::error::OptimizationError;
use crate::routines::evaluation::objective::ObjectiveFunction;
use crate::routines::initialization::sobol;
use crate::routines::settings::Settings;
use crate::structs::weights::Weights;

/// Smallest population for which rand/1 mutation can pick three distinct donors
const MIN_POPULATION: usize = 4;

/// Differential evolution (rand/1/bin) over `[0, 1]` per weight
///
/// The initial population is a seeded Sobol sequence. No objective trace is kept; the
/// weights are normalized by the driver afterwards.
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    population_size: usize,
    mutation: f64,
    crossover: f64,
    max_generations: usize,
    tolerance: f64,
}

impl DifferentialEvolution {
    pub fn new(settings: &Settings) -> Self {
        Self {
            population_size: settings.parameters.population_size.max(MIN_POPULATION),
            mutation: settings.parameters.mutation_rate,
            crossover: settings.evolutionary.crossover_rate,
            max_generations: settings.parameters.max_iterations,
            tolerance: settings.parameters.tolerance,
        }
    }

    fn converged(&self, energies: &Array1<f64>) -> bool {
        let mean = energies.mean().unwrap_or(0.0);
        let std = energies.std(0.0);
        std <= self.tolerance * mean.abs()
    }
}

/// Three distinct population indices, all different from `exclude`
fn donors<R: Rng>(rng: &mut R, size: usize, exclude: usize) -> [usize; 3] {
    let mut picked = [exclude; 3];
    let mut n = 0;
    while n < 3 {
        let candidate = rng.random_range(0..size);
        if candidate != exclude && !picked[..n].contains(&candidate) {
            picked[n] = candidate;
            n += 1;
        }
    }
    picked
}

impl Strategy for DifferentialEvolution {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Evolutionary
    }

    fn run(
        &mut self,
        objective: &ObjectiveFunction<'_>,
        start: &Weights,
        ctx: &mut RunContext<'_>,
    ) -> Result<StrategyOutput, OptimizationError> {
        let dim = start.len();
        if dim == 0 {
            return Err(OptimizationError::EmptyWeights);
        }
        let size = self.population_size;

        let seed = ctx.rng().random::<u32>() as u64;
        let ranges = vec![(0.0, 1.0); dim];
        let mut population: Array2<f64> = sobol::generate(size, &ranges, seed);
        // Member 0 is the starting point, rescaled into the unit box
        if let Some(scaled) = start.normalized() {
            let peak = scaled.iter().fold(0.0, f64::max);
            population
                .row_mut(0)
                .assign(&scaled.weights().mapv(|w| w / peak));
        }

        let mut energies = Array1::<f64>::zeros(size);
        for (i, member) in population.axis_iter(Axis(0)).enumerate() {
            energies[i] = objective.value_on_simplex(&member.to_vec())?;
        }

        let mut history = Vec::new();
        let mut trial = vec![0.0; dim];
        for generation in 0..self.max_generations {
            let best = best_index(&energies);
            history.push(energies[best]);
            let leader = Weights::new(population.row(best).to_owned());
            let leader = leader.normalized().unwrap_or(leader);
            ctx.report(generation, energies[best], leader.as_slice());
            if ctx.should_stop(&history, generation) {
                tracing::info!("Stopped by the stopping criteria at generation {}", generation);
                return Ok(StrategyOutput {
                    weights: Weights::new(population.row(best).to_owned()),
                    trace: Vec::new(),
                    iterations: generation,
                    status: Status::Stopped,
                });
            }

            for i in 0..size {
                let [a, b, c] = donors(ctx.rng(), size, i);
                let forced = ctx.rng().random_range(0..dim);
                for (j, slot) in trial.iter_mut().enumerate() {
                    *slot = if j == forced || ctx.rng().random::<f64>() < self.crossover {
                        (population[[a, j]]
                            + self.mutation * (population[[b, j]] - population[[c, j]]))
                            .clamp(0.0, 1.0)
                    } else {
                        population[[i, j]]
                    };
                }
                let energy = objective.value_on_simplex(&trial)?;
                if energy <= energies[i] {
                    energies[i] = energy;
                    population.row_mut(i).assign(&ArrayView1::from(&trial[..]));
                }
            }

            tracing::debug!(
                "Generation {}: best objective = {:.6}",
                generation,
                energies[best_index(&energies)]
            );

            if self.converged(&energies) {
                tracing::info!("Population converged after {} generations", generation + 1);
                return Ok(StrategyOutput {
                    weights: best_member(&population, &energies),
                    trace: Vec::new(),
                    iterations: generation + 1,
                    status: Status::Converged,
                });
            }
        }

        Ok(StrategyOutput {
            weights: best_member(&population, &energies),
            trace: Vec::new(),
            iterations: self.max_generations,
            status: Status::Exhausted,
        })
    }
}

fn best_index(energies: &Array1<f64>) -> usize {
    energies.argmin_skipnan().unwrap_or(0)
}

fn best_member(population: &Array2<f64>, energies: &Array1<f64>) -> Weights {
    Weights::new(population.row(best_index(energies)).to_owned())
}
