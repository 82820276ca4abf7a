//! Generic generational GA engine.
//!
//! Problem-agnostic: a [`GaProblem`] supplies creation, evaluation,
//! crossover and mutation; [`GaRunner`] supplies the loop.
//!
//! # Loop
//!
//! 1. Create and evaluate `population_size` individuals.
//! 2. Per generation: copy the `elite_count` best unchanged, fill the
//!    rest with tournament-selected parents, crossover with probability
//!    `crossover_rate`, mutate every offspring.
//! 3. Stop after `max_generations`, when the best fitness has improved by
//!    less than `convergence_threshold` for `stagnation_generations`
//!    consecutive generations, or when the deadline expires.
//!
//! Fitness is maximized. At least one elite is required, so the
//! population leader never gets worse from one generation to the next.
//!
//! Random draws happen on the calling thread in a fixed order; only the
//! pure `evaluate` calls fan out to rayon, so a seed fixes the result
//! regardless of `parallel`.
//!
//! # Reference
//! Goldberg (1989), "Genetic Algorithms in Search, Optimization and Machine Learning"

use std::cmp::Ordering;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::control::Deadline;
use crate::error::{OptimizerError, Result};

/// A member of the population.
pub trait Individual: Clone + Send + Sync {
    /// Fitness (higher = better).
    fn fitness(&self) -> f64;
    fn set_fitness(&mut self, fitness: f64);
}

/// Problem definition plugged into [`GaRunner`].
pub trait GaProblem: Sync {
    type Individual: Individual;

    /// Creates one random individual.
    fn create_individual<R: Rng>(&self, rng: &mut R) -> Self::Individual;

    /// Fitness of an individual. Must be pure.
    fn evaluate(&self, individual: &Self::Individual) -> f64;

    /// Produces offspring from two parents.
    fn crossover<R: Rng>(
        &self,
        parent1: &Self::Individual,
        parent2: &Self::Individual,
        rng: &mut R,
    ) -> Vec<Self::Individual>;

    /// Mutates in place; `rate` is the per-gene probability.
    fn mutate<R: Rng>(&self, individual: &mut Self::Individual, rate: f64, rng: &mut R);
}

/// GA parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaConfig {
    pub population_size: usize,
    pub max_generations: usize,
    /// Individuals copied unchanged into the next generation.
    pub elite_count: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    /// Per-gene mutation probability.
    pub mutation_rate: f64,
    /// Minimum best-fitness gain that resets the stagnation counter.
    pub convergence_threshold: f64,
    /// Generations without sufficient gain before stopping early.
    pub stagnation_generations: usize,
    pub seed: u64,
    /// Evaluate fitness with rayon.
    pub parallel: bool,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            max_generations: 100,
            elite_count: 2,
            tournament_size: 3,
            crossover_rate: 0.8,
            mutation_rate: 0.1,
            convergence_threshold: 1e-4,
            stagnation_generations: 20,
            seed: 42,
            parallel: true,
        }
    }
}

impl GaConfig {
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    pub fn with_max_generations(mut self, generations: usize) -> Self {
        self.max_generations = generations;
        self
    }

    pub fn with_elite_count(mut self, count: usize) -> Self {
        self.elite_count = count;
        self
    }

    pub fn with_tournament_size(mut self, size: usize) -> Self {
        self.tournament_size = size;
        self
    }

    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.crossover_rate = rate;
        self
    }

    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    /// Sets early-stopping parameters.
    pub fn with_convergence(mut self, threshold: f64, stagnation_generations: usize) -> Self {
        self.convergence_threshold = threshold;
        self.stagnation_generations = stagnation_generations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.population_size < 2 {
            problems.push(format!("population size {} < 2", self.population_size));
        }
        if self.elite_count == 0 {
            problems.push("elite count must be at least 1".to_string());
        }
        if self.elite_count >= self.population_size {
            problems.push(format!(
                "elite count {} must be below population size {}",
                self.elite_count, self.population_size
            ));
        }
        if self.tournament_size == 0 {
            problems.push("tournament size must be positive".to_string());
        }
        for (name, rate) in [
            ("crossover rate", self.crossover_rate),
            ("mutation rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                problems.push(format!("{name} {rate} outside [0, 1]"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(OptimizerError::InvalidConfig(problems.join("; ")))
        }
    }
}

/// Outcome of a GA run.
#[derive(Debug, Clone)]
pub struct GaResult<I> {
    /// Best individual seen.
    pub best: I,
    pub best_fitness: f64,
    /// Population leader's fitness after initialization and after each
    /// generation.
    pub fitness_history: Vec<f64>,
    /// Population fitness variance, same indexing as `fitness_history`.
    pub diversity_history: Vec<f64>,
    /// Last population, best first.
    pub final_population: Vec<I>,
    /// Generations completed.
    pub generations: usize,
    /// Stopped by the stagnation criterion.
    pub converged: bool,
    /// Stopped by the deadline.
    pub timed_out: bool,
}

/// Runs the generational loop.
pub struct GaRunner;

impl GaRunner {
    /// Runs without a time limit.
    pub fn run<P: GaProblem>(problem: &P, config: &GaConfig) -> Result<GaResult<P::Individual>> {
        Self::run_until(problem, config, &Deadline::none())
    }

    /// Runs until completion, convergence or `deadline`.
    pub fn run_until<P: GaProblem>(
        problem: &P,
        config: &GaConfig,
        deadline: &Deadline,
    ) -> Result<GaResult<P::Individual>> {
        config.validate()?;
        let mut rng = SmallRng::seed_from_u64(config.seed);

        let mut population: Vec<P::Individual> = (0..config.population_size)
            .map(|_| problem.create_individual(&mut rng))
            .collect();
        evaluate_all(problem, &mut population, config.parallel);
        sort_best_first(&mut population);

        let mut best = population
            .first()
            .cloned()
            .ok_or_else(|| OptimizerError::InvariantViolation("empty initial population".into()))?;
        let mut fitness_history = vec![best.fitness()];
        let mut diversity_history = vec![fitness_variance(&population)];
        let mut stagnation = 0usize;
        let mut generations = 0usize;
        let mut converged = false;
        let mut timed_out = false;

        for generation in 1..=config.max_generations {
            if deadline.is_expired() {
                warn!(generation, "GA deadline reached, returning best so far");
                timed_out = true;
                break;
            }

            let mut next: Vec<P::Individual> =
                population.iter().take(config.elite_count).cloned().collect();
            let mut offspring = Vec::with_capacity(config.population_size);
            while next.len() + offspring.len() < config.population_size {
                let p1 = tournament(&population, config.tournament_size, &mut rng);
                let p2 = tournament(&population, config.tournament_size, &mut rng);
                let children = if rng.random_bool(config.crossover_rate) {
                    problem.crossover(p1, p2, &mut rng)
                } else {
                    vec![p1.clone(), p2.clone()]
                };
                for mut child in children {
                    if next.len() + offspring.len() >= config.population_size {
                        break;
                    }
                    problem.mutate(&mut child, config.mutation_rate, &mut rng);
                    offspring.push(child);
                }
            }
            evaluate_all(problem, &mut offspring, config.parallel);
            next.extend(offspring);
            sort_best_first(&mut next);
            population = next;
            generations = generation;

            let Some(leader) = population.first() else {
                return Err(OptimizerError::InvariantViolation(format!(
                    "population empty after generation {generation}"
                )));
            };
            if leader.fitness() - best.fitness() < config.convergence_threshold {
                stagnation += 1;
            } else {
                stagnation = 0;
            }
            if leader.fitness() > best.fitness() {
                best = leader.clone();
            }
            fitness_history.push(leader.fitness());
            diversity_history.push(fitness_variance(&population));

            if stagnation >= config.stagnation_generations {
                debug!(generation, best = best.fitness(), "GA converged");
                converged = true;
                break;
            }
        }

        Ok(GaResult {
            best_fitness: best.fitness(),
            best,
            fitness_history,
            diversity_history,
            final_population: population,
            generations,
            converged,
            timed_out,
        })
    }
}

/// Evaluates every individual; NaN fitness becomes −∞.
pub(crate) fn evaluate_all<P: GaProblem>(
    problem: &P,
    individuals: &mut [P::Individual],
    parallel: bool,
) {
    let assign = |ind: &mut P::Individual| {
        let f = problem.evaluate(ind);
        ind.set_fitness(if f.is_nan() { f64::NEG_INFINITY } else { f });
    };
    if parallel {
        individuals.par_iter_mut().for_each(assign);
    } else {
        individuals.iter_mut().for_each(assign);
    }
}

fn sort_best_first<I: Individual>(population: &mut [I]) {
    population.sort_by(|a, b| b.fitness().total_cmp(&a.fitness()));
}

/// Tournament selection: best of `size` uniformly drawn individuals.
pub(crate) fn tournament<'p, I: Individual, R: Rng>(
    population: &'p [I],
    size: usize,
    rng: &mut R,
) -> &'p I {
    let mut winner = &population[rng.random_range(0..population.len())];
    for _ in 1..size {
        let challenger = &population[rng.random_range(0..population.len())];
        if challenger.fitness().total_cmp(&winner.fitness()) == Ordering::Greater {
            winner = challenger;
        }
    }
    winner
}

/// Population variance of finite fitness values (0 for fewer than two).
pub fn fitness_variance<I: Individual>(population: &[I]) -> f64 {
    let values: Vec<f64> = population
        .iter()
        .map(Individual::fitness)
        .filter(|f| f.is_finite())
        .collect();
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
