//! GA-based schedule optimization.
//!
//! A chromosome is a complete schedule (list of application genes). The
//! generic engine in [`runner`] evolves it; [`FertilizerGaProblem`]
//! defines initialization, fitness, crossover and mutation.
//!
//! # Submodules
//!
//! - [`runner`]: problem-agnostic GA loop (elitism, tournament selection,
//!   convergence detection, rayon evaluation)
//! - [`operators`]: runtime-selectable crossover and mutation strategies
//!
//! # Reference
//! - Holland (1975), "Adaptation in Natural and Artificial Systems"
//! - Goldberg (1989), "Genetic Algorithms in Search, Optimization and Machine Learning"

mod chromosome;
pub mod operators;
mod problem;
pub mod runner;

pub use chromosome::{
    AMOUNT_PERTURBATION, FertilizerChromosome, Gene, MAX_DAY_SHIFT, nutrient_block_crossover,
    perturb_mutation, shift_mutation, single_point_crossover, split_merge_mutation,
};
pub use problem::{FertilizerGaProblem, GeneSpace, PenaltyWeights};
pub use runner::{GaConfig, GaProblem, GaResult, GaRunner, Individual};

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::FieldContext;
use crate::control::Deadline;
use crate::error::{OptimizerError, Result};
use crate::models::{
    GrowthStageCalendar, ObjectiveVector, ObjectiveWeights, OptimizationRequest, Schedule,
    WeatherWindow,
};
use crate::scoring::{ScoringParams, finalize_schedule};
use crate::validation::validate_inputs;
use operators::GeneticOperators;

/// Configuration of the genetic optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    pub ga: GaConfig,
    pub operators: GeneticOperators,
    pub weights: ObjectiveWeights,
    pub penalties: PenaltyWeights,
    /// Most applications per nutrient when splitting is allowed.
    pub max_splits: usize,
    /// Repair offspring so per-nutrient totals stay exact.
    pub repair: bool,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            ga: GaConfig::default(),
            operators: GeneticOperators::default(),
            weights: ObjectiveWeights::default(),
            penalties: PenaltyWeights::default(),
            max_splits: 3,
            repair: true,
        }
    }
}

impl GeneticConfig {
    pub fn with_ga(mut self, ga: GaConfig) -> Self {
        self.ga = ga;
        self
    }

    pub fn with_operators(mut self, operators: GeneticOperators) -> Self {
        self.operators = operators;
        self
    }

    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_repair(mut self, repair: bool) -> Self {
        self.repair = repair;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.ga.validate()?;
        if self.max_splits == 0 {
            return Err(OptimizerError::InvalidConfig("max splits must be positive".into()));
        }
        if !self.weights.is_normalized() {
            return Err(OptimizerError::InvalidConfig(
                "objective weights must be non-negative and sum to 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of a genetic optimization.
#[derive(Debug, Clone)]
pub struct GeneticResult {
    pub best_schedule: Schedule,
    pub best_fitness: f64,
    pub objectives: ObjectiveVector,
    /// Population leader's fitness per generation (index 0 = initial population).
    pub fitness_history: Vec<f64>,
    /// Population fitness variance per generation.
    pub diversity_history: Vec<f64>,
    /// Last population, best first.
    pub final_population: Vec<FertilizerChromosome>,
    pub generations: usize,
    pub converged: bool,
    pub timed_out: bool,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

/// Genetic algorithm optimizer.
#[derive(Debug, Clone, Default)]
pub struct GeneticOptimizer {
    pub config: GeneticConfig,
    pub params: ScoringParams,
}

impl GeneticOptimizer {
    pub fn new(config: GeneticConfig) -> Self {
        Self {
            config,
            params: ScoringParams::default(),
        }
    }

    pub fn with_scoring(mut self, params: ScoringParams) -> Self {
        self.params = params;
        self
    }

    /// Optimizes without a time limit.
    pub fn optimize(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
    ) -> Result<GeneticResult> {
        self.optimize_until(request, windows, calendar, &Deadline::none())
    }

    /// Optimizes, returning the best schedule so far once `deadline` expires.
    pub fn optimize_until(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        deadline: &Deadline,
    ) -> Result<GeneticResult> {
        validate_inputs(request, windows, calendar).map_err(OptimizerError::InvalidRequest)?;
        self.config.validate()?;
        self.params.validate()?;

        let started = Instant::now();
        let ctx = FieldContext::new(request, windows, calendar, &self.params);
        let problem = FertilizerGaProblem::new(&ctx, self.config.max_splits)
            .with_operators(self.config.operators.clone())
            .with_weights(self.config.weights)
            .with_penalties(self.config.penalties.clone())
            .with_repair(self.config.repair);
        debug!(
            field = %request.field_id,
            nutrients = problem.space.nutrients.len(),
            feasible_days = problem.space.feasible_days.len(),
            population = self.config.ga.population_size,
            "starting GA"
        );

        let run = GaRunner::run_until(&problem, &self.config.ga, deadline)?;

        let mut best_schedule = problem.decode(&run.best);
        let evaluation = finalize_schedule(&ctx, &mut best_schedule);

        let quality = (evaluation.objectives.weighted_sum(&self.config.weights) / 100.0).clamp(0.0, 1.0);
        let mut confidence = 0.6 * quality + if run.converged { 0.3 } else { 0.15 };
        if !best_schedule.is_complete() {
            confidence *= 0.5;
        }

        info!(
            field = %request.field_id,
            fitness = run.best_fitness,
            generations = run.generations,
            converged = run.converged,
            applications = best_schedule.application_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "GA optimization finished"
        );

        Ok(GeneticResult {
            best_schedule,
            best_fitness: run.best_fitness,
            objectives: evaluation.objectives,
            fitness_history: run.fitness_history,
            diversity_history: run.diversity_history,
            final_population: run.final_population,
            generations: run.generations,
            converged: run.converged,
            timed_out: run.timed_out,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}
