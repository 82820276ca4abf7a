//! Multi-objective (Pareto) schedule optimization.
//!
//! NSGA-II over the same chromosome, initialization, crossover and
//! mutation as the [`ga`](crate::ga) module. Selection and survival rank
//! the combined parent + offspring population by constrained
//! non-dominated sorting and break ties within a front by crowding
//! distance. The final front is verified to be mutually non-dominated.
//!
//! # Submodules
//!
//! - [`sort`]: fast non-dominated sort, constrained dominance, crowding distance
//! - [`analysis`]: ranges, objective correlations, knee point, front verification
//!
//! # Reference
//! Deb et al. (2002), "A Fast and Elitist Multiobjective Genetic Algorithm: NSGA-II"

pub mod analysis;
pub mod sort;

pub use analysis::{
    ObjectiveCorrelation, ObjectiveRange, TradeOffAnalysis, knee_point, pearson, verify_front,
};
pub use sort::{
    constrained_dominates, constrained_non_dominated_sort, crowding_distance,
    fast_non_dominated_sort, non_dominated_sort,
};

use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::FieldContext;
use crate::control::Deadline;
use crate::error::{OptimizerError, Result};
use crate::ga::operators::GeneticOperators;
use crate::ga::{FertilizerChromosome, FertilizerGaProblem, GaProblem, PenaltyWeights};
use crate::models::{
    GrowthStageCalendar, ObjectiveVector, ObjectiveWeights, OptimizationRequest, Schedule,
    WeatherWindow,
};
use crate::scoring::{ScoringParams, finalize_schedule};
use crate::validation::validate_inputs;

/// NSGA-II configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParetoConfig {
    pub population_size: usize,
    pub max_generations: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub operators: GeneticOperators,
    pub penalties: PenaltyWeights,
    pub max_splits: usize,
    /// Default preference weights for picking the recommended solution.
    pub weights: ObjectiveWeights,
    pub seed: u64,
    pub parallel: bool,
}

impl Default for ParetoConfig {
    fn default() -> Self {
        Self {
            population_size: 60,
            max_generations: 80,
            crossover_rate: 0.9,
            mutation_rate: 0.15,
            operators: GeneticOperators::default(),
            penalties: PenaltyWeights::default(),
            max_splits: 3,
            weights: ObjectiveWeights::default(),
            seed: 42,
            parallel: true,
        }
    }
}

impl ParetoConfig {
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    pub fn with_max_generations(mut self, generations: usize) -> Self {
        self.max_generations = generations;
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

    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.population_size < 4 {
            return Err(OptimizerError::InvalidConfig(format!(
                "population size {} < 4",
                self.population_size
            )));
        }
        for (name, rate) in [
            ("crossover rate", self.crossover_rate),
            ("mutation rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(OptimizerError::InvalidConfig(format!(
                    "{name} {rate} outside [0, 1]"
                )));
            }
        }
        if self.max_splits == 0 {
            return Err(OptimizerError::InvalidConfig("max splits must be positive".into()));
        }
        Ok(())
    }
}

/// One evaluated solution.
#[derive(Debug, Clone)]
pub struct ParetoSolution {
    pub schedule: Schedule,
    pub objectives: ObjectiveVector,
    /// Constraint penalty (0 = feasible).
    pub violation: f64,
    /// Non-domination rank (0 = Pareto front).
    pub rank: usize,
    pub crowding_distance: f64,
}

/// Result of a multi-objective optimization.
#[derive(Debug, Clone)]
pub struct ParetoResult {
    /// Rank-0 solutions, mutually non-dominated.
    pub pareto_front: Vec<ParetoSolution>,
    /// Whole final population.
    pub all_solutions: Vec<ParetoSolution>,
    /// Front member maximizing the preference-weighted sum.
    pub recommended_solution: ParetoSolution,
    pub trade_off_analysis: TradeOffAnalysis,
    pub generations: usize,
    pub timed_out: bool,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

/// Population member with cached evaluation.
#[derive(Debug, Clone)]
struct Member {
    chromosome: FertilizerChromosome,
    objectives: ObjectiveVector,
    violation: f64,
    rank: usize,
    crowding: f64,
}

/// NSGA-II optimizer.
#[derive(Debug, Clone, Default)]
pub struct ParetoOptimizer {
    pub config: ParetoConfig,
    pub params: ScoringParams,
}

impl ParetoOptimizer {
    pub fn new(config: ParetoConfig) -> Self {
        Self {
            config,
            params: ScoringParams::default(),
        }
    }

    pub fn with_scoring(mut self, params: ScoringParams) -> Self {
        self.params = params;
        self
    }

    /// Optimizes without a time limit. `preference` overrides the
    /// configured weights for the recommended solution.
    pub fn optimize(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        preference: Option<ObjectiveWeights>,
    ) -> Result<ParetoResult> {
        self.optimize_until(request, windows, calendar, preference, &Deadline::none())
    }

    pub fn optimize_until(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        preference: Option<ObjectiveWeights>,
        deadline: &Deadline,
    ) -> Result<ParetoResult> {
        validate_inputs(request, windows, calendar).map_err(OptimizerError::InvalidRequest)?;
        self.config.validate()?;
        self.params.validate()?;

        let started = Instant::now();
        let cfg = &self.config;
        let weights = preference.unwrap_or(cfg.weights).normalized();
        let ctx = FieldContext::new(request, windows, calendar, &self.params);
        let problem = FertilizerGaProblem::new(&ctx, cfg.max_splits)
            .with_operators(cfg.operators.clone())
            .with_penalties(cfg.penalties.clone());
        let mut rng = SmallRng::seed_from_u64(cfg.seed);
        debug!(
            field = %request.field_id,
            population = cfg.population_size,
            generations = cfg.max_generations,
            "starting NSGA-II"
        );

        let initial: Vec<FertilizerChromosome> = (0..cfg.population_size)
            .map(|_| problem.create_individual(&mut rng))
            .collect();
        let mut population = self.evaluate(&problem, initial);
        assign_rank_and_crowding(&mut population);

        let mut generations = 0;
        let mut timed_out = false;
        for generation in 1..=cfg.max_generations {
            if deadline.is_expired() {
                warn!(generation, "NSGA-II deadline reached, returning current front");
                timed_out = true;
                break;
            }

            let mut offspring = Vec::with_capacity(cfg.population_size);
            while offspring.len() < cfg.population_size {
                let p1 = binary_tournament(&population, &mut rng);
                let p2 = binary_tournament(&population, &mut rng);
                let children = if rng.random_bool(cfg.crossover_rate) {
                    problem.crossover(p1, p2, &mut rng)
                } else {
                    vec![p1.clone(), p2.clone()]
                };
                for mut child in children {
                    if offspring.len() >= cfg.population_size {
                        break;
                    }
                    problem.mutate(&mut child, cfg.mutation_rate, &mut rng);
                    offspring.push(child);
                }
            }

            let mut combined = population;
            combined.extend(self.evaluate(&problem, offspring));
            population = select_survivors(combined, cfg.population_size);
            generations = generation;
        }

        if population.is_empty() {
            return Err(OptimizerError::InvariantViolation(
                "NSGA-II population is empty".into(),
            ));
        }

        let all_solutions: Vec<ParetoSolution> = population
            .iter()
            .map(|m| to_solution(&problem, &ctx, m))
            .collect();
        let pareto_front: Vec<ParetoSolution> = all_solutions
            .iter()
            .filter(|s| s.rank == 0)
            .cloned()
            .collect();
        let front_objectives: Vec<ObjectiveVector> =
            pareto_front.iter().map(|s| s.objectives).collect();
        verify_front(&front_objectives)?;

        let recommended_solution = pareto_front
            .iter()
            .max_by(|a, b| {
                a.objectives
                    .weighted_sum(&weights)
                    .total_cmp(&b.objectives.weighted_sum(&weights))
            })
            .cloned()
            .ok_or_else(|| OptimizerError::InvariantViolation("empty pareto front".into()))?;
        let trade_off_analysis = TradeOffAnalysis::from_front(&front_objectives);

        let spread = (pareto_front.len() as f64 / 10.0).min(1.0);
        let quality = recommended_solution.objectives.weighted_sum(&weights) / 100.0;
        let mut confidence = 0.5 * quality + 0.3 * spread + 0.2;
        if !recommended_solution.schedule.is_complete() {
            confidence *= 0.5;
        }

        info!(
            field = %request.field_id,
            front = pareto_front.len(),
            generations,
            recommended = recommended_solution.objectives.weighted_sum(&weights),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "NSGA-II optimization finished"
        );

        Ok(ParetoResult {
            pareto_front,
            all_solutions,
            recommended_solution,
            trade_off_analysis,
            generations,
            timed_out,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    fn evaluate(
        &self,
        problem: &FertilizerGaProblem<'_, '_>,
        chromosomes: Vec<FertilizerChromosome>,
    ) -> Vec<Member> {
        let build = |chromosome: FertilizerChromosome| {
            let evaluation = problem.evaluation(&chromosome);
            Member {
                violation: problem.penalties.penalty(&evaluation),
                objectives: evaluation.objectives,
                chromosome,
                rank: usize::MAX,
                crowding: 0.0,
            }
        };
        if self.config.parallel {
            chromosomes.into_par_iter().map(build).collect()
        } else {
            chromosomes.into_iter().map(build).collect()
        }
    }
}

fn to_solution(
    problem: &FertilizerGaProblem<'_, '_>,
    ctx: &FieldContext<'_>,
    member: &Member,
) -> ParetoSolution {
    let mut schedule = problem.decode(&member.chromosome);
    finalize_schedule(ctx, &mut schedule);
    ParetoSolution {
        schedule,
        objectives: member.objectives,
        violation: member.violation,
        rank: member.rank,
        crowding_distance: member.crowding,
    }
}

fn sort_members(members: &[Member]) -> Vec<Vec<usize>> {
    let objectives: Vec<ObjectiveVector> = members.iter().map(|m| m.objectives).collect();
    let violations: Vec<f64> = members.iter().map(|m| m.violation).collect();
    constrained_non_dominated_sort(&objectives, &violations)
}

fn assign_rank_and_crowding(members: &mut [Member]) {
    let objectives: Vec<ObjectiveVector> = members.iter().map(|m| m.objectives).collect();
    for (rank, front) in sort_members(members).iter().enumerate() {
        let distances = crowding_distance(&objectives, front);
        for (&i, d) in front.iter().zip(distances) {
            members[i].rank = rank;
            members[i].crowding = d;
        }
    }
}

/// Elitist survival: whole fronts while they fit, then the least crowded
/// members of the first front that does not.
fn select_survivors(mut combined: Vec<Member>, size: usize) -> Vec<Member> {
    assign_rank_and_crowding(&mut combined);
    let fronts = sort_members(&combined);

    let mut chosen: Vec<usize> = Vec::with_capacity(size);
    for front in fronts {
        if chosen.len() + front.len() <= size {
            chosen.extend(front);
            continue;
        }
        let mut rest = front;
        rest.sort_by(|&a, &b| combined[b].crowding.total_cmp(&combined[a].crowding));
        rest.truncate(size - chosen.len());
        chosen.extend(rest);
        break;
    }

    chosen.sort_unstable();
    let mut slots: Vec<Option<Member>> = combined.into_iter().map(Some).collect();
    let mut survivors: Vec<Member> = chosen.into_iter().filter_map(|i| slots[i].take()).collect();
    assign_rank_and_crowding(&mut survivors);
    survivors
}

/// Lower rank wins; equal rank → larger crowding distance; full tie → first draw.
fn binary_tournament<'p, R: Rng>(members: &'p [Member], rng: &mut R) -> &'p FertilizerChromosome {
    let a = &members[rng.random_range(0..members.len())];
    let b = &members[rng.random_range(0..members.len())];
    let b_wins = b.rank < a.rank || (b.rank == a.rank && b.crowding > a.crowding);
    if b_wins { &b.chromosome } else { &a.chromosome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Nutrient, REQUIREMENT_TOLERANCE};
    use crate::scoring::test_support::*;

    fn small_config() -> ParetoConfig {
        ParetoConfig::default()
            .with_population_size(24)
            .with_max_generations(15)
            .with_seed(42)
            .with_parallel(false)
    }

    #[test]
    fn test_front_is_non_dominated() {
        let request = corn_request(120).with_requirement(Nutrient::Potassium, 60.0);
        let result = ParetoOptimizer::new(small_config())
            .optimize(&request, &season_weather(120), &corn_calendar(), None)
            .unwrap();

        assert!(!result.pareto_front.is_empty());
        for a in &result.pareto_front {
            assert_eq!(a.rank, 0);
            for b in &result.pareto_front {
                assert!(!a.objectives.dominates(&b.objectives));
            }
        }
        assert_eq!(result.all_solutions.len(), 24);
        assert_eq!(result.trade_off_analysis.front_size, result.pareto_front.len());
    }

    #[test]
    fn test_recommended_maximizes_preference() {
        let request = corn_request(90);
        let preference = ObjectiveWeights::new(0.0, 1.0, 0.0, 0.0);
        let result = ParetoOptimizer::new(small_config())
            .optimize(&request, &season_weather(90), &corn_calendar(), Some(preference))
            .unwrap();
        let best_cost = result
            .pareto_front
            .iter()
            .map(|s| s.objectives.cost_efficiency)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.recommended_solution.objectives.cost_efficiency, best_cost);
    }

    #[test]
    fn test_solutions_meet_requirements() {
        let request = corn_request(90);
        let result = ParetoOptimizer::new(small_config())
            .optimize(&request, &season_weather(90), &corn_calendar(), None)
            .unwrap();
        for s in &result.pareto_front {
            let applied = s.schedule.total_applied(Nutrient::Nitrogen);
            assert!((applied - 150.0).abs() <= 150.0 * REQUIREMENT_TOLERANCE);
            assert!(s.schedule.within_horizon(&request));
        }
    }

    #[test]
    fn test_deterministic_with_seed() {
        let request = corn_request(60);
        let weather = season_weather(60);
        let calendar = corn_calendar();
        let run = |parallel: bool| {
            ParetoOptimizer::new(small_config().with_parallel(parallel))
                .optimize(&request, &weather, &calendar, None)
                .unwrap()
        };
        let a = run(false);
        let b = run(true);
        assert_eq!(a.pareto_front.len(), b.pareto_front.len());
        assert_eq!(a.recommended_solution.schedule, b.recommended_solution.schedule);
    }

    #[test]
    fn test_survivor_selection_keeps_size_and_front() {
        let request = corn_request(60);
        let params = ScoringParams::default();
        let calendar = corn_calendar();
        let weather = season_weather(60);
        let ctx = FieldContext::new(&request, &weather, &calendar, &params);
        let problem = FertilizerGaProblem::new(&ctx, 3);
        let optimizer = ParetoOptimizer::new(small_config());
        let mut rng = SmallRng::seed_from_u64(1);

        let chromosomes: Vec<_> = (0..30).map(|_| problem.create_individual(&mut rng)).collect();
        let members = optimizer.evaluate(&problem, chromosomes);
        let front_size = sort_members(&members)[0].len();
        let survivors = select_survivors(members, 12);
        assert_eq!(survivors.len(), 12);
        assert_eq!(
            survivors.iter().filter(|m| m.rank == 0).count(),
            front_size.min(12)
        );
    }

    #[test]
    fn test_small_population_rejected() {
        let err = ParetoOptimizer::new(small_config().with_population_size(2))
            .optimize(&corn_request(30), &[], &corn_calendar(), None)
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidConfig(_)));
    }
}
