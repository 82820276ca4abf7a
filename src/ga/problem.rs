//! Fertilizer GA problem definition.
//!
//! Implements [`GaProblem`] for schedule optimization, bridging the
//! domain models to the generic GA engine.
//!
//! # Fitness
//!
//! ```text
//! fitness = Σ wᵢ · objectiveᵢ − penalty
//! penalty = budget_overrun × budget_per_dollar
//!         + max(0, deviation − deviation_tolerance) × deviation
//!         + unsuitable_applications × unsuitable_application
//! ```

use rand::Rng;
use rand::prelude::IndexedRandom;
use serde::{Deserialize, Serialize};

use super::chromosome::FertilizerChromosome;
use super::operators::GeneticOperators;
use super::runner::GaProblem;
use crate::context::FieldContext;
use crate::models::{ApplicationMethod, Nutrient, ObjectiveVector, ObjectiveWeights, Schedule};
use crate::scoring::{ScheduleEvaluation, evaluate_schedule};

/// Compact description of what genes may contain.
///
/// Extracted once from the [`FieldContext`] so operators never consult
/// the raw inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneSpace {
    /// Active nutrients with their requirements (lbs/acre).
    pub nutrients: Vec<(Nutrient, f64)>,
    /// Allowed methods.
    pub methods: Vec<ApplicationMethod>,
    /// Days whose weather permits application.
    pub feasible_days: Vec<u32>,
    /// Last day offset of the horizon.
    pub last_day: u32,
    pub allow_split: bool,
    /// Most applications per nutrient.
    pub max_splits: usize,
}

impl GeneSpace {
    pub fn from_context(ctx: &FieldContext<'_>, max_splits: usize) -> Self {
        let request = ctx.request;
        Self {
            nutrients: request
                .active_nutrients()
                .into_iter()
                .map(|n| (n, request.requirement(n)))
                .collect(),
            methods: request.method_list(),
            feasible_days: ctx.feasible_days(),
            last_day: ctx.last_day(),
            allow_split: request.allow_split,
            max_splits: max_splits.max(1),
        }
    }

    /// Requirement of a nutrient, if requested.
    pub fn requirement(&self, nutrient: Nutrient) -> Option<f64> {
        self.nutrients
            .iter()
            .find(|(n, _)| *n == nutrient)
            .map(|(_, amount)| *amount)
    }

    /// Random feasible day (any horizon day when none is feasible).
    pub fn random_day<R: Rng>(&self, rng: &mut R) -> u32 {
        match self.feasible_days.choose(rng) {
            Some(&day) => day,
            None => rng.random_range(0..=self.last_day),
        }
    }

    pub fn random_method<R: Rng>(&self, rng: &mut R) -> ApplicationMethod {
        self.methods
            .choose(rng)
            .copied()
            .unwrap_or(ApplicationMethod::Broadcast)
    }

    /// Median feasible day, used when repair must add an application.
    pub fn fallback_day(&self) -> u32 {
        self.feasible_days
            .get(self.feasible_days.len() / 2)
            .copied()
            .unwrap_or(self.last_day / 2)
    }

    pub fn fallback_method(&self) -> ApplicationMethod {
        self.methods
            .first()
            .copied()
            .unwrap_or(ApplicationMethod::Broadcast)
    }

    /// `day + shift`, clipped to the horizon.
    pub fn shift_day(&self, day: u32, shift: i64) -> u32 {
        (i64::from(day) + shift).clamp(0, i64::from(self.last_day)) as u32
    }
}

/// Constraint penalty coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyWeights {
    /// Penalty per dollar over budget.
    pub budget_per_dollar: f64,
    /// Requirement deviation tolerated without penalty (fraction).
    pub deviation_tolerance: f64,
    /// Penalty per unit of deviation beyond the tolerance.
    pub deviation: f64,
    /// Penalty per application on a day that does not permit one.
    pub unsuitable_application: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            budget_per_dollar: 1.0,
            deviation_tolerance: 0.10,
            deviation: 200.0,
            unsuitable_application: 10.0,
        }
    }
}

impl PenaltyWeights {
    /// Total penalty of an evaluation (0 when every constraint holds).
    pub fn penalty(&self, evaluation: &ScheduleEvaluation) -> f64 {
        evaluation.budget_overrun * self.budget_per_dollar
            + (evaluation.max_requirement_deviation - self.deviation_tolerance).max(0.0)
                * self.deviation
            + evaluation.unsuitable_applications as f64 * self.unsuitable_application
    }
}

/// GA problem over one field context.
pub struct FertilizerGaProblem<'c, 'a> {
    ctx: &'c FieldContext<'a>,
    pub space: GeneSpace,
    pub operators: GeneticOperators,
    pub weights: ObjectiveWeights,
    pub penalties: PenaltyWeights,
    /// Repair offspring so per-nutrient totals stay exact.
    pub repair: bool,
}

impl<'c, 'a> FertilizerGaProblem<'c, 'a> {
    pub fn new(ctx: &'c FieldContext<'a>, max_splits: usize) -> Self {
        Self {
            ctx,
            space: GeneSpace::from_context(ctx, max_splits),
            operators: GeneticOperators::default(),
            weights: ObjectiveWeights::default(),
            penalties: PenaltyWeights::default(),
            repair: true,
        }
    }

    pub fn with_operators(mut self, operators: GeneticOperators) -> Self {
        self.operators = operators;
        self
    }

    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_penalties(mut self, penalties: PenaltyWeights) -> Self {
        self.penalties = penalties;
        self
    }

    pub fn with_repair(mut self, repair: bool) -> Self {
        self.repair = repair;
        self
    }

    pub fn context(&self) -> &FieldContext<'a> {
        self.ctx
    }

    /// Decodes a chromosome into a Schedule.
    pub fn decode(&self, chromosome: &FertilizerChromosome) -> Schedule {
        chromosome.to_schedule(self.ctx)
    }

    /// Schedule-wide evaluation of a chromosome.
    pub fn evaluation(&self, chromosome: &FertilizerChromosome) -> ScheduleEvaluation {
        evaluate_schedule(self.ctx, &self.decode(chromosome))
    }

    /// Objective vector of a chromosome.
    pub fn objectives(&self, chromosome: &FertilizerChromosome) -> ObjectiveVector {
        self.evaluation(chromosome).objectives
    }

    /// Constraint penalty of a chromosome.
    pub fn penalty(&self, chromosome: &FertilizerChromosome) -> f64 {
        self.penalties.penalty(&self.evaluation(chromosome))
    }

    fn finish(&self, chromosome: &mut FertilizerChromosome) {
        if self.repair {
            chromosome.repair(&self.space);
        }
    }
}

impl GaProblem for FertilizerGaProblem<'_, '_> {
    type Individual = FertilizerChromosome;

    fn create_individual<R: Rng>(&self, rng: &mut R) -> FertilizerChromosome {
        let mut chromosome = FertilizerChromosome::random(&self.space, rng);
        self.finish(&mut chromosome);
        chromosome
    }

    fn evaluate(&self, individual: &FertilizerChromosome) -> f64 {
        let evaluation = self.evaluation(individual);
        evaluation.objectives.weighted_sum(&self.weights) - self.penalties.penalty(&evaluation)
    }

    fn crossover<R: Rng>(
        &self,
        parent1: &FertilizerChromosome,
        parent2: &FertilizerChromosome,
        rng: &mut R,
    ) -> Vec<FertilizerChromosome> {
        let (mut c1, mut c2) = self.operators.crossover(parent1, parent2, &self.space, rng);
        self.finish(&mut c1);
        self.finish(&mut c2);
        vec![c1, c2]
    }

    fn mutate<R: Rng>(&self, individual: &mut FertilizerChromosome, rate: f64, rng: &mut R) {
        self.operators.mutate(individual, &self.space, rate, rng);
        self.finish(individual);
    }
}
