//! Configurable genetic operators for fertilizer schedules.
//!
//! Provides runtime-selectable crossover and mutation strategies
//! via [`GeneticOperators`].
//!
//! # Usage
//!
//! ```
//! use u_fertilize::ga::operators::{CrossoverType, GeneticOperators, MutationType};
//!
//! let ops = GeneticOperators::default();
//! assert_eq!(ops.crossover_type, CrossoverType::SinglePoint);
//! assert_eq!(ops.mutation_type, MutationType::Perturb);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::GeneSpace;
use super::chromosome::{
    FertilizerChromosome, nutrient_block_crossover, perturb_mutation, shift_mutation,
    single_point_crossover, split_merge_mutation,
};

/// Crossover strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverType {
    /// Cut both day-sorted gene lists at one point and swap tails.
    SinglePoint,
    /// Inherit each nutrient's gene group whole from one parent.
    NutrientBlock,
}

/// Mutation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationType {
    /// Per-gene date / amount / method perturbation.
    Perturb,
    /// Shift every application of a nutrient by the same offset.
    Shift,
}

/// Runtime-selectable genetic operators.
///
/// # Example
///
/// ```
/// use u_fertilize::ga::operators::{CrossoverType, GeneticOperators, MutationType};
///
/// let ops = GeneticOperators {
///     crossover_type: CrossoverType::NutrientBlock,
///     mutation_type: MutationType::Shift,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticOperators {
    pub crossover_type: CrossoverType,
    pub mutation_type: MutationType,
}

impl Default for GeneticOperators {
    fn default() -> Self {
        Self {
            crossover_type: CrossoverType::SinglePoint,
            mutation_type: MutationType::Perturb,
        }
    }
}

impl GeneticOperators {
    /// Performs crossover using the configured strategy.
    pub fn crossover<R: Rng>(
        &self,
        p1: &FertilizerChromosome,
        p2: &FertilizerChromosome,
        space: &GeneSpace,
        rng: &mut R,
    ) -> (FertilizerChromosome, FertilizerChromosome) {
        match self.crossover_type {
            CrossoverType::SinglePoint => single_point_crossover(p1, p2, rng),
            CrossoverType::NutrientBlock => nutrient_block_crossover(p1, p2, space, rng),
        }
    }

    /// Performs mutation using the configured strategy.
    ///
    /// With probability `rate` also splits or merges an application, so
    /// the number of applications evolves too.
    pub fn mutate<R: Rng>(
        &self,
        chromosome: &mut FertilizerChromosome,
        space: &GeneSpace,
        rate: f64,
        rng: &mut R,
    ) {
        match self.mutation_type {
            MutationType::Perturb => perturb_mutation(chromosome, space, rate, rng),
            MutationType::Shift => shift_mutation(chromosome, space, rate, rng),
        }
        if rng.random_bool(rate) {
            split_merge_mutation(chromosome, space, rng);
        }
    }
}
