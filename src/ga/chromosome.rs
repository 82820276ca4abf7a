//! Gene-list chromosome for fertilizer schedules.
//!
//! # Encoding
//!
//! A chromosome is the schedule itself: a list of [`Gene`]s, one per
//! application, kept sorted by (day, nutrient). The number of genes per
//! nutrient is the number of split applications, so chromosomes vary in
//! length.
//!
//! # Reference
//! Michalewicz (1996), "Genetic Algorithms + Data Structures = Evolution Programs", ch. 7

use std::collections::BTreeMap;

use rand::Rng;
use rand::prelude::IndexedRandom;
use serde::{Deserialize, Serialize};

use super::GeneSpace;
use super::runner::Individual;
use crate::context::FieldContext;
use crate::models::{ApplicationMethod, Nutrient, Schedule};

/// Largest day shift applied by date mutations.
pub const MAX_DAY_SHIFT: i64 = 7;

/// Relative amount perturbation of amount mutations (±20%).
pub const AMOUNT_PERTURBATION: f64 = 0.2;

/// One application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub nutrient: Nutrient,
    /// Day offset from planting.
    pub day: u32,
    /// Amount (lbs/acre).
    pub amount: f64,
    pub method: ApplicationMethod,
}

/// Variable-length schedule chromosome.
///
/// Higher fitness = better schedule.
#[derive(Debug, Clone)]
pub struct FertilizerChromosome {
    pub genes: Vec<Gene>,
    pub fitness: f64,
}

impl Individual for FertilizerChromosome {
    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }
}

impl FertilizerChromosome {
    pub fn new(genes: Vec<Gene>) -> Self {
        let mut chromosome = Self {
            genes,
            fitness: f64::NEG_INFINITY,
        };
        chromosome.sort_genes();
        chromosome
    }

    /// Random chromosome: 1 to `max_splits` applications per nutrient
    /// (one if splitting is off) on random feasible days, with the
    /// requirement divided by random weights.
    pub fn random<R: Rng>(space: &GeneSpace, rng: &mut R) -> Self {
        let mut genes = Vec::new();
        for &(nutrient, required) in &space.nutrients {
            let splits = if space.allow_split {
                rng.random_range(1..=space.max_splits.max(1))
            } else {
                1
            };
            let weights: Vec<f64> = (0..splits).map(|_| rng.random_range(0.2..1.0)).collect();
            let total: f64 = weights.iter().sum();
            for w in weights {
                genes.push(Gene {
                    nutrient,
                    day: space.random_day(rng),
                    amount: required * w / total,
                    method: space.random_method(rng),
                });
            }
        }
        Self::new(genes)
    }

    /// Genes of one nutrient.
    pub fn genes_for(&self, nutrient: Nutrient) -> impl Iterator<Item = &Gene> {
        self.genes.iter().filter(move |g| g.nutrient == nutrient)
    }

    /// Applied total per nutrient.
    pub fn totals(&self) -> BTreeMap<Nutrient, f64> {
        let mut totals = BTreeMap::new();
        for g in &self.genes {
            *totals.entry(g.nutrient).or_insert(0.0) += g.amount;
        }
        totals
    }

    /// Restores structural feasibility.
    ///
    /// After repair: only requested nutrients appear, each at least once,
    /// at most `max_splits` times (once if splitting is off); days lie in
    /// the horizon; amounts of each nutrient sum exactly to its requirement.
    pub fn repair(&mut self, space: &GeneSpace) {
        let mut groups: BTreeMap<Nutrient, Vec<Gene>> = BTreeMap::new();
        for g in self.genes.drain(..) {
            if space.requirement(g.nutrient).is_some() && g.amount.is_finite() {
                groups.entry(g.nutrient).or_default().push(g);
            }
        }

        for &(nutrient, required) in &space.nutrients {
            let mut group = groups.remove(&nutrient).unwrap_or_default();
            if group.is_empty() {
                group.push(Gene {
                    nutrient,
                    day: space.fallback_day(),
                    amount: required,
                    method: space.fallback_method(),
                });
            }

            merge_same_day(&mut group);
            let limit = if space.allow_split {
                space.max_splits.max(1)
            } else {
                1
            };
            if group.len() > limit {
                group.sort_by(|a, b| b.amount.total_cmp(&a.amount));
                group.truncate(limit);
            }

            for g in &mut group {
                g.day = g.day.min(space.last_day);
                g.amount = g.amount.max(0.0);
            }
            let total: f64 = group.iter().map(|g| g.amount).sum();
            let count = group.len() as f64;
            for g in &mut group {
                g.amount = if total > 0.0 {
                    g.amount * required / total
                } else {
                    required / count
                };
            }
            self.genes.extend(group);
        }
        self.sort_genes();
    }

    /// Decodes into a schedule of dated applications.
    pub fn to_schedule(&self, ctx: &FieldContext<'_>) -> Schedule {
        let mut schedule = Schedule::new();
        for g in &self.genes {
            if g.amount > 0.0 {
                schedule.add_application(ctx.date_of(g.day), g.nutrient, g.amount, g.method);
            }
        }
        schedule
    }

    fn sort_genes(&mut self) {
        self.genes
            .sort_by(|a, b| a.day.cmp(&b.day).then(a.nutrient.cmp(&b.nutrient)));
    }
}

/// Folds genes sharing day and method into one.
fn merge_same_day(group: &mut Vec<Gene>) {
    let mut merged: Vec<Gene> = Vec::with_capacity(group.len());
    for g in group.drain(..) {
        match merged
            .iter_mut()
            .find(|m| m.day == g.day && m.method == g.method)
        {
            Some(m) => m.amount += g.amount,
            None => merged.push(g),
        }
    }
    *group = merged;
}

// ======================== Crossover operators ========================

/// Single-point crossover on the day-sorted gene lists.
///
/// Child 1 takes parent 1's genes before the cut and parent 2's after it.
pub fn single_point_crossover<R: Rng>(
    p1: &FertilizerChromosome,
    p2: &FertilizerChromosome,
    rng: &mut R,
) -> (FertilizerChromosome, FertilizerChromosome) {
    let len = p1.genes.len().min(p2.genes.len());
    if len < 2 {
        return (
            FertilizerChromosome::new(p1.genes.clone()),
            FertilizerChromosome::new(p2.genes.clone()),
        );
    }
    let cut = rng.random_range(1..len);
    let c1: Vec<Gene> = p1.genes[..cut].iter().chain(&p2.genes[cut..]).copied().collect();
    let c2: Vec<Gene> = p2.genes[..cut].iter().chain(&p1.genes[cut..]).copied().collect();
    (FertilizerChromosome::new(c1), FertilizerChromosome::new(c2))
}

/// Nutrient-block crossover: each nutrient's whole gene group is
/// inherited from one parent, so per-nutrient totals survive intact.
pub fn nutrient_block_crossover<R: Rng>(
    p1: &FertilizerChromosome,
    p2: &FertilizerChromosome,
    space: &GeneSpace,
    rng: &mut R,
) -> (FertilizerChromosome, FertilizerChromosome) {
    let mut c1 = Vec::new();
    let mut c2 = Vec::new();
    for &(nutrient, _) in &space.nutrients {
        let (a, b) = if rng.random_bool(0.5) { (p1, p2) } else { (p2, p1) };
        c1.extend(a.genes_for(nutrient).copied());
        c2.extend(b.genes_for(nutrient).copied());
    }
    (FertilizerChromosome::new(c1), FertilizerChromosome::new(c2))
}

// ======================== Mutation operators ========================

/// Per-gene perturbation: with probability `rate` a gene's date
/// (±7 days, clipped to the horizon), amount (±20%) or method changes.
pub fn perturb_mutation<R: Rng>(
    chromosome: &mut FertilizerChromosome,
    space: &GeneSpace,
    rate: f64,
    rng: &mut R,
) {
    for g in &mut chromosome.genes {
        if !rng.random_bool(rate) {
            continue;
        }
        match rng.random_range(0..3) {
            0 => {
                let shift = rng.random_range(-MAX_DAY_SHIFT..=MAX_DAY_SHIFT);
                g.day = space.shift_day(g.day, shift);
            }
            1 => {
                g.amount *= rng.random_range(1.0 - AMOUNT_PERTURBATION..=1.0 + AMOUNT_PERTURBATION);
            }
            _ => g.method = space.random_method(rng),
        }
    }
    chromosome.sort_genes();
}

/// Shifts all applications of a nutrient by one common offset
/// (probability `rate` per nutrient), preserving their spacing.
pub fn shift_mutation<R: Rng>(
    chromosome: &mut FertilizerChromosome,
    space: &GeneSpace,
    rate: f64,
    rng: &mut R,
) {
    for &(nutrient, _) in &space.nutrients {
        if !rng.random_bool(rate) {
            continue;
        }
        let shift = rng.random_range(-MAX_DAY_SHIFT..=MAX_DAY_SHIFT);
        for g in chromosome.genes.iter_mut().filter(|g| g.nutrient == nutrient) {
            g.day = space.shift_day(g.day, shift);
        }
    }
    chromosome.sort_genes();
}

/// Splits one random gene in two or merges two genes of a nutrient,
/// changing the number of applications. No-op when splitting is off.
pub fn split_merge_mutation<R: Rng>(
    chromosome: &mut FertilizerChromosome,
    space: &GeneSpace,
    rng: &mut R,
) {
    if !space.allow_split || chromosome.genes.is_empty() {
        return;
    }
    let idx = rng.random_range(0..chromosome.genes.len());
    let gene = chromosome.genes[idx];
    let siblings: Vec<usize> = chromosome
        .genes
        .iter()
        .enumerate()
        .filter(|(i, g)| *i != idx && g.nutrient == gene.nutrient)
        .map(|(i, _)| i)
        .collect();

    if siblings.len() + 1 < space.max_splits && rng.random_bool(0.5) {
        let half = gene.amount / 2.0;
        chromosome.genes[idx].amount = half;
        chromosome.genes.push(Gene {
            day: space.random_day(rng),
            amount: half,
            ..gene
        });
    } else if let Some(&other) = siblings.choose(rng) {
        chromosome.genes[other].amount += gene.amount;
        chromosome.genes.remove(idx);
    }
    chromosome.sort_genes();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use Nutrient::{Nitrogen, Potassium, Sulfur};

    fn space(allow_split: bool) -> GeneSpace {
        GeneSpace {
            nutrients: vec![(Nutrient::Nitrogen, 150.0), (Nutrient::Potassium, 60.0)],
            methods: vec![ApplicationMethod::Broadcast, ApplicationMethod::Banded],
            feasible_days: (0..=90).filter(|d| d % 10 != 3).collect(),
            last_day: 90,
            allow_split,
            max_splits: 3,
        }
    }

    fn assert_exact_totals(ch: &FertilizerChromosome, space: &GeneSpace) {
        let totals = ch.totals();
        for &(n, req) in &space.nutrients {
            assert!((totals[&n] - req).abs() < 1e-9, "{n}: {} vs {req}", totals[&n]);
        }
    }

    #[test]
    fn test_random_chromosome() {
        let space = space(true);
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..20 {
            let ch = FertilizerChromosome::random(&space, &mut rng);
            assert_exact_totals(&ch, &space);
            assert!(ch.genes.iter().all(|g| space.feasible_days.contains(&g.day)));
            for &(n, _) in &space.nutrients {
                let count = ch.genes_for(n).count();
                assert!((1..=3).contains(&count));
            }
            assert!(ch.genes.windows(2).all(|w| w[0].day <= w[1].day));
            assert_eq!(ch.fitness, f64::NEG_INFINITY);
        }
    }

    #[test]
    fn test_random_without_split_has_one_gene_per_nutrient() {
        let space = space(false);
        let mut rng = SmallRng::seed_from_u64(42);
        let ch = FertilizerChromosome::random(&space, &mut rng);
        assert_eq!(ch.genes.len(), 2);
    }

    #[test]
    fn test_repair_restores_totals_and_presence() {
        let space = space(true);
        let mut ch = FertilizerChromosome::new(vec![
            Gene { nutrient: Nitrogen, day: 200, amount: 40.0, method: ApplicationMethod::Broadcast },
            Gene { nutrient: Nitrogen, day: 20, amount: 40.0, method: ApplicationMethod::Broadcast },
            Gene { nutrient: Nitrogen, day: 20, amount: 20.0, method: ApplicationMethod::Broadcast },
            Gene { nutrient: Sulfur, day: 10, amount: 5.0, method: ApplicationMethod::Broadcast },
        ]);
        ch.repair(&space);

        assert_exact_totals(&ch, &space);
        assert!(ch.genes.iter().all(|g| g.day <= 90));
        assert_eq!(ch.genes_for(Sulfur).count(), 0);
        assert_eq!(ch.genes_for(Potassium).count(), 1);
        // Same-day genes merged.
        assert_eq!(ch.genes_for(Nitrogen).count(), 2);
    }

    #[test]
    fn test_repair_merges_when_split_disabled() {
        let strict = space(false);
        let mut rng = SmallRng::seed_from_u64(7);
        let mut ch = FertilizerChromosome::random(&space(true), &mut rng);
        ch.genes.push(Gene { nutrient: Nitrogen, day: 45, amount: 500.0, method: ApplicationMethod::Banded });
        ch.repair(&strict);
        assert_eq!(ch.genes_for(Nitrogen).count(), 1);
        assert_eq!(ch.genes_for(Nitrogen).next().map(|g| g.day), Some(45));
        assert_exact_totals(&ch, &strict);
    }

    #[test]
    fn test_single_point_crossover_mixes_parents() {
        let space = space(true);
        let mut rng = SmallRng::seed_from_u64(42);
        let p1 = FertilizerChromosome::random(&space, &mut rng);
        let p2 = FertilizerChromosome::random(&space, &mut rng);
        let (c1, c2) = single_point_crossover(&p1, &p2, &mut rng);
        assert_eq!(c1.genes.len() + c2.genes.len(), p1.genes.len() + p2.genes.len());
        assert_eq!(c1.fitness, f64::NEG_INFINITY);
    }

    #[test]
    fn test_nutrient_block_crossover_preserves_totals() {
        let space = space(true);
        let mut rng = SmallRng::seed_from_u64(42);
        let p1 = FertilizerChromosome::random(&space, &mut rng);
        let p2 = FertilizerChromosome::random(&space, &mut rng);
        for _ in 0..10 {
            let (c1, c2) = nutrient_block_crossover(&p1, &p2, &space, &mut rng);
            assert_exact_totals(&c1, &space);
            assert_exact_totals(&c2, &space);
        }
    }

    #[test]
    fn test_perturb_mutation_stays_in_horizon() {
        let space = space(true);
        let mut rng = SmallRng::seed_from_u64(42);
        let mut ch = FertilizerChromosome::random(&space, &mut rng);
        let before = ch.genes.clone();
        for _ in 0..50 {
            perturb_mutation(&mut ch, &space, 1.0, &mut rng);
        }
        assert_ne!(before, ch.genes);
        assert!(ch.genes.iter().all(|g| g.day <= 90));
        assert!(ch.genes.iter().all(|g| space.methods.contains(&g.method)));
    }

    #[test]
    fn test_zero_rate_mutation_is_identity() {
        let space = space(true);
        let mut rng = SmallRng::seed_from_u64(42);
        let mut ch = FertilizerChromosome::random(&space, &mut rng);
        let before = ch.genes.clone();
        perturb_mutation(&mut ch, &space, 0.0, &mut rng);
        shift_mutation(&mut ch, &space, 0.0, &mut rng);
        assert_eq!(before, ch.genes);
    }

    #[test]
    fn test_split_merge_preserves_totals() {
        let space = space(true);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut ch = FertilizerChromosome::random(&space, &mut rng);
        for _ in 0..30 {
            split_merge_mutation(&mut ch, &space, &mut rng);
            assert_exact_totals(&ch, &space);
            for &(n, _) in &space.nutrients {
                assert!((1..=3).contains(&ch.genes_for(n).count()));
            }
        }
    }
}
