//! Monte Carlo uncertainty analysis of a schedule.
//!
//! # Procedure
//!
//! 1. Draw `scenario_count` scenarios ([`scenario`]).
//! 2. Evaluate the schedule in every scenario (rayon when `parallel`);
//!    the outcome is the weighted objective sum minus constraint penalties.
//! 3. Summarize: weighted mean, 80/90/95% intervals, VaR/CVaR, downside
//!    deviation, Sharpe-like ratio, per-objective summaries ([`metrics`]).
//! 4. Robust schedule: evaluate shifted, split, consolidated and jittered
//!    variants over the same scenarios and keep the one maximizing
//!    `(1 − ρ) · mean + ρ · p10` with ρ the request's risk aversion.
//! 5. Sensitivity: regenerate the scenarios with one noise source scaled
//!    by `sensitivity_multiplier` and report the relative change in mean.
//!
//! Scenario draws are sequential from one seeded generator, so results do
//! not depend on the `parallel` flag.

pub mod metrics;
pub mod scenario;

pub use metrics::{
    CONFIDENCE_LEVELS, ConfidenceInterval, OutcomeStatistics, RiskMetrics, percentile,
    weighted_mean_std, weighted_percentile,
};
pub use scenario::{NoiseScale, Scenario, ScenarioNoise, generate_scenarios};

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Duration;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::FieldContext;
use crate::control::Deadline;
use crate::error::{OptimizerError, Result};
use crate::ga::PenaltyWeights;
use crate::models::{
    GrowthStageCalendar, Objective, ObjectiveVector, ObjectiveWeights, OptimizationRequest,
    Schedule, WeatherWindow,
};
use crate::scoring::{ScoringParams, evaluate_schedule, finalize_schedule};
use crate::validation::validate_inputs;

/// Scenarios evaluated between deadline checks.
const SCENARIO_BATCH: usize = 64;

/// Uncertainty analyzer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UncertaintyConfig {
    pub scenario_count: usize,
    pub noise: ScenarioNoise,
    pub weights: ObjectiveWeights,
    pub penalties: PenaltyWeights,
    /// Shift (days) of the robust-schedule timing variants.
    pub shift_days: i64,
    /// Gap (days) between the halves of a split variant.
    pub split_gap_days: i64,
    /// Number of randomly jittered variants.
    pub jitter_variants: usize,
    /// Largest jitter (days) per application.
    pub max_jitter_days: i64,
    /// Noise multiplier of the sensitivity runs.
    pub sensitivity_multiplier: f64,
    pub seed: u64,
    pub parallel: bool,
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self {
            scenario_count: 500,
            noise: ScenarioNoise::default(),
            weights: ObjectiveWeights::default(),
            penalties: PenaltyWeights::default(),
            shift_days: 7,
            split_gap_days: 14,
            jitter_variants: 3,
            max_jitter_days: 3,
            sensitivity_multiplier: 1.5,
            seed: 42,
            parallel: true,
        }
    }
}

impl UncertaintyConfig {
    pub fn with_scenario_count(mut self, count: usize) -> Self {
        self.scenario_count = count;
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
        if !(self.sensitivity_multiplier > 0.0 && self.sensitivity_multiplier.is_finite()) {
            return Err(OptimizerError::InvalidConfig(format!(
                "sensitivity multiplier {} must be positive",
                self.sensitivity_multiplier
            )));
        }
        if self.shift_days < 0 || self.split_gap_days < 0 || self.max_jitter_days < 0 {
            return Err(OptimizerError::InvalidConfig(
                "day offsets must be non-negative".into(),
            ));
        }
        let n = &self.noise;
        let stds = [
            n.temperature_std,
            n.precipitation_std,
            n.wind_std,
            n.moisture_std,
            n.yield_std,
            n.cost_std,
        ];
        if stds.iter().any(|s| !(s.is_finite() && *s >= 0.0)) || n.max_stage_delay_days < 0 {
            return Err(OptimizerError::InvalidConfig(
                "noise magnitudes must be non-negative".into(),
            ));
        }
        if n.yield_bounds.0 > n.yield_bounds.1 || n.cost_bounds.0 > n.cost_bounds.1 {
            return Err(OptimizerError::InvalidConfig("multiplier bounds are inverted".into()));
        }
        Ok(())
    }
}

/// Uncertainty source varied by sensitivity analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintySource {
    Weather,
    Growth,
    YieldResponse,
}

impl UncertaintySource {
    pub const ALL: [UncertaintySource; 3] = [
        UncertaintySource::Weather,
        UncertaintySource::Growth,
        UncertaintySource::YieldResponse,
    ];

    fn scaled(self, factor: f64) -> NoiseScale {
        let mut scale = NoiseScale::default();
        match self {
            UncertaintySource::Weather => scale.weather = factor,
            UncertaintySource::Growth => scale.growth = factor,
            UncertaintySource::YieldResponse => scale.yield_response = factor,
        }
        scale
    }
}

/// Effect of amplifying one uncertainty source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sensitivity {
    pub source: UncertaintySource,
    pub mean_outcome: f64,
    /// `(mean′ − mean) / |mean|` (0 when the base mean is 0).
    pub relative_change: f64,
}

/// Risk-adjusted schedule choice.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustSelection {
    pub schedule: Schedule,
    /// `(1 − ρ) · mean + ρ · p10`.
    pub score: f64,
    pub mean_outcome: f64,
    pub p10_outcome: f64,
    /// Risk aversion ρ used.
    pub risk_aversion: f64,
    pub candidates_evaluated: usize,
    /// Whether the analyzed schedule itself was kept.
    pub is_original: bool,
}

/// Result of an uncertainty analysis.
#[derive(Debug, Clone)]
pub struct UncertaintyResult {
    pub mean_outcome: f64,
    pub outcome: OutcomeStatistics,
    /// Interval summaries per objective.
    pub objectives: BTreeMap<Objective, OutcomeStatistics>,
    pub risk_metrics: RiskMetrics,
    pub scenarios: Vec<Scenario>,
    /// Outcome per scenario, aligned with `scenarios`.
    pub scenario_outcomes: Vec<f64>,
    pub robust_schedule: RobustSelection,
    pub sensitivity: Vec<Sensitivity>,
    pub timed_out: bool,
}

impl UncertaintyResult {
    /// Interval of the outcome at `level`, if reported.
    pub fn confidence_interval(&self, level: f64) -> Option<&ConfidenceInterval> {
        self.outcome.interval(level)
    }
}

/// Outcome of one schedule in one scenario.
#[derive(Debug, Clone, Copy)]
struct Evaluated {
    outcome: f64,
    objectives: ObjectiveVector,
}

/// Monte Carlo analyzer.
#[derive(Debug, Clone, Default)]
pub struct UncertaintyAnalyzer {
    pub config: UncertaintyConfig,
    pub params: ScoringParams,
}

impl UncertaintyAnalyzer {
    pub fn new(config: UncertaintyConfig) -> Self {
        Self {
            config,
            params: ScoringParams::default(),
        }
    }

    pub fn with_scoring(mut self, params: ScoringParams) -> Self {
        self.params = params;
        self
    }

    pub fn analyze(
        &self,
        request: &OptimizationRequest,
        schedule: &Schedule,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
    ) -> Result<UncertaintyResult> {
        self.analyze_until(request, schedule, windows, calendar, &Deadline::none())
    }

    /// Analyzes `schedule`. When `deadline` expires the statistics cover
    /// the scenarios evaluated so far and the robust and sensitivity
    /// stages are skipped.
    pub fn analyze_until(
        &self,
        request: &OptimizationRequest,
        schedule: &Schedule,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        deadline: &Deadline,
    ) -> Result<UncertaintyResult> {
        validate_inputs(request, windows, calendar).map_err(OptimizerError::InvalidRequest)?;
        self.config.validate()?;
        self.params.validate()?;

        let started = Instant::now();
        let cfg = &self.config;
        let mut rng = SmallRng::seed_from_u64(cfg.seed);
        let scenario_seed: u64 = rng.random();
        debug!(
            field = %request.field_id,
            scenarios = cfg.scenario_count,
            applications = schedule.application_count(),
            "starting uncertainty analysis"
        );

        let mut scenarios = self.scenarios(request, windows, calendar, NoiseScale::default(), scenario_seed);

        let mut evaluated = Vec::with_capacity(scenarios.len());
        let mut timed_out = false;
        for batch in scenarios.chunks(SCENARIO_BATCH) {
            if deadline.is_expired() {
                timed_out = true;
                break;
            }
            evaluated.extend(self.evaluate_batch(request, calendar, schedule, batch));
        }
        if timed_out {
            warn!(
                evaluated = evaluated.len(),
                requested = scenarios.len(),
                "uncertainty deadline reached, summarizing partial scenario set"
            );
            scenarios.truncate(evaluated.len());
            let probability = if scenarios.is_empty() { 0.0 } else { 1.0 / scenarios.len() as f64 };
            for s in &mut scenarios {
                s.probability = probability;
            }
        }

        let weights: Vec<f64> = scenarios.iter().map(|s| s.probability).collect();
        let outcomes: Vec<f64> = evaluated.iter().map(|e| e.outcome).collect();
        let outcome = OutcomeStatistics::from_samples(&outcomes, &weights);
        let risk_metrics = RiskMetrics::from_samples(&outcomes, &weights);
        let objectives = Objective::ALL
            .iter()
            .map(|&objective| {
                let values: Vec<f64> = evaluated.iter().map(|e| e.objectives.get(objective)).collect();
                (objective, OutcomeStatistics::from_samples(&values, &weights))
            })
            .collect();

        let ctx = FieldContext::new(request, windows, calendar, &self.params);
        let robust_schedule = if timed_out || scenarios.is_empty() {
            self.keep_original(&ctx, schedule, &outcome)
        } else {
            self.select_robust(&ctx, calendar, schedule, &scenarios, &outcome, &mut rng)
        };

        let sensitivity = if timed_out {
            Vec::new()
        } else {
            UncertaintySource::ALL
                .iter()
                .map(|&source| {
                    let scale = source.scaled(cfg.sensitivity_multiplier);
                    let set = self.scenarios(request, windows, calendar, scale, scenario_seed);
                    let values: Vec<f64> = self
                        .evaluate_batch(request, calendar, schedule, &set)
                        .iter()
                        .map(|e| e.outcome)
                        .collect();
                    let probabilities: Vec<f64> = set.iter().map(|s| s.probability).collect();
                    let (mean, _) = weighted_mean_std(&values, &probabilities);
                    Sensitivity {
                        source,
                        mean_outcome: mean,
                        relative_change: relative_change(outcome.mean, mean),
                    }
                })
                .collect()
        };

        info!(
            field = %request.field_id,
            scenarios = scenarios.len(),
            mean = outcome.mean,
            std_dev = outcome.std_dev,
            var = risk_metrics.value_at_risk,
            robust_is_original = robust_schedule.is_original,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "uncertainty analysis finished"
        );

        Ok(UncertaintyResult {
            mean_outcome: outcome.mean,
            outcome,
            objectives,
            risk_metrics,
            scenarios,
            scenario_outcomes: outcomes,
            robust_schedule,
            sensitivity,
            timed_out,
        })
    }

    fn scenarios(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        scale: NoiseScale,
        seed: u64,
    ) -> Vec<Scenario> {
        let mut rng = SmallRng::seed_from_u64(seed);
        generate_scenarios(
            request,
            windows,
            calendar,
            &self.config.noise,
            scale,
            self.config.scenario_count,
            &mut rng,
        )
    }

    fn evaluate_batch(
        &self,
        request: &OptimizationRequest,
        calendar: &GrowthStageCalendar,
        schedule: &Schedule,
        scenarios: &[Scenario],
    ) -> Vec<Evaluated> {
        let run = |scenario: &Scenario| self.evaluate(request, calendar, schedule, scenario);
        if self.config.parallel {
            scenarios.par_iter().map(run).collect()
        } else {
            scenarios.iter().map(run).collect()
        }
    }

    fn evaluate(
        &self,
        request: &OptimizationRequest,
        calendar: &GrowthStageCalendar,
        schedule: &Schedule,
        scenario: &Scenario,
    ) -> Evaluated {
        let shifted = scenario.calendar(calendar);
        let ctx = FieldContext::new(request, &scenario.weather, &shifted, &self.params)
            .with_multipliers(scenario.yield_multiplier, scenario.cost_multiplier);
        let evaluation = evaluate_schedule(&ctx, schedule);
        let weights = self.config.weights.normalized();
        Evaluated {
            outcome: evaluation.objectives.weighted_sum(&weights)
                - self.config.penalties.penalty(&evaluation),
            objectives: evaluation.objectives,
        }
    }

    fn keep_original(
        &self,
        ctx: &FieldContext<'_>,
        schedule: &Schedule,
        outcome: &OutcomeStatistics,
    ) -> RobustSelection {
        let risk_aversion = ctx.request.risk_aversion();
        let mut kept = schedule.clone();
        finalize_schedule(ctx, &mut kept);
        RobustSelection {
            schedule: kept,
            score: robust_score(outcome.mean, outcome.p10, risk_aversion),
            mean_outcome: outcome.mean,
            p10_outcome: outcome.p10,
            risk_aversion,
            candidates_evaluated: 1,
            is_original: true,
        }
    }

    fn select_robust(
        &self,
        ctx: &FieldContext<'_>,
        calendar: &GrowthStageCalendar,
        schedule: &Schedule,
        scenarios: &[Scenario],
        original: &OutcomeStatistics,
        rng: &mut SmallRng,
    ) -> RobustSelection {
        let risk_aversion = ctx.request.risk_aversion();
        let mut best = self.keep_original(ctx, schedule, original);
        let variants = self.variants(ctx, schedule, rng);
        let weights: Vec<f64> = scenarios.iter().map(|s| s.probability).collect();

        for variant in &variants {
            let values: Vec<f64> = self
                .evaluate_batch(ctx.request, calendar, variant, scenarios)
                .iter()
                .map(|e| e.outcome)
                .collect();
            let (mean, _) = weighted_mean_std(&values, &weights);
            let p10 = weighted_percentile(&values, &weights, 0.10);
            let score = robust_score(mean, p10, risk_aversion);
            if score > best.score {
                let mut chosen = variant.clone();
                finalize_schedule(ctx, &mut chosen);
                best = RobustSelection {
                    schedule: chosen,
                    score,
                    mean_outcome: mean,
                    p10_outcome: p10,
                    risk_aversion,
                    candidates_evaluated: 0,
                    is_original: false,
                };
            }
        }
        best.candidates_evaluated = variants.len() + 1;
        best
    }

    /// Alternative schedules with the same per-nutrient totals.
    fn variants(&self, ctx: &FieldContext<'_>, schedule: &Schedule, rng: &mut SmallRng) -> Vec<Schedule> {
        let cfg = &self.config;
        let mut variants = Vec::new();
        if schedule.application_count() == 0 {
            return variants;
        }

        for shift in [-cfg.shift_days, cfg.shift_days] {
            variants.push(remap_days(ctx, schedule, |_| shift));
        }
        for _ in 0..cfg.jitter_variants {
            let offsets: Vec<i64> = schedule
                .applications()
                .map(|_| rng.random_range(-cfg.max_jitter_days..=cfg.max_jitter_days))
                .collect();
            variants.push(remap_days(ctx, schedule, |i| offsets[i]));
        }
        if ctx.request.allow_split {
            variants.push(split_singles(ctx, schedule, cfg.split_gap_days));
        }
        variants.push(consolidate(ctx, schedule));

        let mut unique: Vec<Schedule> = Vec::with_capacity(variants.len());
        for variant in variants {
            if variant != *schedule && !unique.contains(&variant) {
                unique.push(variant);
            }
        }
        unique
    }
}

fn robust_score(mean: f64, p10: f64, risk_aversion: f64) -> f64 {
    (1.0 - risk_aversion) * mean + risk_aversion * p10
}

fn relative_change(base: f64, changed: f64) -> f64 {
    if base.abs() < 1e-12 {
        0.0
    } else {
        (changed - base) / base.abs()
    }
}

/// Moves the i-th application by `offset(i)` days, clipped to the horizon.
fn remap_days(ctx: &FieldContext<'_>, schedule: &Schedule, offset: impl Fn(usize) -> i64) -> Schedule {
    let last = i64::from(ctx.last_day());
    let mut result = Schedule::new();
    for (i, app) in schedule.applications().enumerate() {
        let day = (i64::from(ctx.day_of(app.date)) + offset(i)).clamp(0, last);
        result.add_application(ctx.date_of(day as u32), app.nutrient, app.amount, app.method);
    }
    result
}

/// Splits every single-application nutrient into two halves `gap` days apart.
fn split_singles(ctx: &FieldContext<'_>, schedule: &Schedule, gap: i64) -> Schedule {
    let counts = schedule
        .applications()
        .fold(BTreeMap::new(), |mut acc, a| {
            *acc.entry(a.nutrient).or_insert(0usize) += 1;
            acc
        });
    let end = ctx.request.end_date();
    let mut result = Schedule::new();
    for app in schedule.applications() {
        if counts.get(&app.nutrient) == Some(&1) {
            let later = (app.date + Duration::days(gap)).min(end);
            result.add_application(app.date, app.nutrient, app.amount / 2.0, app.method);
            result.add_application(later, app.nutrient, app.amount / 2.0, app.method);
        } else {
            result.add_application(app.date, app.nutrient, app.amount, app.method);
        }
    }
    result
}

/// One application per nutrient on its amount-weighted mean day, using
/// the method of its largest application.
fn consolidate(ctx: &FieldContext<'_>, schedule: &Schedule) -> Schedule {
    let mut result = Schedule::new();
    for (nutrient, total) in schedule.applied_totals() {
        let apps = schedule.applications_for(nutrient);
        if total <= 0.0 {
            continue;
        }
        let mean_day = apps
            .iter()
            .map(|a| f64::from(ctx.day_of(a.date)) * a.amount)
            .sum::<f64>()
            / total;
        let method = apps
            .iter()
            .max_by(|a, b| a.amount.total_cmp(&b.amount))
            .map(|a| a.method);
        if let Some(method) = method {
            result.add_application(ctx.date_of(mean_day.round() as u32), nutrient, total, method);
        }
    }
    result
}
