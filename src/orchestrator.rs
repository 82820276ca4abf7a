//! Algorithm selection and result normalization.
//!
//! # Selection
//!
//! | Condition (first match wins) | Algorithm |
//! |------------------------------|-----------|
//! | explicit override in [`OptimizationOptions`] | the override |
//! | usable history ≥ `min_history_records` | Learned predictor |
//! | caller asks for a yield/cost trade-off | NSGA-II |
//! | nutrients ≤ `dp_max_nutrients` and horizon ≤ `dp_max_horizon_days` | Dynamic programming |
//! | otherwise | Genetic algorithm |
//!
//! Every optimizer's native result is re-evaluated under one
//! [`FieldContext`] so schedules, objective vectors and KPIs are
//! comparable across algorithms. Uncertainty analysis can be layered on
//! top of the chosen schedule.

use std::fmt;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::FieldContext;
use crate::control::Deadline;
use crate::dp::{DpConfig, DpOptimizer};
use crate::error::{OptimizerError, Result};
use crate::ga::{GeneticConfig, GeneticOptimizer};
use crate::learned::features::is_usable;
use crate::learned::{LearnedConfig, LearnedOptimizer};
use crate::models::{
    GrowthStageCalendar, HistoricalRecord, ObjectiveVector, ObjectiveWeights,
    OptimizationRequest, Schedule, WeatherWindow,
};
use crate::pareto::{ParetoConfig, ParetoOptimizer};
use crate::scoring::{ScheduleKpi, ScoringParams, finalize_schedule};
use crate::uncertainty::{UncertaintyAnalyzer, UncertaintyConfig, UncertaintyResult};
use crate::validation::validate_inputs;

/// Optimization algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    DynamicProgramming,
    Genetic,
    MultiObjective,
    Learned,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 4] = [
        AlgorithmKind::DynamicProgramming,
        AlgorithmKind::Genetic,
        AlgorithmKind::MultiObjective,
        AlgorithmKind::Learned,
    ];
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgorithmKind::DynamicProgramming => "dynamic_programming",
            AlgorithmKind::Genetic => "genetic",
            AlgorithmKind::MultiObjective => "multi_objective",
            AlgorithmKind::Learned => "learned",
        };
        f.write_str(name)
    }
}

/// Problem-shape thresholds driving algorithm selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionThresholds {
    pub min_history_records: usize,
    pub dp_max_nutrients: usize,
    pub dp_max_horizon_days: u32,
}

impl Default for SelectionThresholds {
    fn default() -> Self {
        Self {
            min_history_records: 10,
            dp_max_nutrients: 2,
            dp_max_horizon_days: 150,
        }
    }
}

/// Full configuration tree.
///
/// Sub-configuration seeds and weights are overridden from `seed` and
/// `weights` at run time, so one seed reproduces a whole run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub seed: u64,
    pub weights: ObjectiveWeights,
    pub scoring: ScoringParams,
    pub thresholds: SelectionThresholds,
    pub dp: DpConfig,
    pub genetic: GeneticConfig,
    pub pareto: ParetoConfig,
    pub learned: LearnedConfig,
    pub uncertainty: UncertaintyConfig,
    /// Wall-clock limit per call (milliseconds).
    pub time_limit_ms: Option<u64>,
}

impl OrchestratorConfig {
    /// Parses a JSON configuration; missing fields take their defaults.
    ///
    /// ```
    /// use u_fertilize::orchestrator::OrchestratorConfig;
    ///
    /// let config = OrchestratorConfig::from_json_str(r#"{"seed": 7, "genetic": {"max_splits": 2}}"#).unwrap();
    /// assert_eq!(config.seed, 7);
    /// assert_eq!(config.genetic.max_splits, 2);
    /// assert_eq!(config.thresholds.dp_max_nutrients, 2);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_ms = Some(limit.as_millis() as u64);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.weights.is_normalized() {
            return Err(OptimizerError::InvalidConfig(
                "objective weights must be non-negative and sum to 1".into(),
            ));
        }
        self.scoring.validate()?;
        self.dp.validate()?;
        self.genetic.validate()?;
        self.pareto.validate()?;
        self.learned.validate()?;
        self.uncertainty.validate()
    }

    /// Copy with every sub-seed drawn from `seed` and shared weights applied.
    fn resolved(&self) -> Self {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut config = self.clone();
        config.genetic.ga.seed = rng.random();
        config.pareto.seed = rng.random();
        config.learned.seed = rng.random();
        config.uncertainty.seed = rng.random();
        config.dp.weights = self.weights;
        config.genetic.weights = self.weights;
        config.pareto.weights = self.weights;
        config.uncertainty.weights = self.weights;
        config
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationOptions {
    /// Forces an algorithm regardless of problem shape.
    pub algorithm: Option<AlgorithmKind>,
    /// Caller wants to see the yield/cost trade-off.
    pub prefer_trade_off: bool,
    /// Preference for the NSGA-II recommended solution.
    pub preference: Option<ObjectiveWeights>,
    /// Run Monte Carlo analysis on the chosen schedule.
    pub analyze_uncertainty: bool,
}

impl OptimizationOptions {
    pub fn with_algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_trade_off(mut self, preference: Option<ObjectiveWeights>) -> Self {
        self.prefer_trade_off = true;
        self.preference = preference;
        self
    }

    pub fn with_uncertainty(mut self) -> Self {
        self.analyze_uncertainty = true;
        self
    }
}

/// Normalized result of one optimization.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub algorithm: AlgorithmKind,
    pub schedule: Schedule,
    pub objectives: ObjectiveVector,
    /// Weighted objective sum under the configured weights.
    pub score: f64,
    pub kpi: ScheduleKpi,
    /// Algorithm confidence in [0, 1].
    pub confidence: f64,
    pub uncertainty: Option<UncertaintyResult>,
    /// Advice derived from the uncertainty analysis.
    pub recommendations: Vec<String>,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

impl OptimizationOutcome {
    /// Whether every requirement is met.
    pub fn is_complete(&self) -> bool {
        self.schedule.is_complete()
    }
}

/// Native output of one optimizer run.
struct RawOutcome {
    schedule: Schedule,
    confidence: f64,
    timed_out: bool,
}

/// Entry point for the service layer.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    pub config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Algorithm chosen for a problem shape.
    pub fn select_algorithm(
        &self,
        request: &OptimizationRequest,
        history: &[HistoricalRecord],
        options: &OptimizationOptions,
    ) -> AlgorithmKind {
        if let Some(algorithm) = options.algorithm {
            return algorithm;
        }
        let t = &self.config.thresholds;
        let usable = history.iter().filter(|r| is_usable(r)).count();
        if usable >= t.min_history_records {
            AlgorithmKind::Learned
        } else if options.prefer_trade_off {
            AlgorithmKind::MultiObjective
        } else if request.active_nutrients().len() <= t.dp_max_nutrients
            && request.horizon_days <= t.dp_max_horizon_days
        {
            AlgorithmKind::DynamicProgramming
        } else {
            AlgorithmKind::Genetic
        }
    }

    /// Selects an algorithm, runs it, normalizes the result and
    /// optionally analyzes its uncertainty.
    pub fn optimize(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        history: &[HistoricalRecord],
        options: &OptimizationOptions,
    ) -> Result<OptimizationOutcome> {
        validate_inputs(request, windows, calendar).map_err(OptimizerError::InvalidRequest)?;
        self.config.validate()?;

        let algorithm = self.select_algorithm(request, history, options);
        let deadline = Deadline::from_limit(self.config.time_limit_ms.map(Duration::from_millis));
        debug!(field = %request.field_id, %algorithm, "algorithm selected");
        self.run(algorithm, request, windows, calendar, history, options, &deadline)
    }

    /// Runs several algorithms on the same problem, best first.
    ///
    /// Complete schedules rank ahead of partial ones; ties break on score.
    pub fn compare(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        history: &[HistoricalRecord],
        algorithms: &[AlgorithmKind],
    ) -> Result<Vec<OptimizationOutcome>> {
        validate_inputs(request, windows, calendar).map_err(OptimizerError::InvalidRequest)?;
        self.config.validate()?;

        let deadline = Deadline::from_limit(self.config.time_limit_ms.map(Duration::from_millis));
        let options = OptimizationOptions::default();
        let mut outcomes = algorithms
            .iter()
            .map(|&algorithm| {
                self.run(algorithm, request, windows, calendar, history, &options, &deadline)
            })
            .collect::<Result<Vec<_>>>()?;
        outcomes.sort_by(|a, b| {
            b.is_complete()
                .cmp(&a.is_complete())
                .then(b.score.total_cmp(&a.score))
        });
        info!(
            field = %request.field_id,
            compared = outcomes.len(),
            best = outcomes.first().map(|o| o.algorithm.to_string()),
            "algorithm comparison finished"
        );
        Ok(outcomes)
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        algorithm: AlgorithmKind,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        history: &[HistoricalRecord],
        options: &OptimizationOptions,
        deadline: &Deadline,
    ) -> Result<OptimizationOutcome> {
        let started = Instant::now();
        let config = self.config.resolved();
        let scoring = config.scoring.clone();

        let raw = match algorithm {
            AlgorithmKind::DynamicProgramming => {
                let r = DpOptimizer::new(config.dp.clone())
                    .with_scoring(scoring.clone())
                    .optimize_until(request, windows, calendar, deadline)?;
                RawOutcome {
                    schedule: r.schedule,
                    confidence: r.confidence,
                    timed_out: r.truncated,
                }
            }
            AlgorithmKind::Genetic => {
                let r = GeneticOptimizer::new(config.genetic.clone())
                    .with_scoring(scoring.clone())
                    .optimize_until(request, windows, calendar, deadline)?;
                RawOutcome {
                    schedule: r.best_schedule,
                    confidence: r.confidence,
                    timed_out: r.timed_out,
                }
            }
            AlgorithmKind::MultiObjective => {
                let r = ParetoOptimizer::new(config.pareto.clone())
                    .with_scoring(scoring.clone())
                    .optimize_until(request, windows, calendar, options.preference, deadline)?;
                RawOutcome {
                    schedule: r.recommended_solution.schedule,
                    confidence: r.confidence,
                    timed_out: r.timed_out,
                }
            }
            AlgorithmKind::Learned => {
                let r = LearnedOptimizer::new(config.learned.clone())
                    .with_scoring(scoring.clone())
                    .optimize_until(request, windows, calendar, history, deadline)?;
                RawOutcome {
                    schedule: r.recommended_schedule,
                    confidence: r.model_confidence,
                    timed_out: r.timed_out,
                }
            }
        };

        let ctx = FieldContext::new(request, windows, calendar, &scoring);
        let mut schedule = raw.schedule;
        let evaluation = finalize_schedule(&ctx, &mut schedule);
        let kpi = ScheduleKpi::calculate(&ctx, &schedule);
        let score = evaluation.objectives.weighted_sum(&config.weights);

        let uncertainty = if options.analyze_uncertainty {
            Some(
                UncertaintyAnalyzer::new(config.uncertainty.clone())
                    .with_scoring(scoring.clone())
                    .analyze_until(request, &schedule, windows, calendar, deadline)?,
            )
        } else {
            None
        };
        let recommendations = uncertainty
            .as_ref()
            .map(|u| recommendations(&schedule, u))
            .unwrap_or_default();

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            field = %request.field_id,
            %algorithm,
            score,
            complete = schedule.is_complete(),
            applications = schedule.application_count(),
            confidence = raw.confidence,
            elapsed_ms,
            "optimization finished"
        );

        Ok(OptimizationOutcome {
            algorithm,
            schedule,
            objectives: evaluation.objectives,
            score,
            kpi,
            confidence: raw.confidence.clamp(0.0, 1.0),
            timed_out: raw.timed_out || uncertainty.as_ref().is_some_and(|u| u.timed_out),
            uncertainty,
            recommendations,
            elapsed_ms,
        })
    }
}

/// Sensitivity above which a source is called out.
const SENSITIVITY_NOTICE: f64 = 0.05;

fn recommendations(schedule: &Schedule, analysis: &UncertaintyResult) -> Vec<String> {
    let mut advice = Vec::new();
    let robust = &analysis.robust_schedule;
    if !robust.is_original && robust.schedule != *schedule {
        advice.push(format!(
            "consider the robust alternative: risk-adjusted score {:.1} (mean {:.1}, p10 {:.1})",
            robust.score, robust.mean_outcome, robust.p10_outcome
        ));
    }
    let risk = &analysis.risk_metrics;
    if analysis.mean_outcome > 0.0 && risk.conditional_value_at_risk < 0.8 * analysis.mean_outcome {
        advice.push(format!(
            "worst 5% of scenarios average {:.1} against a mean of {:.1}; consider splitting applications",
            risk.conditional_value_at_risk, analysis.mean_outcome
        ));
    }
    for s in &analysis.sensitivity {
        if s.relative_change.abs() >= SENSITIVITY_NOTICE {
            advice.push(format!(
                "outcome moves {:+.1}% when {:?} uncertainty grows; monitor it closely",
                s.relative_change * 100.0,
                s.source
            ));
        }
    }
    advice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dp::DpConfig;
    use crate::ga::GaConfig;
    use crate::models::{
        ApplicationMethod, GrowthStage, Nutrient, REQUIREMENT_TOLERANCE, WeatherCondition,
    };
    use crate::scoring::test_support::*;
    use chrono::Duration as Days;

    fn fast_config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.genetic = GeneticConfig::default().with_ga(
            GaConfig::default()
                .with_population_size(20)
                .with_max_generations(15)
                .with_parallel(false),
        );
        config.pareto = ParetoConfig::default()
            .with_population_size(16)
            .with_max_generations(8)
            .with_parallel(false);
        config.uncertainty = UncertaintyConfig::default()
            .with_scenario_count(60)
            .with_parallel(false);
        config
    }

    fn history(n: usize) -> Vec<HistoricalRecord> {
        (0..n)
            .map(|i| {
                HistoricalRecord::new(
                    "hist",
                    planting() - Days::days(365) + Days::days(i as i64 * 5),
                    Nutrient::Nitrogen,
                    50.0,
                    ApplicationMethod::Broadcast,
                )
                .with_conditions(WeatherCondition::Good, GrowthStage::EarlyVegetative, 0.6)
                .with_outcome(70.0, 30.0)
            })
            .collect()
    }

    #[test]
    fn test_selection_rules() {
        let o = Orchestrator::default();
        let none = OptimizationOptions::default();
        let small = corn_request(120);
        assert_eq!(o.select_algorithm(&small, &[], &none), AlgorithmKind::DynamicProgramming);
        assert_eq!(o.select_algorithm(&small, &history(12), &none), AlgorithmKind::Learned);
        assert_eq!(o.select_algorithm(&small, &history(5), &none), AlgorithmKind::DynamicProgramming);

        let trade = OptimizationOptions::default().with_trade_off(None);
        assert_eq!(o.select_algorithm(&small, &[], &trade), AlgorithmKind::MultiObjective);

        let big = corn_request(120)
            .with_requirement(Nutrient::Phosphorus, 40.0)
            .with_requirement(Nutrient::Potassium, 60.0);
        assert_eq!(o.select_algorithm(&big, &[], &none), AlgorithmKind::Genetic);
        let long = corn_request(200);
        assert_eq!(o.select_algorithm(&long, &[], &none), AlgorithmKind::Genetic);

        let forced = OptimizationOptions::default().with_algorithm(AlgorithmKind::Genetic);
        assert_eq!(o.select_algorithm(&small, &history(50), &forced), AlgorithmKind::Genetic);
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_corn_nitrogen_end_to_end() {
        init_tracing();
        let request = corn_request(120);
        let outcome = Orchestrator::new(fast_config())
            .optimize(
                &request,
                &season_weather(120),
                &corn_calendar(),
                &[],
                &OptimizationOptions::default(),
            )
            .unwrap();

        assert_eq!(outcome.algorithm, AlgorithmKind::DynamicProgramming);
        assert!(outcome.is_complete());
        let applied = outcome.schedule.total_applied(Nutrient::Nitrogen);
        assert!((applied - 150.0).abs() <= 1.5);
        assert!(outcome.schedule.within_horizon(&request));
        let calendar = corn_calendar();
        assert!(outcome.schedule.applications().any(|a| {
            (-7..=7).any(|shift| calendar.stage_on(a.date + Days::days(shift)).is_vegetative())
        }));
        assert!((0.0..=1.0).contains(&outcome.confidence));
        assert!(outcome.uncertainty.is_none());
    }

    #[test]
    fn test_learned_without_history_end_to_end() {
        let request = corn_request(120);
        let options = OptimizationOptions::default().with_algorithm(AlgorithmKind::Learned);
        let outcome = Orchestrator::new(fast_config())
            .optimize(&request, &season_weather(120), &corn_calendar(), &[], &options)
            .unwrap();

        assert_eq!(outcome.algorithm, AlgorithmKind::Learned);
        assert!(outcome.schedule.application_count() > 0);
        assert!(outcome.confidence <= 0.5);
    }

    #[test]
    fn test_uncertainty_layer() {
        init_tracing();
        let request = corn_request(90);
        let options = OptimizationOptions::default().with_uncertainty();
        let outcome = Orchestrator::new(fast_config())
            .optimize(&request, &season_weather(90), &corn_calendar(), &[], &options)
            .unwrap();
        let analysis = outcome.uncertainty.as_ref().unwrap();
        assert_eq!(analysis.scenarios.len(), 60);
        assert!(analysis.confidence_interval(0.95).is_some());
        assert!(!outcome.timed_out);
    }

    #[test]
    fn test_compare_ranks_complete_first() {
        let request = corn_request(60);
        let outcomes = Orchestrator::new(fast_config())
            .compare(
                &request,
                &season_weather(60),
                &corn_calendar(),
                &[],
                &[AlgorithmKind::Genetic, AlgorithmKind::DynamicProgramming, AlgorithmKind::MultiObjective],
            )
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        for pair in outcomes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.is_complete() >= b.is_complete());
            if a.is_complete() == b.is_complete() {
                assert!(a.score >= b.score);
            }
        }
    }

    #[test]
    fn test_same_seed_reproducible() {
        let request = corn_request(90).with_requirement(Nutrient::Phosphorus, 40.0);
        let options = OptimizationOptions::default().with_algorithm(AlgorithmKind::Genetic);
        let run = || {
            Orchestrator::new(fast_config().with_seed(9))
                .optimize(&request, &season_weather(90), &corn_calendar(), &[], &options)
                .unwrap()
        };
        assert_eq!(run().schedule, run().schedule);
    }

    #[test]
    fn test_invalid_request_rejected_before_running() {
        let request = OptimizationRequest::new("f", "corn", planting(), 90);
        let err = Orchestrator::default()
            .optimize(&request, &[], &corn_calendar(), &[], &OptimizationOptions::default())
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidRequest(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_requirement_satisfaction_across_algorithms() {
        let request = corn_request(90).with_requirement(Nutrient::Sulfur, 20.0);
        let outcomes = Orchestrator::new(fast_config())
            .compare(&request, &season_weather(90), &corn_calendar(), &[], &AlgorithmKind::ALL)
            .unwrap();
        for o in outcomes.iter().filter(|o| o.is_complete()) {
            for (&n, &required) in &request.requirements {
                let applied = o.schedule.total_applied(n);
                assert!((applied - required).abs() <= required * REQUIREMENT_TOLERANCE);
            }
            assert!(o.schedule.within_horizon(&request));
        }
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = fast_config().with_seed(11).with_time_limit(std::time::Duration::from_secs(2));
        let json = config.to_json_string().unwrap();
        let parsed = OrchestratorConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.time_limit_ms, Some(2000));

        let err = OrchestratorConfig::from_json_str("{\"seed\": \"x\"}").unwrap_err();
        assert!(matches!(err, OptimizerError::ConfigParse(_)));
        let dp_unused: DpConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(dp_unused, DpConfig::default());
    }
}
