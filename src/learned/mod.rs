//! Learned outcome predictor.
//!
//! A small regression network maps a candidate application's features to
//! a predicted outcome. With enough historical records the network is
//! trained first; otherwise it keeps its random initial weights and the
//! reported confidence stays low.
//!
//! # Schedule construction
//!
//! 1. Candidates: every feasible day × unmet nutrient × amount fraction
//!    of the requirement × allowed method.
//! 2. Each round, every candidate is scored by the network (plus a
//!    probability-gated exploration bonus) under the current cumulative
//!    amounts, and the best one is taken, capped at the nutrient's
//!    remaining requirement.
//! 3. A nutrient stops once 95% is applied; the shortfall is then folded
//!    into its largest application so totals match the request.
//!
//! # Submodules
//!
//! - [`features`]: feature scaling for candidates and history
//! - [`network`]: one-hidden-layer ReLU network with mini-batch SGD

pub mod features;
pub mod network;

pub use features::{
    FEATURE_COUNT, FEATURE_NAMES, FeatureInputs, FeatureVector, TrainingSample,
    candidate_features, training_samples,
};
pub use network::{Network, TrainingSettings};

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::FieldContext;
use crate::control::Deadline;
use crate::error::{OptimizerError, Result};
use crate::models::{
    ApplicationMethod, GrowthStageCalendar, HistoricalRecord, Nutrient, ObjectiveVector,
    OptimizationRequest, Schedule, WeatherWindow,
};
use crate::scoring::{ScoringParams, finalize_schedule};
use crate::uncertainty::metrics::{ConfidenceInterval, intervals};
use crate::validation::validate_inputs;

/// A nutrient counts as satisfied once this share is applied.
pub const SATISFIED_SHARE: f64 = 0.95;

/// Residual spread assumed for an untrained network (outcome scale 0..=1).
const UNTRAINED_RESIDUAL_STD: f64 = 0.25;

/// Learned predictor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedConfig {
    pub hidden_units: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fewest usable records needed to train.
    pub min_records: usize,
    /// Share of records held out to estimate residuals.
    pub validation_fraction: f64,
    /// Validation performance assumed when scaling confidence.
    pub assumed_validation_score: f64,
    /// Fractions of a nutrient's requirement offered per candidate.
    pub amount_fractions: Vec<f64>,
    /// Most applications per nutrient when splitting is allowed.
    pub max_applications: usize,
    /// Probability that a candidate receives an exploration bonus.
    pub exploration_rate: f64,
    /// Largest exploration bonus (outcome scale 0..=1).
    pub exploration_bonus: f64,
    pub seed: u64,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            hidden_units: 16,
            epochs: 100,
            batch_size: 16,
            learning_rate: 0.01,
            min_records: 10,
            validation_fraction: 0.2,
            assumed_validation_score: 0.85,
            amount_fractions: vec![0.25, 0.33, 0.5, 1.0],
            max_applications: 4,
            exploration_rate: 0.1,
            exploration_bonus: 0.05,
            seed: 42,
        }
    }
}

impl LearnedConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn with_min_records(mut self, min_records: usize) -> Self {
        self.min_records = min_records;
        self
    }

    pub fn with_exploration(mut self, rate: f64, bonus: f64) -> Self {
        self.exploration_rate = rate;
        self.exploration_bonus = bonus;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.hidden_units == 0 || self.batch_size == 0 {
            return Err(OptimizerError::InvalidConfig(
                "hidden units and batch size must be positive".into(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(OptimizerError::InvalidConfig(format!(
                "learning rate {} must be positive",
                self.learning_rate
            )));
        }
        for (name, value) in [
            ("validation fraction", self.validation_fraction),
            ("assumed validation score", self.assumed_validation_score),
            ("exploration rate", self.exploration_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(OptimizerError::InvalidConfig(format!(
                    "{name} {value} outside [0, 1]"
                )));
            }
        }
        if self.amount_fractions.is_empty()
            || self.amount_fractions.iter().any(|&f| !(f > 0.0 && f <= 1.0))
        {
            return Err(OptimizerError::InvalidConfig(
                "amount fractions must be non-empty and in (0, 1]".into(),
            ));
        }
        if !(self.exploration_bonus >= 0.0 && self.exploration_bonus.is_finite()) {
            return Err(OptimizerError::InvalidConfig(format!(
                "exploration bonus {} must be non-negative",
                self.exploration_bonus
            )));
        }
        if self.max_applications == 0 {
            return Err(OptimizerError::InvalidConfig(
                "max applications must be positive".into(),
            ));
        }
        Ok(())
    }

    fn training_settings(&self) -> TrainingSettings {
        TrainingSettings {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
        }
    }
}

/// Importance of one input feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: &'static str,
    /// Share of total input-weight magnitude (sums to 1 across features).
    pub importance: f64,
}

/// Result of a learned-predictor optimization.
#[derive(Debug, Clone)]
pub struct LearnedResult {
    pub recommended_schedule: Schedule,
    /// Amount-weighted mean predicted outcome of the chosen applications (0..=100).
    pub predicted_outcome: f64,
    /// Prediction intervals around `predicted_outcome`.
    pub confidence_intervals: Vec<ConfidenceInterval>,
    /// Features by descending importance.
    pub feature_importance: Vec<FeatureImportance>,
    /// Confidence in [0, 1].
    pub model_confidence: f64,
    /// Training MSE per epoch (empty when untrained).
    pub loss_history: Vec<f64>,
    /// Usable records seen.
    pub training_records: usize,
    pub trained: bool,
    pub objectives: ObjectiveVector,
    /// Training or construction was cut short by the deadline.
    pub timed_out: bool,
}

/// One scored option for the next application.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    day: u32,
    nutrient: Nutrient,
    amount: f64,
    method: ApplicationMethod,
    /// Raw network output for this application.
    prediction: f64,
    /// Ranking score: prediction plus exploration, scaled by method efficiency.
    score: f64,
}

/// Output of greedy construction.
struct Construction {
    schedule: Schedule,
    /// Amount-weighted mean network prediction (0..=1).
    predicted: f64,
    interrupted: bool,
}

/// Learned predictor optimizer.
#[derive(Debug, Clone, Default)]
pub struct LearnedOptimizer {
    pub config: LearnedConfig,
    pub params: ScoringParams,
}

impl LearnedOptimizer {
    pub fn new(config: LearnedConfig) -> Self {
        Self {
            config,
            params: ScoringParams::default(),
        }
    }

    pub fn with_scoring(mut self, params: ScoringParams) -> Self {
        self.params = params;
        self
    }

    pub fn optimize(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        history: &[HistoricalRecord],
    ) -> Result<LearnedResult> {
        self.optimize_until(request, windows, calendar, history, &Deadline::none())
    }

    /// Trains (when history allows) and builds a schedule. On deadline
    /// expiry training stops early and construction keeps what it has.
    pub fn optimize_until(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        history: &[HistoricalRecord],
        deadline: &Deadline,
    ) -> Result<LearnedResult> {
        validate_inputs(request, windows, calendar).map_err(OptimizerError::InvalidRequest)?;
        self.config.validate()?;
        self.params.validate()?;

        let started = Instant::now();
        let cfg = &self.config;
        let mut rng = SmallRng::seed_from_u64(cfg.seed);
        let mut network = Network::new(cfg.hidden_units, &mut rng);

        let mut samples = training_samples(history, request);
        let skipped = history.len() - samples.len();
        if skipped > 0 {
            warn!(skipped, "ignoring unusable historical records");
        }
        let training_records = samples.len();
        let trained = !samples.is_empty() && training_records >= cfg.min_records;
        let mut training_interrupted = false;

        let (loss_history, residual_std) = if trained {
            samples.shuffle(&mut rng);
            let holdout = ((samples.len() as f64 * cfg.validation_fraction) as usize)
                .min(samples.len() - 1);
            let (validation, train) = samples.split_at(holdout);
            debug!(
                train = train.len(),
                validation = validation.len(),
                epochs = cfg.epochs,
                "training outcome network"
            );
            let losses =
                network.train(train, cfg.training_settings(), &mut rng, || deadline.is_expired());
            if losses.len() < cfg.epochs {
                warn!(epochs = losses.len(), "deadline reached during training");
                training_interrupted = true;
            }
            let residual_set = if validation.is_empty() { train } else { validation };
            (losses, network.mse(residual_set).sqrt())
        } else {
            debug!(
                records = training_records,
                required = cfg.min_records,
                "too little history, using untrained network"
            );
            (Vec::new(), UNTRAINED_RESIDUAL_STD)
        };

        let ctx = FieldContext::new(request, windows, calendar, &self.params);
        let Construction {
            mut schedule,
            predicted,
            interrupted,
        } = self.build_schedule(&ctx, &network, &mut rng, deadline);
        let timed_out = training_interrupted || interrupted;
        let evaluation = finalize_schedule(&ctx, &mut schedule);

        let model_confidence = if trained {
            let data_factor = 1.0 - (-(training_records as f64) / 100.0).exp();
            (0.2 + cfg.assumed_validation_score * data_factor).min(0.95)
        } else {
            0.2
        };

        let predicted_outcome = (predicted * 100.0).clamp(0.0, 100.0);
        let importance = network.feature_importance();
        let mut feature_importance: Vec<FeatureImportance> = FEATURE_NAMES
            .iter()
            .zip(importance)
            .map(|(&feature, importance)| FeatureImportance {
                feature,
                importance,
            })
            .collect();
        feature_importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        info!(
            field = %request.field_id,
            trained,
            records = training_records,
            applications = schedule.application_count(),
            predicted = predicted_outcome,
            timed_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "learned optimization finished"
        );

        Ok(LearnedResult {
            recommended_schedule: schedule,
            predicted_outcome,
            confidence_intervals: intervals(predicted_outcome, residual_std * 100.0),
            feature_importance,
            model_confidence,
            loss_history,
            training_records,
            trained,
            objectives: evaluation.objectives,
            timed_out,
        })
    }

    /// Greedy construction. Candidates are ranked by exploration-perturbed,
    /// efficiency-scaled scores; the reported prediction uses raw network
    /// outputs only.
    fn build_schedule(
        &self,
        ctx: &FieldContext<'_>,
        network: &Network,
        rng: &mut SmallRng,
        deadline: &Deadline,
    ) -> Construction {
        let cfg = &self.config;
        let request = ctx.request;
        let days = ctx.feasible_days();
        let methods = request.method_list();
        let fractions: Vec<f64> = if request.allow_split {
            cfg.amount_fractions.clone()
        } else {
            vec![1.0]
        };
        let max_apps = if request.allow_split { cfg.max_applications } else { 1 };

        let mut cumulative = [0.0; 4];
        let mut used_days: BTreeMap<Nutrient, BTreeSet<u32>> = BTreeMap::new();
        let mut chosen: Vec<Candidate> = Vec::new();
        let mut interrupted = false;

        loop {
            if deadline.is_expired() {
                warn!(applications = chosen.len(), "deadline reached during schedule construction");
                interrupted = true;
                break;
            }
            let mut best: Option<Candidate> = None;
            for nutrient in request.active_nutrients() {
                let required = request.requirement(nutrient);
                let applied = cumulative[nutrient.index()];
                let count = used_days.get(&nutrient).map_or(0, BTreeSet::len);
                if applied >= SATISFIED_SHARE * required || count >= max_apps {
                    continue;
                }
                let remaining = required - applied;
                let last_slot = count + 1 == max_apps;
                for &day in &days {
                    if used_days.get(&nutrient).is_some_and(|d| d.contains(&day)) {
                        continue;
                    }
                    for &fraction in &fractions {
                        let amount = if last_slot {
                            remaining
                        } else {
                            (fraction * required).min(remaining)
                        };
                        let x = candidate_features(ctx, day, amount, &cumulative);
                        let prediction = network.predict(&x);
                        let mut score = prediction;
                        if rng.random_bool(cfg.exploration_rate) {
                            score += rng.random_range(0.0..=cfg.exploration_bonus);
                        }
                        for &method in &methods {
                            let candidate = Candidate {
                                day,
                                nutrient,
                                amount,
                                method,
                                prediction,
                                score: score * ctx.params.method_efficiency.get(method),
                            };
                            if best.is_none_or(|b| candidate.score > b.score) {
                                best = Some(candidate);
                            }
                        }
                    }
                }
            }
            let Some(pick) = best else { break };
            cumulative[pick.nutrient.index()] += pick.amount;
            used_days.entry(pick.nutrient).or_default().insert(pick.day);
            chosen.push(pick);
        }

        top_up(&mut chosen, request);

        let total: f64 = chosen.iter().map(|c| c.amount).sum();
        let predicted = if total > 0.0 {
            chosen.iter().map(|c| c.prediction * c.amount).sum::<f64>() / total
        } else {
            0.0
        };

        let mut schedule = Schedule::new();
        for c in &chosen {
            schedule.add_application(ctx.date_of(c.day), c.nutrient, c.amount, c.method);
        }
        Construction {
            schedule,
            predicted,
            interrupted,
        }
    }
}

/// Folds each nutrient's remaining shortfall into its largest application.
fn top_up(chosen: &mut [Candidate], request: &OptimizationRequest) {
    for nutrient in request.active_nutrients() {
        let applied: f64 = chosen
            .iter()
            .filter(|c| c.nutrient == nutrient)
            .map(|c| c.amount)
            .sum();
        let shortfall = request.requirement(nutrient) - applied;
        if shortfall <= 0.0 {
            continue;
        }
        let largest = chosen
            .iter_mut()
            .filter(|c| c.nutrient == nutrient)
            .max_by(|a, b| a.amount.total_cmp(&b.amount));
        if let Some(c) = largest {
            c.amount += shortfall;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GrowthStage, REQUIREMENT_TOLERANCE, WeatherCondition};
    use crate::scoring::test_support::*;
    use chrono::Duration;

    fn synthetic_history(n: usize) -> Vec<HistoricalRecord> {
        (0..n)
            .map(|i| {
                let date = planting() - Duration::days(365) + Duration::days((i * 3) as i64);
                let stage = GrowthStage::ALL[(i / 8) % 6];
                let outcome = if stage.is_vegetative() { 85.0 } else { 45.0 };
                HistoricalRecord::new("hist", date, Nutrient::Nitrogen, 50.0, ApplicationMethod::Broadcast)
                    .with_conditions(WeatherCondition::Good, stage, 0.55)
                    .with_outcome(outcome, 30.0)
            })
            .collect()
    }

    #[test]
    fn test_no_history_still_schedules() {
        let request = corn_request(120);
        let result = LearnedOptimizer::default()
            .optimize(&request, &season_weather(120), &corn_calendar(), &[])
            .unwrap();

        assert!(!result.trained);
        assert!(result.loss_history.is_empty());
        assert!(result.model_confidence <= 0.5);
        assert!(result.recommended_schedule.application_count() > 0);
        assert!(result.recommended_schedule.is_complete());
        assert!(result.recommended_schedule.within_horizon(&request));
        let applied = result.recommended_schedule.total_applied(Nutrient::Nitrogen);
        assert!((applied - 150.0).abs() <= 150.0 * REQUIREMENT_TOLERANCE);
    }

    #[test]
    fn test_training_with_history() {
        let request = corn_request(120).with_requirement(Nutrient::Phosphorus, 40.0);
        let result = LearnedOptimizer::default()
            .optimize(&request, &season_weather(120), &corn_calendar(), &synthetic_history(120))
            .unwrap();

        assert!(result.trained);
        assert_eq!(result.training_records, 120);
        assert_eq!(result.loss_history.len(), 100);
        assert!(result.loss_history[99] < result.loss_history[0]);
        assert!(result.model_confidence > 0.2 && result.model_confidence <= 0.95);
        assert!(result.recommended_schedule.is_complete());
        assert_eq!(result.confidence_intervals.len(), 3);
        let sum: f64 = result.feature_importance.iter().map(|f| f.importance).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        for pair in result.feature_importance.windows(2) {
            assert!(pair[0].importance >= pair[1].importance);
        }
    }

    #[test]
    fn test_confidence_grows_with_data() {
        let request = corn_request(60);
        let run = |n| {
            LearnedOptimizer::new(LearnedConfig::default().with_epochs(5))
                .optimize(&request, &season_weather(60), &corn_calendar(), &synthetic_history(n))
                .unwrap()
                .model_confidence
        };
        assert!(run(200) > run(20));
    }

    #[test]
    fn test_no_split_single_application() {
        let request = corn_request(90).with_split(false);
        let result = LearnedOptimizer::default()
            .optimize(&request, &season_weather(90), &corn_calendar(), &[])
            .unwrap();
        assert_eq!(result.recommended_schedule.application_count(), 1);
        assert!((result.recommended_schedule.total_applied(Nutrient::Nitrogen) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let request = corn_request(90);
        let weather = season_weather(90);
        let calendar = corn_calendar();
        let history = synthetic_history(30);
        let optimizer = LearnedOptimizer::default();
        let a = optimizer.optimize(&request, &weather, &calendar, &history).unwrap();
        let b = optimizer.optimize(&request, &weather, &calendar, &history).unwrap();
        assert_eq!(a.recommended_schedule, b.recommended_schedule);
        assert_eq!(a.loss_history, b.loss_history);
    }

    #[test]
    fn test_exploration_does_not_shift_prediction() {
        let request = corn_request(90).with_requirement(Nutrient::Potassium, 60.0);
        let weather = season_weather(90);
        let calendar = corn_calendar();
        let network = Network::constant(4, 0.42);
        for (rate, bonus) in [(0.0, 0.0), (1.0, 5.0)] {
            let optimizer =
                LearnedOptimizer::new(LearnedConfig::default().with_exploration(rate, bonus));
            let ctx = FieldContext::new(&request, &weather, &calendar, &optimizer.params);
            let built = optimizer.build_schedule(
                &ctx,
                &network,
                &mut SmallRng::seed_from_u64(5),
                &Deadline::none(),
            );
            assert!(built.schedule.application_count() > 0);
            assert!(!built.interrupted);
            assert!((built.predicted - 0.42).abs() < 1e-12, "rate {rate}: {}", built.predicted);
        }
    }

    #[test]
    fn test_timed_out_reports_own_interruption() {
        let request = corn_request(60);
        let weather = season_weather(60);
        let calendar = corn_calendar();
        let history = synthetic_history(40);
        let optimizer = LearnedOptimizer::default();

        let finished = optimizer.optimize(&request, &weather, &calendar, &history).unwrap();
        assert!(!finished.timed_out);

        let expired = Deadline::after(std::time::Duration::ZERO);
        let cut = optimizer
            .optimize_until(&request, &weather, &calendar, &history, &expired)
            .unwrap();
        assert!(cut.timed_out);
        assert!(cut.loss_history.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = LearnedConfig::default();
        config.amount_fractions = vec![1.5];
        let err = LearnedOptimizer::new(config)
            .optimize(&corn_request(30), &[], &corn_calendar(), &[])
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidConfig(_)));
    }
}
