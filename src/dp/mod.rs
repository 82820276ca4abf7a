//! Exact dynamic programming optimizer.
//!
//! # Algorithm
//!
//! Backward induction with memoization over a discretized state space:
//!
//! ```text
//! V(t, s) = max_{a ∈ A(t, s)} [ R(t, s, a) + γ · V(t + Δ, s') ]
//! ```
//!
//! - Decisions are taken every `decision_interval_days`.
//! - Amounts are discretized into `amount_steps` units per nutrient, so a
//!   completed nutrient sums to its requirement exactly.
//! - `A(t, s)` always contains `Wait`. `Apply` is feasible when the
//!   nutrient still has units left, the day's weather permits
//!   application and the cost fits the remaining budget.
//! - Terminal: all requirements met, or the horizon is exhausted.
//!
//! The optimal schedule is recovered by forward simulation of the cached
//! policy from the initial state. The memo table belongs to a single
//! call and is dropped with it.
//!
//! # Complexity
//! O(T × Π(steps+1) × B × |A|) where T = decision days, B = distinct
//! budget buckets. Suited to short horizons and one or two nutrients.
//!
//! # Reference
//! Bellman (1957), "Dynamic Programming"

mod state;

pub use state::{MemoEntry, MemoTable, State};

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::FieldContext;
use crate::control::Deadline;
use crate::error::{OptimizerError, Result};
use crate::models::{
    ApplicationAction, ApplicationMethod, GrowthStageCalendar, Nutrient, ObjectiveVector,
    ObjectiveWeights, OptimizationRequest, Schedule, WeatherWindow,
};
use crate::scoring::{ScoringParams, finalize_schedule, score_with_conditions};
use crate::validation::validate_inputs;

/// DP optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DpConfig {
    /// Discount factor γ per decision step, in (0, 1].
    pub discount_factor: f64,
    /// Days between decision points.
    pub decision_interval_days: u32,
    /// Discretization units per nutrient requirement.
    pub amount_steps: u8,
    /// Reward granted when the last requirement is met.
    pub completion_bonus: f64,
    /// Budget rounding resolution ($).
    pub budget_resolution: f64,
    /// Soil moisture rounding resolution.
    pub moisture_resolution: f64,
    /// Memo size at which the search stops expanding.
    pub max_states: usize,
    /// Weights combining the four sub-scores into the reward.
    pub weights: ObjectiveWeights,
}

impl Default for DpConfig {
    fn default() -> Self {
        Self {
            discount_factor: 0.98,
            decision_interval_days: 7,
            amount_steps: 4,
            completion_bonus: 25.0,
            budget_resolution: 1.0,
            moisture_resolution: 0.05,
            max_states: 2_000_000,
            weights: ObjectiveWeights::default(),
        }
    }
}

impl DpConfig {
    pub fn with_discount_factor(mut self, gamma: f64) -> Self {
        self.discount_factor = gamma;
        self
    }

    pub fn with_decision_interval(mut self, days: u32) -> Self {
        self.decision_interval_days = days;
        self
    }

    pub fn with_amount_steps(mut self, steps: u8) -> Self {
        self.amount_steps = steps;
        self
    }

    pub fn with_max_states(mut self, max_states: usize) -> Self {
        self.max_states = max_states;
        self
    }

    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Checks parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.discount_factor > 0.0 && self.discount_factor <= 1.0) {
            return Err(OptimizerError::InvalidConfig(format!(
                "discount factor {} outside (0, 1]",
                self.discount_factor
            )));
        }
        if self.decision_interval_days == 0 || self.amount_steps == 0 {
            return Err(OptimizerError::InvalidConfig(
                "decision interval and amount steps must be positive".into(),
            ));
        }
        if self.budget_resolution <= 0.0 || self.moisture_resolution <= 0.0 {
            return Err(OptimizerError::InvalidConfig(
                "rounding resolutions must be positive".into(),
            ));
        }
        if !self.weights.is_normalized() {
            return Err(OptimizerError::InvalidConfig(
                "objective weights must be non-negative and sum to 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of a DP optimization.
#[derive(Debug, Clone)]
pub struct DpResult {
    /// Schedule recovered from the optimal policy.
    pub schedule: Schedule,
    /// Optimal value V(0, s₀).
    pub total_value: f64,
    /// Objective scores of the schedule.
    pub value_breakdown: ObjectiveVector,
    /// States memoized during the search.
    pub visited_states: usize,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// V at each decision point along the recovered trajectory.
    pub value_trace: Vec<f64>,
    /// Whether the search was cut short (deadline or state limit).
    pub truncated: bool,
}

/// Backward-induction optimizer.
///
/// Holds only immutable configuration; every call builds its own memo table.
#[derive(Debug, Clone, Default)]
pub struct DpOptimizer {
    pub config: DpConfig,
    pub params: ScoringParams,
}

impl DpOptimizer {
    pub fn new(config: DpConfig) -> Self {
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
    ) -> Result<DpResult> {
        self.optimize_until(request, windows, calendar, &Deadline::none())
    }

    /// Optimizes, stopping early once `deadline` expires.
    pub fn optimize_until(
        &self,
        request: &OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        deadline: &Deadline,
    ) -> Result<DpResult> {
        validate_inputs(request, windows, calendar).map_err(OptimizerError::InvalidRequest)?;
        self.config.validate()?;
        self.params.validate()?;

        let started = Instant::now();
        let ctx = FieldContext::new(request, windows, calendar, &self.params);
        let mut solver = Solver::new(&ctx, &self.config, deadline);
        debug!(
            field = %request.field_id,
            nutrients = solver.nutrients.len(),
            horizon = request.horizon_days,
            "starting DP search"
        );

        let initial = solver.initial_state();
        let total_value = solver.value(&initial);
        let (mut schedule, value_trace, favorable_fraction) = solver.simulate(initial);

        let evaluation = finalize_schedule(&ctx, &mut schedule);

        let max_value = 100.0 + self.config.completion_bonus;
        let magnitude = if max_value > 0.0 {
            (total_value / max_value).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut confidence = 0.5 * magnitude + 0.5 * favorable_fraction;
        if !schedule.is_complete() {
            confidence *= 0.5;
        }

        if solver.truncated {
            warn!(
                field = %request.field_id,
                visited = solver.memo.len(),
                "DP search truncated, returning best policy found"
            );
        }
        info!(
            field = %request.field_id,
            value = total_value,
            visited = solver.memo.len(),
            applications = schedule.application_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "DP optimization finished"
        );

        Ok(DpResult {
            schedule,
            total_value,
            value_breakdown: evaluation.objectives,
            visited_states: solver.memo.len(),
            confidence: confidence.clamp(0.0, 1.0),
            value_trace,
            truncated: solver.truncated,
        })
    }
}

/// One optimize call's search: context, memo table and bookkeeping.
struct Solver<'c, 'a> {
    ctx: &'c FieldContext<'a>,
    config: &'c DpConfig,
    deadline: &'c Deadline,
    memo: MemoTable,
    nutrients: Vec<Nutrient>,
    methods: Vec<ApplicationMethod>,
    unit_amount: [f64; 4],
    total_requirement: f64,
    expansions: u64,
    truncated: bool,
}

impl<'c, 'a> Solver<'c, 'a> {
    fn new(ctx: &'c FieldContext<'a>, config: &'c DpConfig, deadline: &'c Deadline) -> Self {
        let nutrients = ctx.request.active_nutrients();
        let mut unit_amount = [0.0; 4];
        for &n in &nutrients {
            unit_amount[n.index()] = ctx.request.requirement(n) / f64::from(config.amount_steps);
        }
        let total_requirement = nutrients.iter().map(|&n| ctx.request.requirement(n)).sum();
        Self {
            ctx,
            config,
            deadline,
            memo: MemoTable::new(),
            nutrients,
            methods: ctx.request.method_list(),
            unit_amount,
            total_requirement,
            expansions: 0,
            truncated: false,
        }
    }

    fn initial_state(&self) -> State {
        let budget = self
            .ctx
            .request
            .budget
            .map(|b| (b / self.config.budget_resolution).floor() as i64);
        State::at(self.ctx, 0, budget, [0; 4], self.config.moisture_resolution)
    }

    fn is_complete(&self, units: &[u8; 4]) -> bool {
        self.nutrients
            .iter()
            .all(|n| units[n.index()] >= self.config.amount_steps)
    }

    fn remaining_budget(&self, bucket: Option<i64>) -> Option<f64> {
        bucket.map(|b| b as f64 * self.config.budget_resolution)
    }

    /// V(t, s). Pure in `state`: a cached value is returned unchanged.
    fn value(&mut self, state: &State) -> f64 {
        if let Some(entry) = self.memo.get(state) {
            return entry.value;
        }
        if self.is_complete(&state.applied_units) || state.day > self.ctx.last_day() {
            return 0.0;
        }

        self.expansions += 1;
        if self.expansions % 256 == 1 && self.deadline.is_expired() {
            self.truncated = true;
        }
        if self.memo.len() >= self.config.max_states {
            self.truncated = true;
        }
        if self.truncated {
            return 0.0;
        }

        let gamma = self.config.discount_factor;
        let next_day = state.day + self.config.decision_interval_days;

        let mut best_value =
            gamma * self.continuation(next_day, state.budget_bucket, state.applied_units);
        let mut best_action = ApplicationAction::Wait;

        for (nutrient, amount, method) in self.candidate_actions(state) {
            let Some((reward, budget, units)) = self.transition(state, nutrient, amount, method)
            else {
                continue;
            };
            let future = if self.is_complete(&units) {
                0.0
            } else {
                gamma * self.continuation(next_day, budget, units)
            };
            let total = reward + future;
            if total > best_value + 1e-12 {
                best_value = total;
                best_action = ApplicationAction::apply(nutrient, amount, method);
            }
        }

        // Values computed after truncation depend on where the search stopped.
        if !self.truncated {
            self.memo.insert(
                *state,
                MemoEntry {
                    value: best_value,
                    action: best_action,
                },
            );
        }
        best_value
    }

    fn continuation(&mut self, day: u32, budget: Option<i64>, units: [u8; 4]) -> f64 {
        if day > self.ctx.last_day() {
            return 0.0;
        }
        let next = State::at(self.ctx, day, budget, units, self.config.moisture_resolution);
        self.value(&next)
    }

    /// Apply actions structurally allowed from `state` (budget not yet checked).
    fn candidate_actions(&self, state: &State) -> Vec<(Nutrient, f64, ApplicationMethod)> {
        let mut actions = Vec::new();
        if !state.condition.permits_application() {
            return actions;
        }
        let steps = self.config.amount_steps;
        for &n in &self.nutrients {
            let done = state.units(n);
            if done >= steps {
                continue;
            }
            let unit_counts: Vec<u8> = if self.ctx.request.allow_split {
                (1..=steps - done).collect()
            } else if done == 0 {
                vec![steps]
            } else {
                Vec::new()
            };
            for k in unit_counts {
                let amount = f64::from(k) * self.unit_amount[n.index()];
                for &m in &self.methods {
                    actions.push((n, amount, m));
                }
            }
        }
        actions
    }

    /// Reward and successor progress of an apply action, or `None` if the
    /// budget cannot cover it.
    fn transition(
        &self,
        state: &State,
        nutrient: Nutrient,
        amount: f64,
        method: ApplicationMethod,
    ) -> Option<(f64, Option<i64>, [u8; 4])> {
        let weather = self.ctx.weather_on(state.day);
        let scores = score_with_conditions(
            self.ctx,
            weather,
            state.stage,
            state.day,
            nutrient,
            amount,
            method,
        );

        let budget = match self.remaining_budget(state.budget_bucket) {
            Some(remaining) => {
                if scores.cost > remaining + 1e-9 {
                    return None;
                }
                Some(((remaining - scores.cost) / self.config.budget_resolution).floor() as i64)
            }
            None => None,
        };

        let k = (amount / self.unit_amount[nutrient.index()]).round() as u8;
        let mut units = state.applied_units;
        units[nutrient.index()] += k;

        let split_bonus = if state.units(nutrient) > 0 {
            self.ctx.params.split_bonus
        } else {
            0.0
        };
        let w = &self.config.weights;
        let share = if self.total_requirement > 0.0 {
            amount / self.total_requirement
        } else {
            0.0
        };
        let mut reward = share
            * (w.yield_benefit * scores.yield_quality
                + w.cost_efficiency * scores.cost_efficiency
                + w.environmental * scores.environmental
                + w.risk_mitigation * (scores.risk + split_bonus).min(100.0));
        if self.is_complete(&units) {
            reward += self.config.completion_bonus;
        }

        Some((reward, budget, units))
    }

    /// Best immediately rewarding feasible action (used where no policy is cached).
    fn greedy_action(&self, state: &State) -> ApplicationAction {
        let mut best: Option<(f64, ApplicationAction)> = None;
        for (n, amount, m) in self.candidate_actions(state) {
            if let Some((reward, _, _)) = self.transition(state, n, amount, m) {
                if best.as_ref().is_none_or(|(r, _)| reward > *r) {
                    best = Some((reward, ApplicationAction::apply(n, amount, m)));
                }
            }
        }
        best.map(|(_, a)| a).unwrap_or(ApplicationAction::Wait)
    }

    /// Replays the cached policy from `initial`.
    ///
    /// Returns the schedule, the value trace and the fraction of decision
    /// points spent in favorable weather.
    fn simulate(&self, initial: State) -> (Schedule, Vec<f64>, f64) {
        let mut schedule = Schedule::new();
        let mut trace = Vec::new();
        let mut decisions = 0usize;
        let mut favorable = 0usize;
        let mut state = initial;

        loop {
            if self.is_complete(&state.applied_units) || state.day > self.ctx.last_day() {
                break;
            }
            decisions += 1;
            if state.condition.is_favorable() {
                favorable += 1;
            }

            let action = match self.memo.get(&state) {
                Some(entry) => {
                    trace.push(entry.value);
                    entry.action
                }
                None => self.greedy_action(&state),
            };

            let (budget, units) = match action {
                ApplicationAction::Wait => (state.budget_bucket, state.applied_units),
                ApplicationAction::Apply {
                    nutrient,
                    amount,
                    method,
                } => match self.transition(&state, nutrient, amount, method) {
                    Some((_, budget, units)) => {
                        schedule.add_application(
                            self.ctx.date_of(state.day),
                            nutrient,
                            amount,
                            method,
                        );
                        (budget, units)
                    }
                    None => (state.budget_bucket, state.applied_units),
                },
            };

            let next_day = state.day + self.config.decision_interval_days;
            if next_day > self.ctx.last_day() {
                break;
            }
            state = State::at(self.ctx, next_day, budget, units, self.config.moisture_resolution);
        }

        let fraction = if decisions > 0 {
            favorable as f64 / decisions as f64
        } else {
            0.0
        };
        (schedule, trace, fraction)
    }
}
