//! Sub-score functions shared by all optimizers.
//!
//! Every optimizer ranks schedules with the same four objectives:
//!
//! | Objective | Per application | Schedule-wide |
//! |-----------|-----------------|---------------|
//! | Yield | stage alignment × weather × soil moisture × method efficiency | amount-weighted mean per nutrient, scaled by fulfilment |
//! | Cost | product share of the application's cost | baseline cost ÷ total cost |
//! | Environment | weather × rain × slope × method, + moisture bonus | amount-weighted mean |
//! | Risk | suitability, dry forecast, early timing | amount-weighted mean + split bonus, scaled by fulfilment |
//!
//! All scores are in [0, 100], higher = better.

mod kpi;
mod params;

pub use kpi::ScheduleKpi;
pub use params::{MethodTable, NutrientTable, ScoringParams};

use std::collections::BTreeMap;

use crate::context::FieldContext;
use crate::models::{
    ApplicationMethod, GrowthStage, Nutrient, ObjectiveVector, Schedule, Violation,
    WeatherSnapshot,
};

/// Sub-scores of a single application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplicationScores {
    /// Yield response quality (0..=100).
    pub yield_quality: f64,
    /// Product share of the application cost (0..=100).
    pub cost_efficiency: f64,
    /// Environmental favorability (0..=100).
    pub environmental: f64,
    /// Timing risk mitigation (0..=100).
    pub risk: f64,
    /// Estimated cost ($/acre).
    pub cost: f64,
}

/// Schedule-wide evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEvaluation {
    pub objectives: ObjectiveVector,
    /// Total estimated cost ($/acre).
    pub total_cost: f64,
    /// Amount by which the cost exceeds the budget (0 if within).
    pub budget_overrun: f64,
    /// Largest relative deviation of an applied total from its requirement.
    pub max_requirement_deviation: f64,
    /// Applications placed on days that do not permit application.
    pub unsuitable_applications: usize,
}

/// Scores one application made on `day`.
pub fn score_application(
    ctx: &FieldContext<'_>,
    day: u32,
    nutrient: Nutrient,
    amount: f64,
    method: ApplicationMethod,
) -> ApplicationScores {
    score_with_conditions(
        ctx,
        ctx.weather_on(day),
        ctx.stage_on(day),
        day,
        nutrient,
        amount,
        method,
    )
}

/// Scores an application under explicit weather and stage.
pub fn score_with_conditions(
    ctx: &FieldContext<'_>,
    weather: WeatherSnapshot,
    stage: GrowthStage,
    day: u32,
    nutrient: Nutrient,
    amount: f64,
    method: ApplicationMethod,
) -> ApplicationScores {
    let p = ctx.params;

    let moisture_gap =
        ((weather.soil_moisture - p.optimal_soil_moisture).abs() / p.soil_moisture_tolerance).min(1.0);
    let moisture_factor = 1.0 - 0.5 * moisture_gap;
    let yield_quality = 100.0
        * p.alignment(nutrient, stage)
        * p.weather_yield(weather.condition)
        * moisture_factor
        * p.method_efficiency.get(method)
        * ctx.yield_multiplier;

    let product_cost = amount.max(0.0) * p.price_per_lb.get(nutrient) * ctx.cost_multiplier;
    let cost = product_cost + p.method_cost_per_acre.get(method) * ctx.cost_multiplier;
    let cost_efficiency = if cost > 0.0 {
        100.0 * product_cost / cost
    } else {
        0.0
    };

    let slope_penalty = (ctx.request.site.slope_percent * p.slope_penalty_per_percent)
        .min(p.max_slope_penalty);
    let mut leaching = 1.0;
    if nutrient.is_mobile() && weather.precipitation_probability > 0.6 {
        leaching = 0.8;
    }
    let mut environmental = 100.0
        * p.weather_environment(weather.condition)
        * (1.0 - 0.5 * weather.precipitation_probability)
        * (1.0 - slope_penalty)
        * p.method_environment.get(method)
        * leaching;
    if (weather.soil_moisture - p.optimal_soil_moisture).abs() <= 0.1 {
        environmental += p.ideal_moisture_bonus;
    }

    let earliness = (-(f64::from(day)) / p.earliness_scale_days).exp();
    let risk = 100.0
        * (0.5 * weather.suitability
            + 0.3 * (1.0 - weather.precipitation_probability)
            + 0.2 * earliness);

    ApplicationScores {
        yield_quality: yield_quality.clamp(0.0, 100.0),
        cost_efficiency: cost_efficiency.clamp(0.0, 100.0),
        environmental: environmental.clamp(0.0, 100.0),
        risk: risk.clamp(0.0, 100.0),
        cost,
    }
}

/// Baseline cost: every requirement in one pass with the cheapest method.
pub fn baseline_cost(ctx: &FieldContext<'_>) -> f64 {
    let product: f64 = ctx
        .request
        .requirements
        .iter()
        .map(|(&n, &amount)| amount * ctx.params.price_per_lb.get(n))
        .sum();
    (product + ctx.params.cheapest_method_cost(ctx.request.methods.iter())) * ctx.cost_multiplier
}

/// Evaluates a whole schedule against the request.
///
/// Applications of nutrients the request does not require still count
/// toward cost but not toward yield.
pub fn evaluate_schedule(ctx: &FieldContext<'_>, schedule: &Schedule) -> ScheduleEvaluation {
    let request = ctx.request;
    let active = request.active_nutrients();

    let mut total_cost = 0.0;
    let mut total_amount = 0.0;
    let mut env_weighted = 0.0;
    let mut risk_weighted = 0.0;
    let mut unsuitable = 0;
    // nutrient → (applied amount, amount-weighted yield quality, application count)
    let mut per_nutrient: BTreeMap<Nutrient, (f64, f64, usize)> = BTreeMap::new();

    for app in schedule.applications() {
        let day = ctx.day_of(app.date);
        if !ctx.permits_application(day) {
            unsuitable += 1;
        }
        let s = score_application(ctx, day, app.nutrient, app.amount, app.method);
        total_cost += s.cost;
        total_amount += app.amount;
        env_weighted += s.environmental * app.amount;
        risk_weighted += s.risk * app.amount;
        let entry = per_nutrient.entry(app.nutrient).or_insert((0.0, 0.0, 0));
        entry.0 += app.amount;
        entry.1 += s.yield_quality * app.amount;
        entry.2 += 1;
    }

    let mut yield_sum = 0.0;
    let mut fulfilment_sum = 0.0;
    let mut max_deviation: f64 = 0.0;
    let mut split_count = 0usize;
    for &n in &active {
        let required = request.requirement(n);
        let (applied, weighted_quality, count) =
            per_nutrient.get(&n).copied().unwrap_or((0.0, 0.0, 0));
        let ratio = applied / required;
        let fulfilment = ratio.min(1.0);
        let excess = (ratio - 1.0).max(0.0).min(1.0);
        let quality = if applied > 0.0 {
            weighted_quality / applied
        } else {
            0.0
        };
        yield_sum += quality * fulfilment * (1.0 - 0.5 * excess);
        fulfilment_sum += fulfilment;
        max_deviation = max_deviation.max((ratio - 1.0).abs());
        if count > 1 {
            split_count += 1;
        }
    }

    let (yield_benefit, mean_fulfilment) = if active.is_empty() {
        (100.0, 1.0)
    } else {
        let n = active.len() as f64;
        (yield_sum / n, fulfilment_sum / n)
    };

    let baseline = baseline_cost(ctx);
    let cost_efficiency = if total_cost <= 0.0 {
        100.0
    } else {
        100.0 * baseline / total_cost
    };

    let environmental = if total_amount > 0.0 {
        env_weighted / total_amount
    } else {
        100.0
    };

    let risk = if total_amount > 0.0 {
        let split_share = if active.is_empty() {
            0.0
        } else {
            split_count as f64 / active.len() as f64
        };
        (risk_weighted / total_amount + ctx.params.split_bonus * split_share)
            * (0.5 + 0.5 * mean_fulfilment)
    } else {
        0.0
    };

    let budget_overrun = request
        .budget
        .map(|b| (total_cost - b).max(0.0))
        .unwrap_or(0.0);

    ScheduleEvaluation {
        objectives: ObjectiveVector::new(yield_benefit, cost_efficiency, environmental, risk),
        total_cost,
        budget_overrun,
        max_requirement_deviation: max_deviation,
        unsuitable_applications: unsuitable,
    }
}

/// Evaluates a finished schedule and attaches its constraint violations
/// (unmet requirements, dates outside the horizon, budget overrun,
/// applications on unsuitable days).
pub fn finalize_schedule(ctx: &FieldContext<'_>, schedule: &mut Schedule) -> ScheduleEvaluation {
    schedule.check_requirements(ctx.request);
    let evaluation = evaluate_schedule(ctx, schedule);
    if evaluation.budget_overrun > 0.0 {
        schedule.add_violation(Violation::budget_exceeded(evaluation.budget_overrun));
    }
    let unsuitable: Vec<_> = schedule
        .applications()
        .filter(|a| !ctx.permits_application(ctx.day_of(a.date)))
        .map(|a| a.date)
        .collect();
    for date in unsuitable {
        schedule.add_violation(Violation::unsuitable_weather(date));
    }
    evaluation
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::{GrowthStageCalendar, OptimizationRequest, WeatherCondition, WeatherWindow};
    use chrono::Duration;

    #[test]
    fn test_application_scores_in_range() {
        let req = corn_request(120);
        let weather = season_weather(120);
        let cal = corn_calendar();
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&req, &weather, &cal, &params);

        for day in [0, 10, 30, 60, 100, 120] {
            let s = score_application(&ctx, day, Nutrient::Nitrogen, 50.0, ApplicationMethod::Broadcast);
            for v in [s.yield_quality, s.cost_efficiency, s.environmental, s.risk] {
                assert!((0.0..=100.0).contains(&v), "score {v} out of range on day {day}");
            }
            assert!(s.cost > 0.0);
        }
    }

    #[test]
    fn test_vegetative_timing_beats_grain_fill() {
        let req = corn_request(120);
        let cal = corn_calendar();
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&req, &[], &cal, &params);
        let veg = score_application(&ctx, 25, Nutrient::Nitrogen, 50.0, ApplicationMethod::Banded);
        let late = score_application(&ctx, 95, Nutrient::Nitrogen, 50.0, ApplicationMethod::Banded);
        assert!(veg.yield_quality > late.yield_quality);
    }

    #[test]
    fn test_unsuitable_weather_zeroes_yield() {
        let req = corn_request(30);
        let windows = vec![WeatherWindow::new(
            planting(),
            planting() + Duration::days(30),
            WeatherCondition::Unsuitable,
        )];
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&req, &windows, &corn_calendar(), &params);
        let s = score_application(&ctx, 5, Nutrient::Nitrogen, 50.0, ApplicationMethod::Broadcast);
        assert_eq!(s.yield_quality, 0.0);
        assert_eq!(s.environmental, 0.0);
    }

    #[test]
    fn test_single_pass_full_requirement_scores_high_cost_efficiency() {
        let req = corn_request(120);
        let params = ScoringParams::default();
        let cal = corn_calendar();
        let ctx = FieldContext::new(&req, &[], &cal, &params);

        let mut one = Schedule::new();
        one.add_application(planting() + Duration::days(25), Nutrient::Nitrogen, 150.0, ApplicationMethod::Broadcast);
        let mut three = Schedule::new();
        for offset in [20, 30, 40] {
            one_more(&mut three, offset, 50.0);
        }

        let e1 = evaluate_schedule(&ctx, &one);
        let e3 = evaluate_schedule(&ctx, &three);
        assert!((e1.objectives.cost_efficiency - 100.0).abs() < 1e-9);
        assert!(e3.objectives.cost_efficiency < e1.objectives.cost_efficiency);
        assert!(e3.objectives.risk_mitigation > 0.0);
        assert!(e1.max_requirement_deviation < 1e-9);
    }

    fn one_more(s: &mut Schedule, offset: i64, amount: f64) {
        s.add_application(planting() + Duration::days(offset), Nutrient::Nitrogen, amount, ApplicationMethod::Broadcast);
    }

    #[test]
    fn test_shortfall_lowers_yield() {
        let req = corn_request(120);
        let params = ScoringParams::default();
        let cal = corn_calendar();
        let ctx = FieldContext::new(&req, &[], &cal, &params);

        let mut full = Schedule::new();
        one_more(&mut full, 25, 150.0);
        let mut half = Schedule::new();
        one_more(&mut half, 25, 75.0);

        let ef = evaluate_schedule(&ctx, &full);
        let eh = evaluate_schedule(&ctx, &half);
        assert!(ef.objectives.yield_benefit > eh.objectives.yield_benefit);
        assert!((eh.max_requirement_deviation - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_schedule_defaults() {
        let req = corn_request(30);
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&req, &[], &GrowthStageCalendar::new(), &params);
        let e = evaluate_schedule(&ctx, &Schedule::new());
        assert_eq!(e.objectives.yield_benefit, 0.0);
        assert_eq!(e.objectives.cost_efficiency, 100.0);
        assert_eq!(e.objectives.environmental, 100.0);
        assert_eq!(e.objectives.risk_mitigation, 0.0);
        assert_eq!(e.total_cost, 0.0);
    }

    #[test]
    fn test_budget_overrun() {
        let req = corn_request(30).with_budget(20.0);
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&req, &[], &GrowthStageCalendar::new(), &params);
        let mut s = Schedule::new();
        one_more(&mut s, 5, 150.0);
        let e = evaluate_schedule(&ctx, &s);
        // 150 * 0.55 + 8 = 90.5
        assert!((e.total_cost - 90.5).abs() < 1e-9);
        assert!((e.budget_overrun - 70.5).abs() < 1e-9);
    }

    #[test]
    fn test_finalize_attaches_violations() {
        let req = corn_request(30).with_budget(20.0);
        let windows = vec![WeatherWindow::new(
            planting(),
            planting() + Duration::days(10),
            WeatherCondition::Unsuitable,
        )];
        let params = ScoringParams::default();
        let cal = corn_calendar();
        let ctx = FieldContext::new(&req, &windows, &cal, &params);
        let mut s = Schedule::new();
        one_more(&mut s, 5, 100.0);

        let e = finalize_schedule(&ctx, &mut s);
        assert!(e.budget_overrun > 0.0);
        assert!(!s.is_complete());
        assert_eq!(s.violations.len(), 3);
    }

    #[test]
    fn test_no_active_nutrients_is_neutral() {
        let req = OptimizationRequest::new("F", "corn", planting(), 10)
            .with_requirement(Nutrient::Sulfur, 0.0);
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&req, &[], &GrowthStageCalendar::new(), &params);
        let e = evaluate_schedule(&ctx, &Schedule::new());
        assert_eq!(e.objectives.yield_benefit, 100.0);
        assert_eq!(e.max_requirement_deviation, 0.0);
    }
}
