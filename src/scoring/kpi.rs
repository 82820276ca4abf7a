//! Schedule quality metrics (KPIs).
//!
//! Summarizes a schedule for reporting next to its objective vector.
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Application count | Number of apply actions |
//! | Split nutrients | Nutrients applied on more than one date |
//! | Total cost | Σ product + pass cost ($/acre) |
//! | Fulfilment | applied ÷ required, per nutrient |
//! | Mean suitability | Amount-weighted weather suitability of application days |
//! | Budget utilization | total cost ÷ budget |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::score_application;
use crate::context::FieldContext;
use crate::models::{Nutrient, Schedule};

/// Schedule performance indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleKpi {
    pub application_count: usize,
    pub split_nutrient_count: usize,
    /// Total estimated cost ($/acre).
    pub total_cost: f64,
    /// applied ÷ required per requested nutrient (1.0 = exact).
    pub fulfilment: BTreeMap<Nutrient, f64>,
    /// Amount-weighted suitability of application days (0..=1).
    pub mean_suitability: f64,
    /// total cost ÷ budget, when a budget is set.
    pub budget_utilization: Option<f64>,
    /// Day offset of the first application.
    pub first_application_day: Option<u32>,
    /// Day offset of the last application.
    pub last_application_day: Option<u32>,
}

impl ScheduleKpi {
    /// Computes KPIs for a schedule.
    pub fn calculate(ctx: &FieldContext<'_>, schedule: &Schedule) -> Self {
        let mut total_cost = 0.0;
        let mut weighted_suitability = 0.0;
        let mut total_amount = 0.0;
        let mut first: Option<u32> = None;
        let mut last: Option<u32> = None;

        for app in schedule.applications() {
            let day = ctx.day_of(app.date);
            total_cost += score_application(ctx, day, app.nutrient, app.amount, app.method).cost;
            weighted_suitability += ctx.weather_on(day).suitability * app.amount;
            total_amount += app.amount;
            first = Some(first.map_or(day, |f| f.min(day)));
            last = Some(last.map_or(day, |l| l.max(day)));
        }

        let fulfilment = ctx
            .request
            .requirements
            .iter()
            .map(|(&n, &required)| {
                let applied = schedule.total_applied(n);
                let ratio = if required > 0.0 {
                    applied / required
                } else if applied > 0.0 {
                    f64::INFINITY
                } else {
                    1.0
                };
                (n, ratio)
            })
            .collect();

        let mean_suitability = if total_amount > 0.0 {
            weighted_suitability / total_amount
        } else {
            0.0
        };

        let budget_utilization = ctx
            .request
            .budget
            .filter(|b| *b > 0.0)
            .map(|b| total_cost / b);

        Self {
            application_count: schedule.application_count(),
            split_nutrient_count: schedule.split_nutrient_count(),
            total_cost,
            fulfilment,
            mean_suitability,
            budget_utilization,
            first_application_day: first,
            last_application_day: last,
        }
    }

    /// Whether every requested nutrient is within `tolerance` of its requirement.
    pub fn is_fulfilled(&self, tolerance: f64) -> bool {
        self.fulfilment.values().all(|r| (r - 1.0).abs() <= tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApplicationMethod, GrowthStageCalendar, REQUIREMENT_TOLERANCE};
    use crate::scoring::ScoringParams;
    use crate::scoring::test_support::*;
    use chrono::Duration;

    #[test]
    fn test_kpi_basic() {
        let req = corn_request(120).with_budget(200.0);
        let params = ScoringParams::default();
        let cal = corn_calendar();
        let ctx = FieldContext::new(&req, &[], &cal, &params);

        let mut s = Schedule::new();
        s.add_application(planting() + Duration::days(10), Nutrient::Nitrogen, 50.0, ApplicationMethod::Broadcast);
        s.add_application(planting() + Duration::days(40), Nutrient::Nitrogen, 100.0, ApplicationMethod::Broadcast);

        let kpi = ScheduleKpi::calculate(&ctx, &s);
        assert_eq!(kpi.application_count, 2);
        assert_eq!(kpi.split_nutrient_count, 1);
        // 150 * 0.55 + 2 * 8 = 98.5
        assert!((kpi.total_cost - 98.5).abs() < 1e-9);
        assert!((kpi.budget_utilization.unwrap() - 98.5 / 200.0).abs() < 1e-12);
        assert_eq!(kpi.first_application_day, Some(10));
        assert_eq!(kpi.last_application_day, Some(40));
        assert!(kpi.is_fulfilled(REQUIREMENT_TOLERANCE));
        assert!(kpi.mean_suitability > 0.0);
    }

    #[test]
    fn test_kpi_empty() {
        let req = corn_request(30);
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&req, &[], &GrowthStageCalendar::new(), &params);
        let kpi = ScheduleKpi::calculate(&ctx, &Schedule::new());
        assert_eq!(kpi.application_count, 0);
        assert_eq!(kpi.total_cost, 0.0);
        assert_eq!(kpi.fulfilment[&Nutrient::Nitrogen], 0.0);
        assert!(!kpi.is_fulfilled(0.01));
        assert!(kpi.budget_utilization.is_none());
        assert!(kpi.first_application_day.is_none());
    }
}
