//! Read-only problem view shared by all optimizers.
//!
//! [`FieldContext`] resolves the externally supplied weather windows and
//! growth calendar into one snapshot and one stage per horizon day, so
//! the optimizers work with day offsets (`0..=horizon_days`) and never
//! search the raw inputs again. It holds no mutable state and is `Sync`,
//! so parallel evaluators can share it.

use chrono::{Duration, NaiveDate};

use crate::models::{
    GrowthStage, GrowthStageCalendar, OptimizationRequest, WeatherSnapshot, WeatherWindow,
};
use crate::scoring::ScoringParams;

/// Per-day view of one optimization problem.
#[derive(Debug, Clone)]
pub struct FieldContext<'a> {
    /// The request being optimized.
    pub request: &'a OptimizationRequest,
    /// Scoring constants.
    pub params: &'a ScoringParams,
    weather: Vec<WeatherSnapshot>,
    stages: Vec<GrowthStage>,
    covered: Vec<bool>,
    /// Multiplier on yield scores (scenario analysis; 1.0 = nominal).
    pub yield_multiplier: f64,
    /// Multiplier on costs (scenario analysis; 1.0 = nominal).
    pub cost_multiplier: f64,
}

impl<'a> FieldContext<'a> {
    /// Resolves windows and calendar over the request horizon.
    ///
    /// Days covered by no window use [`WeatherSnapshot::neutral`]. When
    /// windows overlap, the first one listed wins.
    pub fn new(
        request: &'a OptimizationRequest,
        windows: &[WeatherWindow],
        calendar: &GrowthStageCalendar,
        params: &'a ScoringParams,
    ) -> Self {
        let days = request.horizon_days as usize + 1;
        let mut weather = Vec::with_capacity(days);
        let mut stages = Vec::with_capacity(days);
        let mut covered = Vec::with_capacity(days);

        for offset in 0..days {
            let date = request.planting_date + Duration::days(offset as i64);
            match windows.iter().find(|w| w.contains(date)) {
                Some(w) => {
                    weather.push(w.snapshot());
                    covered.push(true);
                }
                None => {
                    weather.push(WeatherSnapshot::neutral());
                    covered.push(false);
                }
            }
            stages.push(calendar.stage_on(date));
        }

        Self {
            request,
            params,
            weather,
            stages,
            covered,
            yield_multiplier: 1.0,
            cost_multiplier: 1.0,
        }
    }

    /// Sets scenario multipliers.
    pub fn with_multipliers(mut self, yield_multiplier: f64, cost_multiplier: f64) -> Self {
        self.yield_multiplier = yield_multiplier;
        self.cost_multiplier = cost_multiplier;
        self
    }

    /// Number of days in the horizon, including day 0.
    #[inline]
    pub fn day_count(&self) -> usize {
        self.weather.len()
    }

    /// Last valid day offset.
    #[inline]
    pub fn last_day(&self) -> u32 {
        self.request.horizon_days
    }

    /// Date of a day offset.
    #[inline]
    pub fn date_of(&self, day: u32) -> NaiveDate {
        self.request.planting_date + Duration::days(i64::from(day))
    }

    /// Day offset of a date, clamped into the horizon.
    pub fn day_of(&self, date: NaiveDate) -> u32 {
        let offset = (date - self.request.planting_date).num_days();
        offset.clamp(0, i64::from(self.last_day())) as u32
    }

    /// Weather on a day (clamped into the horizon).
    #[inline]
    pub fn weather_on(&self, day: u32) -> WeatherSnapshot {
        self.weather[self.clamp_index(day)]
    }

    /// Growth stage on a day (clamped into the horizon).
    #[inline]
    pub fn stage_on(&self, day: u32) -> GrowthStage {
        self.stages[self.clamp_index(day)]
    }

    /// Whether a window explicitly covers the day.
    pub fn is_covered(&self, day: u32) -> bool {
        self.covered[self.clamp_index(day)]
    }

    /// Whether any application is possible on the day.
    pub fn permits_application(&self, day: u32) -> bool {
        self.weather_on(day).condition.permits_application()
    }

    /// Days on which applications are possible.
    pub fn feasible_days(&self) -> Vec<u32> {
        (0..=self.last_day())
            .filter(|&d| self.permits_application(d))
            .collect()
    }

    fn clamp_index(&self, day: u32) -> usize {
        (day as usize).min(self.weather.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Nutrient, WeatherCondition};

    fn planting() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 20).unwrap()
    }

    #[test]
    fn test_resolves_weather_and_stages() {
        let request = OptimizationRequest::new("F1", "corn", planting(), 30)
            .with_requirement(Nutrient::Nitrogen, 100.0);
        let windows = vec![
            WeatherWindow::new(
                planting() + Duration::days(5),
                planting() + Duration::days(9),
                WeatherCondition::Unsuitable,
            ),
            WeatherWindow::new(
                planting() + Duration::days(8),
                planting() + Duration::days(20),
                WeatherCondition::Excellent,
            ),
        ];
        let calendar = GrowthStageCalendar::from_offsets(
            planting(),
            &[(0, GrowthStage::Planting), (12, GrowthStage::Emergence)],
        );
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&request, &windows, &calendar, &params);

        assert_eq!(ctx.day_count(), 31);
        assert_eq!(ctx.weather_on(0).condition, WeatherCondition::Fair);
        assert!(!ctx.is_covered(0));
        assert_eq!(ctx.weather_on(8).condition, WeatherCondition::Unsuitable);
        assert_eq!(ctx.weather_on(10).condition, WeatherCondition::Excellent);
        assert_eq!(ctx.stage_on(11), GrowthStage::Planting);
        assert_eq!(ctx.stage_on(12), GrowthStage::Emergence);
        assert!(!ctx.permits_application(6));
        assert_eq!(ctx.feasible_days().len(), 31 - 5);
    }

    #[test]
    fn test_day_date_conversion() {
        let request = OptimizationRequest::new("F1", "corn", planting(), 10);
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&request, &[], &GrowthStageCalendar::new(), &params);
        assert_eq!(ctx.date_of(3), planting() + Duration::days(3));
        assert_eq!(ctx.day_of(planting() + Duration::days(3)), 3);
        assert_eq!(ctx.day_of(planting() - Duration::days(3)), 0);
        assert_eq!(ctx.day_of(planting() + Duration::days(30)), 10);
        assert_eq!(ctx.weather_on(99), ctx.weather_on(10));
    }
}
