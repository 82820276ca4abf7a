//! DP state key and per-call memo table.

use std::collections::HashMap;

use crate::context::FieldContext;
use crate::models::{ApplicationAction, GrowthStage, Nutrient, WeatherCondition};

/// Immutable memoization key.
///
/// Growth stage, soil moisture and weather condition are functions of
/// `day` for a given context; they are part of the key so the key alone
/// describes the decision situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct State {
    /// Day offset from planting.
    pub day: u32,
    pub stage: GrowthStage,
    /// Soil moisture rounded to the configured resolution.
    pub moisture_bucket: u16,
    /// Remaining budget rounded down to the configured resolution.
    /// `None` = unconstrained.
    pub budget_bucket: Option<i64>,
    /// Applied amount per nutrient, in discretization units.
    pub applied_units: [u8; 4],
    pub condition: WeatherCondition,
}

impl State {
    /// Builds the state reached on `day` with the given progress.
    pub fn at(
        ctx: &FieldContext<'_>,
        day: u32,
        budget_bucket: Option<i64>,
        applied_units: [u8; 4],
        moisture_resolution: f64,
    ) -> Self {
        let weather = ctx.weather_on(day);
        Self {
            day,
            stage: ctx.stage_on(day),
            moisture_bucket: (weather.soil_moisture / moisture_resolution).round() as u16,
            budget_bucket,
            applied_units,
            condition: weather.condition,
        }
    }

    #[inline]
    pub fn units(&self, nutrient: Nutrient) -> u8 {
        self.applied_units[nutrient.index()]
    }
}

/// Cached value and chosen action of a state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoEntry {
    pub value: f64,
    pub action: ApplicationAction,
}

/// Memo table owned by one optimize call.
#[derive(Debug, Default)]
pub struct MemoTable {
    entries: HashMap<State, MemoEntry>,
}

impl MemoTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, state: &State) -> Option<&MemoEntry> {
        self.entries.get(state)
    }

    #[inline]
    pub fn insert(&mut self, state: State, entry: MemoEntry) {
        self.entries.insert(state, entry);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
