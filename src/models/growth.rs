//! Growth stages and the growth-stage calendar.
//!
//! The calendar is an ordered mapping from transition date to the stage
//! entered on that date. A date before the first transition is treated
//! as [`GrowthStage::Planting`].

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered crop development phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Planting,
    Emergence,
    EarlyVegetative,
    LateVegetative,
    Flowering,
    GrainFill,
    Maturity,
    Harvest,
}

impl GrowthStage {
    /// All stages in developmental order.
    pub const ALL: [GrowthStage; 8] = [
        GrowthStage::Planting,
        GrowthStage::Emergence,
        GrowthStage::EarlyVegetative,
        GrowthStage::LateVegetative,
        GrowthStage::Flowering,
        GrowthStage::GrainFill,
        GrowthStage::Maturity,
        GrowthStage::Harvest,
    ];

    /// Ordinal index (0 = planting).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            GrowthStage::Planting => 0,
            GrowthStage::Emergence => 1,
            GrowthStage::EarlyVegetative => 2,
            GrowthStage::LateVegetative => 3,
            GrowthStage::Flowering => 4,
            GrowthStage::GrainFill => 5,
            GrowthStage::Maturity => 6,
            GrowthStage::Harvest => 7,
        }
    }

    #[inline]
    pub fn is_vegetative(self) -> bool {
        matches!(self, GrowthStage::EarlyVegetative | GrowthStage::LateVegetative)
    }

    #[inline]
    pub fn is_reproductive(self) -> bool {
        matches!(self, GrowthStage::Flowering | GrowthStage::GrainFill)
    }
}

/// Date → stage calendar, monotonically increasing in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GrowthStageCalendar {
    /// Transition date → stage entered on that date.
    pub transitions: BTreeMap<NaiveDate, GrowthStage>,
}

impl GrowthStageCalendar {
    /// Creates an empty calendar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage transition.
    pub fn with_stage(mut self, date: NaiveDate, stage: GrowthStage) -> Self {
        self.transitions.insert(date, stage);
        self
    }

    /// Builds a calendar from day offsets relative to a planting date.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use u_fertilize::models::{GrowthStage, GrowthStageCalendar};
    ///
    /// let planting = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();
    /// let cal = GrowthStageCalendar::from_offsets(
    ///     planting,
    ///     &[(0, GrowthStage::Planting), (10, GrowthStage::Emergence)],
    /// );
    /// assert_eq!(cal.stage_on(planting), GrowthStage::Planting);
    /// ```
    pub fn from_offsets(planting_date: NaiveDate, offsets: &[(i64, GrowthStage)]) -> Self {
        let transitions = offsets
            .iter()
            .map(|&(days, stage)| (planting_date + Duration::days(days), stage))
            .collect();
        Self { transitions }
    }

    /// Stage in effect on a date.
    pub fn stage_on(&self, date: NaiveDate) -> GrowthStage {
        self.transitions
            .range(..=date)
            .next_back()
            .map(|(_, &stage)| stage)
            .unwrap_or(GrowthStage::Planting)
    }

    /// First date on which a stage is entered.
    pub fn start_of(&self, stage: GrowthStage) -> Option<NaiveDate> {
        self.transitions
            .iter()
            .find(|(_, &s)| s == stage)
            .map(|(&d, _)| d)
    }

    /// Whether stages never go backwards as dates advance.
    pub fn is_monotonic(&self) -> bool {
        self.transitions
            .values()
            .zip(self.transitions.values().skip(1))
            .all(|(a, b)| a <= b)
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Returns a copy with each transition shifted by a per-transition delay.
    ///
    /// `delays[i]` applies to the i-th transition (missing entries = 0).
    /// Dates are forced to stay strictly increasing so the shifted calendar
    /// remains monotonic.
    pub fn with_delays(&self, delays: &[i64]) -> Self {
        let mut transitions = BTreeMap::new();
        let mut last: Option<NaiveDate> = None;
        for (i, (&date, &stage)) in self.transitions.iter().enumerate() {
            let delay = delays.get(i).copied().unwrap_or(0);
            let mut shifted = date + Duration::days(delay);
            if let Some(prev) = last {
                if shifted <= prev {
                    shifted = prev + Duration::days(1);
                }
            }
            transitions.insert(shifted, stage);
            last = Some(shifted);
        }
        Self { transitions }
    }
}
