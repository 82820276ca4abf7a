//! Weather window model.
//!
//! Weather windows are produced by an external forecasting collaborator
//! and are read-only to the optimizers. Each window covers an inclusive
//! date range and carries a categorical suitability rating plus the
//! continuous covariates it was derived from.
//!
//! # Bounds
//!
//! | Covariate | Unit | Range |
//! |-----------|------|-------|
//! | temperature | °C | -40..=50 |
//! | precipitation probability | fraction | 0..=1 |
//! | wind speed | km/h | 0..=150 |
//! | soil moisture | fraction of field capacity | 0..=1 |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Temperature bounds (°C).
pub const TEMPERATURE_RANGE: (f64, f64) = (-40.0, 50.0);
/// Wind speed bounds (km/h).
pub const WIND_RANGE: (f64, f64) = (0.0, 150.0);

/// Five-level ordinal suitability scale (worst → best).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    /// No application possible (storm, frozen or saturated ground).
    Unsuitable,
    /// High loss risk.
    Poor,
    /// Acceptable.
    Fair,
    /// Favourable.
    Good,
    /// Ideal.
    Excellent,
}

impl WeatherCondition {
    /// All conditions, worst first.
    pub const ALL: [WeatherCondition; 5] = [
        WeatherCondition::Unsuitable,
        WeatherCondition::Poor,
        WeatherCondition::Fair,
        WeatherCondition::Good,
        WeatherCondition::Excellent,
    ];

    /// Ordinal index (0 = worst, 4 = best).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            WeatherCondition::Unsuitable => 0,
            WeatherCondition::Poor => 1,
            WeatherCondition::Fair => 2,
            WeatherCondition::Good => 3,
            WeatherCondition::Excellent => 4,
        }
    }

    /// Condition from an ordinal index (clamped to 0..=4).
    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.clamp(0, 4) as usize]
    }

    /// Moves the condition by `levels` steps (negative = worse).
    pub fn shifted(self, levels: i64) -> Self {
        Self::from_index(self.index() as i64 + levels)
    }

    /// Whether any application is allowed under this condition.
    #[inline]
    pub fn permits_application(self) -> bool {
        self != WeatherCondition::Unsuitable
    }

    /// Good or Excellent.
    #[inline]
    pub fn is_favorable(self) -> bool {
        self >= WeatherCondition::Good
    }
}

/// Point-in-time weather for one day, copied out of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub condition: WeatherCondition,
    pub temperature_c: f64,
    pub precipitation_probability: f64,
    pub wind_speed_kmh: f64,
    pub soil_moisture: f64,
    pub suitability: f64,
}

impl WeatherSnapshot {
    /// Assumed conditions for days no window covers.
    pub fn neutral() -> Self {
        let mut snapshot = Self {
            condition: WeatherCondition::Fair,
            temperature_c: 18.0,
            precipitation_probability: 0.3,
            wind_speed_kmh: 10.0,
            soil_moisture: 0.6,
            suitability: 0.0,
        };
        snapshot.suitability = derive_suitability(
            snapshot.condition,
            snapshot.temperature_c,
            snapshot.precipitation_probability,
            snapshot.wind_speed_kmh,
            snapshot.soil_moisture,
        );
        snapshot
    }
}

/// A date-bounded weather summary with a suitability rating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherWindow {
    /// First day covered (inclusive).
    pub start: NaiveDate,
    /// Last day covered (inclusive).
    pub end: NaiveDate,
    /// Categorical suitability.
    pub condition: WeatherCondition,
    /// Mean air temperature (°C).
    pub temperature_c: f64,
    /// Probability of precipitation (0..=1).
    pub precipitation_probability: f64,
    /// Mean wind speed (km/h).
    pub wind_speed_kmh: f64,
    /// Soil moisture (fraction of field capacity, 0..=1).
    pub soil_moisture: f64,
    /// Derived suitability score (0..=1).
    pub suitability_score: f64,
}

impl WeatherWindow {
    /// Creates a window with neutral covariates and a derived score.
    pub fn new(start: NaiveDate, end: NaiveDate, condition: WeatherCondition) -> Self {
        let neutral = WeatherSnapshot::neutral();
        let mut window = Self {
            start,
            end,
            condition,
            temperature_c: neutral.temperature_c,
            precipitation_probability: neutral.precipitation_probability,
            wind_speed_kmh: neutral.wind_speed_kmh,
            soil_moisture: neutral.soil_moisture,
            suitability_score: 0.0,
        };
        window.rederive_score();
        window
    }

    /// Sets temperature (°C, clamped).
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature_c = celsius.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        self.rederive_score();
        self
    }

    /// Sets precipitation probability (clamped to 0..=1).
    pub fn with_precipitation(mut self, probability: f64) -> Self {
        self.precipitation_probability = probability.clamp(0.0, 1.0);
        self.rederive_score();
        self
    }

    /// Sets wind speed (km/h, clamped).
    pub fn with_wind(mut self, kmh: f64) -> Self {
        self.wind_speed_kmh = kmh.clamp(WIND_RANGE.0, WIND_RANGE.1);
        self.rederive_score();
        self
    }

    /// Sets soil moisture (clamped to 0..=1).
    pub fn with_soil_moisture(mut self, moisture: f64) -> Self {
        self.soil_moisture = moisture.clamp(0.0, 1.0);
        self.rederive_score();
        self
    }

    /// Whether the window covers a date.
    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of days covered.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Copies the window's values into a single-day snapshot.
    pub fn snapshot(&self) -> WeatherSnapshot {
        WeatherSnapshot {
            condition: self.condition,
            temperature_c: self.temperature_c,
            precipitation_probability: self.precipitation_probability,
            wind_speed_kmh: self.wind_speed_kmh,
            soil_moisture: self.soil_moisture,
            suitability: self.suitability_score,
        }
    }

    /// Recomputes `suitability_score` from the current values.
    pub fn rederive_score(&mut self) {
        self.suitability_score = derive_suitability(
            self.condition,
            self.temperature_c,
            self.precipitation_probability,
            self.wind_speed_kmh,
            self.soil_moisture,
        );
    }
}

/// Derives a [0, 1] suitability score from condition and covariates.
///
/// Weighted blend: condition 40%, precipitation 20%, temperature 15%,
/// soil moisture 15%, wind 10%.
pub fn derive_suitability(
    condition: WeatherCondition,
    temperature_c: f64,
    precipitation_probability: f64,
    wind_speed_kmh: f64,
    soil_moisture: f64,
) -> f64 {
    let base = condition.index() as f64 / 4.0;
    let temp_dev = if temperature_c < 10.0 {
        10.0 - temperature_c
    } else if temperature_c > 30.0 {
        temperature_c - 30.0
    } else {
        0.0
    };
    let temp = 1.0 - (temp_dev / 20.0).min(1.0);
    let precip = 1.0 - precipitation_probability.clamp(0.0, 1.0);
    let wind = 1.0 - (wind_speed_kmh / 40.0).clamp(0.0, 1.0);
    let moisture = 1.0 - ((soil_moisture - 0.6).abs() / 0.6).min(1.0);

    (0.40 * base + 0.20 * precip + 0.15 * temp + 0.15 * moisture + 0.10 * wind).clamp(0.0, 1.0)
}
