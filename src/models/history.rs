//! Historical application/outcome records used to train the learned predictor.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ApplicationMethod, GrowthStage, Nutrient, WeatherCondition};

/// One past application and its observed outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalRecord {
    pub field_id: String,
    pub date: NaiveDate,
    pub nutrient: Nutrient,
    /// Applied amount (lbs/acre).
    pub amount: f64,
    pub method: ApplicationMethod,
    pub weather_condition: WeatherCondition,
    pub growth_stage: GrowthStage,
    /// Soil moisture at application (0..=1).
    pub soil_moisture: f64,
    /// Air temperature at application (°C), when recorded.
    #[serde(default)]
    pub temperature_c: Option<f64>,
    /// Observed outcome score (0..=100, higher = better response).
    pub outcome: f64,
    /// Cost incurred ($/acre).
    pub cost: f64,
}

impl HistoricalRecord {
    /// Creates a record with a neutral outcome and no cost.
    pub fn new(
        field_id: impl Into<String>,
        date: NaiveDate,
        nutrient: Nutrient,
        amount: f64,
        method: ApplicationMethod,
    ) -> Self {
        Self {
            field_id: field_id.into(),
            date,
            nutrient,
            amount,
            method,
            weather_condition: WeatherCondition::Fair,
            growth_stage: GrowthStage::Planting,
            soil_moisture: 0.6,
            temperature_c: None,
            outcome: 50.0,
            cost: 0.0,
        }
    }

    pub fn with_conditions(
        mut self,
        weather: WeatherCondition,
        stage: GrowthStage,
        soil_moisture: f64,
    ) -> Self {
        self.weather_condition = weather;
        self.growth_stage = stage;
        self.soil_moisture = soil_moisture;
        self
    }

    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature_c = Some(celsius);
        self
    }

    pub fn with_outcome(mut self, outcome: f64, cost: f64) -> Self {
        self.outcome = outcome;
        self.cost = cost;
        self
    }
}
