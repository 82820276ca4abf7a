//! Heuristic scoring constants.
//!
//! Prices, method factors, weather multipliers and stage-alignment curves
//! are illustrative defaults, not calibrated agronomy. They are kept as
//! configuration so a deployment can substitute its own numbers.

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::models::{ApplicationMethod, GrowthStage, Nutrient, WeatherCondition};

/// A value per nutrient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientTable<T> {
    pub nitrogen: T,
    pub phosphorus: T,
    pub potassium: T,
    pub sulfur: T,
}

impl<T: Copy> NutrientTable<T> {
    #[inline]
    pub fn get(&self, nutrient: Nutrient) -> T {
        match nutrient {
            Nutrient::Nitrogen => self.nitrogen,
            Nutrient::Phosphorus => self.phosphorus,
            Nutrient::Potassium => self.potassium,
            Nutrient::Sulfur => self.sulfur,
        }
    }
}

/// A value per application method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodTable<T> {
    pub broadcast: T,
    pub banded: T,
    pub injection: T,
    pub fertigation: T,
    pub foliar: T,
}

impl<T: Copy> MethodTable<T> {
    #[inline]
    pub fn get(&self, method: ApplicationMethod) -> T {
        match method {
            ApplicationMethod::Broadcast => self.broadcast,
            ApplicationMethod::Banded => self.banded,
            ApplicationMethod::Injection => self.injection,
            ApplicationMethod::Fertigation => self.fertigation,
            ApplicationMethod::Foliar => self.foliar,
        }
    }
}

/// All constants used by the sub-score functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    /// Product price ($/lb).
    pub price_per_lb: NutrientTable<f64>,
    /// Fixed pass cost per application ($/acre).
    pub method_cost_per_acre: MethodTable<f64>,
    /// Fraction of applied nutrient reaching the crop.
    pub method_efficiency: MethodTable<f64>,
    /// Environmental factor of each method (1 = no loss pathway).
    pub method_environment: MethodTable<f64>,
    /// Yield multiplier per weather condition, worst first.
    pub weather_yield_multiplier: [f64; 5],
    /// Environmental factor per weather condition, worst first.
    pub weather_environment_factor: [f64; 5],
    /// Uptake alignment of each nutrient per growth stage (0..=1).
    pub stage_alignment: NutrientTable<[f64; 8]>,
    /// Soil moisture with the best response.
    pub optimal_soil_moisture: f64,
    /// Distance from the optimum at which the moisture penalty saturates.
    pub soil_moisture_tolerance: f64,
    /// Environmental penalty per percent slope.
    pub slope_penalty_per_percent: f64,
    /// Cap on the slope penalty.
    pub max_slope_penalty: f64,
    /// Bonus on the environmental score when soil moisture is near optimal.
    pub ideal_moisture_bonus: f64,
    /// Risk bonus for splitting a nutrient over several dates.
    pub split_bonus: f64,
    /// Decay scale (days after planting) of the early-timing risk bonus.
    pub earliness_scale_days: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            price_per_lb: NutrientTable {
                nitrogen: 0.55,
                phosphorus: 0.65,
                potassium: 0.45,
                sulfur: 0.40,
            },
            method_cost_per_acre: MethodTable {
                broadcast: 8.0,
                banded: 12.0,
                injection: 18.0,
                fertigation: 6.0,
                foliar: 10.0,
            },
            method_efficiency: MethodTable {
                broadcast: 0.80,
                banded: 0.90,
                injection: 0.95,
                fertigation: 0.92,
                foliar: 0.70,
            },
            method_environment: MethodTable {
                broadcast: 0.70,
                banded: 0.85,
                injection: 0.95,
                fertigation: 0.90,
                foliar: 0.85,
            },
            weather_yield_multiplier: [0.0, 0.6, 0.8, 0.95, 1.0],
            weather_environment_factor: [0.0, 0.4, 0.7, 0.9, 1.0],
            stage_alignment: NutrientTable {
                nitrogen: [0.55, 0.65, 1.0, 0.95, 0.6, 0.35, 0.1, 0.0],
                phosphorus: [1.0, 0.9, 0.7, 0.5, 0.3, 0.2, 0.05, 0.0],
                potassium: [1.0, 0.9, 0.75, 0.6, 0.4, 0.2, 0.05, 0.0],
                sulfur: [0.6, 0.7, 0.95, 0.9, 0.6, 0.3, 0.1, 0.0],
            },
            optimal_soil_moisture: 0.6,
            soil_moisture_tolerance: 0.4,
            slope_penalty_per_percent: 0.02,
            max_slope_penalty: 0.5,
            ideal_moisture_bonus: 5.0,
            split_bonus: 10.0,
            earliness_scale_days: 90.0,
        }
    }
}

impl ScoringParams {
    /// Uptake alignment of a nutrient at a stage.
    #[inline]
    pub fn alignment(&self, nutrient: Nutrient, stage: GrowthStage) -> f64 {
        self.stage_alignment.get(nutrient)[stage.index()]
    }

    #[inline]
    pub fn weather_yield(&self, condition: WeatherCondition) -> f64 {
        self.weather_yield_multiplier[condition.index()]
    }

    #[inline]
    pub fn weather_environment(&self, condition: WeatherCondition) -> f64 {
        self.weather_environment_factor[condition.index()]
    }

    /// Cheapest pass cost among `methods` (0 if empty).
    pub fn cheapest_method_cost<'a>(
        &self,
        methods: impl IntoIterator<Item = &'a ApplicationMethod>,
    ) -> f64 {
        methods
            .into_iter()
            .map(|&m| self.method_cost_per_acre.get(m))
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))))
            .unwrap_or(0.0)
    }

    /// Checks that factors are in range and costs are non-negative.
    pub fn validate(&self) -> Result<()> {
        let mut unit_values: Vec<f64> = Vec::new();
        unit_values.extend(self.weather_yield_multiplier);
        unit_values.extend(self.weather_environment_factor);
        for n in Nutrient::ALL {
            unit_values.extend(self.stage_alignment.get(n));
        }
        for m in ApplicationMethod::ALL {
            unit_values.push(self.method_efficiency.get(m));
            unit_values.push(self.method_environment.get(m));
        }
        if !unit_values.iter().all(|v| (0.0..=1.0).contains(v)) {
            return Err(OptimizerError::InvalidConfig(
                "scoring factors must lie in [0, 1]".into(),
            ));
        }
        let costs_ok = Nutrient::ALL.iter().all(|&n| self.price_per_lb.get(n) >= 0.0)
            && ApplicationMethod::ALL
                .iter()
                .all(|&m| self.method_cost_per_acre.get(m) >= 0.0);
        if !costs_ok {
            return Err(OptimizerError::InvalidConfig(
                "prices and method costs must be non-negative".into(),
            ));
        }
        if self.soil_moisture_tolerance <= 0.0 || self.earliness_scale_days <= 0.0 {
            return Err(OptimizerError::InvalidConfig(
                "moisture tolerance and earliness scale must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ScoringParams::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_factor_rejected() {
        let mut p = ScoringParams::default();
        p.weather_yield_multiplier[4] = 1.5;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_nitrogen_peaks_in_vegetative_stages() {
        let p = ScoringParams::default();
        let veg = p.alignment(Nutrient::Nitrogen, GrowthStage::EarlyVegetative);
        assert!(veg > p.alignment(Nutrient::Nitrogen, GrowthStage::Planting));
        assert!(veg > p.alignment(Nutrient::Nitrogen, GrowthStage::GrainFill));
    }

    #[test]
    fn test_cheapest_method() {
        let p = ScoringParams::default();
        let methods = [ApplicationMethod::Injection, ApplicationMethod::Banded];
        assert_eq!(p.cheapest_method_cost(methods.iter()), 12.0);
        assert_eq!(p.cheapest_method_cost([].iter()), 0.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let p: ScoringParams = serde_json::from_str(r#"{"split_bonus": 4.0}"#).unwrap();
        assert_eq!(p.split_bonus, 4.0);
        assert_eq!(p.optimal_soil_moisture, 0.6);
    }
}
