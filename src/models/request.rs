//! Optimization request model.
//!
//! A request describes one field and one crop season: what must be
//! applied (nutrient requirements), how it may be applied (methods),
//! when (planting date + horizon) and under which constraints (budget,
//! risk tolerance, split permission).

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{ApplicationMethod, Nutrient};

/// Soil and location descriptors of a field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteProfile {
    /// Latitude (degrees, -90..=90).
    pub latitude: f64,
    /// Longitude (degrees, -180..=180).
    pub longitude: f64,
    /// Field slope (percent, 0..=100).
    pub slope_percent: f64,
    /// Soil organic matter (percent, 0..=100).
    pub organic_matter_percent: f64,
    /// Clay content (percent, 0..=100).
    pub clay_percent: f64,
    /// Free-form soil texture class (e.g. "silt loam").
    pub soil_texture: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            latitude: 41.6,
            longitude: -93.6,
            slope_percent: 2.0,
            organic_matter_percent: 3.0,
            clay_percent: 25.0,
            soil_texture: "silt loam".into(),
        }
    }
}

impl SiteProfile {
    /// Sets the location.
    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    /// Sets the slope (percent).
    pub fn with_slope(mut self, slope_percent: f64) -> Self {
        self.slope_percent = slope_percent;
        self
    }

    /// Sets organic matter (percent).
    pub fn with_organic_matter(mut self, percent: f64) -> Self {
        self.organic_matter_percent = percent;
        self
    }

    /// Sets the texture class.
    pub fn with_texture(mut self, texture: impl Into<String>) -> Self {
        self.soil_texture = texture.into();
        self
    }
}

/// A fertilizer timing optimization request.
///
/// # Invariants (checked by [`validate_request`](crate::validation::validate_request))
/// - At least one nutrient requirement; all amounts ≥ 0.
/// - At least one allowed application method.
/// - `risk_tolerance` in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Field identifier.
    pub field_id: String,
    /// Crop identifier (e.g. "corn").
    pub crop: String,
    /// Planting date (day 0 of the horizon).
    pub planting_date: NaiveDate,
    /// Length of the optimization horizon (days).
    pub horizon_days: u32,
    /// Required amount per nutrient (lbs/acre).
    pub requirements: BTreeMap<Nutrient, f64>,
    /// Allowed application methods.
    pub methods: BTreeSet<ApplicationMethod>,
    /// Soil and location descriptors.
    pub site: SiteProfile,
    /// Optional spending ceiling ($/acre).
    pub budget: Option<f64>,
    /// Tolerance for outcome variability (0 = averse, 1 = neutral).
    pub risk_tolerance: f64,
    /// Whether a nutrient may be applied on several dates.
    pub allow_split: bool,
}

impl OptimizationRequest {
    /// Creates a request with no requirements and broadcast application.
    pub fn new(
        field_id: impl Into<String>,
        crop: impl Into<String>,
        planting_date: NaiveDate,
        horizon_days: u32,
    ) -> Self {
        Self {
            field_id: field_id.into(),
            crop: crop.into(),
            planting_date,
            horizon_days,
            requirements: BTreeMap::new(),
            methods: BTreeSet::from([ApplicationMethod::Broadcast]),
            site: SiteProfile::default(),
            budget: None,
            risk_tolerance: 0.5,
            allow_split: true,
        }
    }

    /// Adds a nutrient requirement (lbs/acre).
    pub fn with_requirement(mut self, nutrient: Nutrient, amount: f64) -> Self {
        self.requirements.insert(nutrient, amount);
        self
    }

    /// Replaces the allowed methods.
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = ApplicationMethod>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Sets the site profile.
    pub fn with_site(mut self, site: SiteProfile) -> Self {
        self.site = site;
        self
    }

    /// Sets the budget ceiling ($/acre).
    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Sets the risk tolerance.
    pub fn with_risk_tolerance(mut self, tolerance: f64) -> Self {
        self.risk_tolerance = tolerance;
        self
    }

    /// Enables or disables split applications.
    pub fn with_split(mut self, allow: bool) -> Self {
        self.allow_split = allow;
        self
    }

    /// Last date of the horizon (inclusive).
    pub fn end_date(&self) -> NaiveDate {
        self.planting_date + Duration::days(i64::from(self.horizon_days))
    }

    /// Whether a date lies within `[planting_date, end_date]`.
    pub fn in_horizon(&self, date: NaiveDate) -> bool {
        date >= self.planting_date && date <= self.end_date()
    }

    /// Nutrients with a strictly positive requirement, in canonical order.
    pub fn active_nutrients(&self) -> Vec<Nutrient> {
        self.requirements
            .iter()
            .filter(|(_, &amount)| amount > 0.0)
            .map(|(&n, _)| n)
            .collect()
    }

    /// Requirement for a nutrient (0 if absent).
    pub fn requirement(&self, nutrient: Nutrient) -> f64 {
        self.requirements.get(&nutrient).copied().unwrap_or(0.0)
    }

    /// Sum of all requirements (lbs/acre).
    pub fn total_requirement(&self) -> f64 {
        self.requirements.values().sum()
    }

    /// Allowed methods as a vector (canonical order).
    pub fn method_list(&self) -> Vec<ApplicationMethod> {
        self.methods.iter().copied().collect()
    }

    /// Risk aversion (`1 - risk_tolerance`, clamped).
    pub fn risk_aversion(&self) -> f64 {
        (1.0 - self.risk_tolerance).clamp(0.0, 1.0)
    }
}
