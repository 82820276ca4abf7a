//! Input validation for fertilizer optimization problems.
//!
//! Checks the request, weather windows and growth calendar before any
//! optimizer runs. Every problem found is reported, not just the first.
//! Detects:
//! - Empty or negative nutrient requirements
//! - Missing application methods
//! - Out-of-range location, soil percentages, risk tolerance, budget
//! - Malformed weather windows (reversed ranges, out-of-bounds covariates)
//! - Non-monotonic growth calendars

use crate::models::{
    GrowthStageCalendar, OptimizationRequest, TEMPERATURE_RANGE, WIND_RANGE, WeatherWindow,
};

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// No nutrient requirement given.
    EmptyRequirements,
    /// A requirement is negative or not finite.
    InvalidAmount,
    /// The allowed-method set is empty.
    NoApplicationMethods,
    /// Horizon of zero days.
    EmptyHorizon,
    /// Risk tolerance outside [0, 1].
    RiskToleranceOutOfRange,
    /// Budget not positive.
    InvalidBudget,
    /// Latitude/longitude out of range.
    InvalidLocation,
    /// Slope / organic matter / clay percentage outside [0, 100].
    InvalidPercentage,
    /// Weather window is malformed.
    InvalidWeatherWindow,
    /// Growth calendar is empty or goes backwards.
    InvalidGrowthCalendar,
}

impl ValidationError {
    pub(crate) fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validates an optimization request.
///
/// Checks:
/// 1. At least one nutrient requirement
/// 2. All requirements finite and ≥ 0
/// 3. At least one application method
/// 4. Horizon > 0 days
/// 5. Risk tolerance in [0, 1]
/// 6. Budget > 0 when present
/// 7. Latitude in [-90, 90], longitude in [-180, 180]
/// 8. Slope, organic matter and clay in [0, 100]
pub fn validate_request(request: &OptimizationRequest) -> ValidationResult {
    let mut errors = Vec::new();

    if request.requirements.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::EmptyRequirements,
            "Request has no nutrient requirements",
        ));
    }

    for (nutrient, &amount) in &request.requirements {
        if !amount.is_finite() || amount < 0.0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidAmount,
                format!("Requirement for {nutrient} must be a non-negative number, got {amount}"),
            ));
        }
    }

    if request.methods.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::NoApplicationMethods,
            "Request allows no application methods",
        ));
    }

    if request.horizon_days == 0 {
        errors.push(ValidationError::new(
            ValidationErrorKind::EmptyHorizon,
            "Optimization horizon must be at least one day",
        ));
    }

    if !(0.0..=1.0).contains(&request.risk_tolerance) {
        errors.push(ValidationError::new(
            ValidationErrorKind::RiskToleranceOutOfRange,
            format!("Risk tolerance {} outside [0, 1]", request.risk_tolerance),
        ));
    }

    if let Some(budget) = request.budget {
        if !budget.is_finite() || budget <= 0.0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidBudget,
                format!("Budget must be positive, got {budget}"),
            ));
        }
    }

    let site = &request.site;
    if !(-90.0..=90.0).contains(&site.latitude) || !(-180.0..=180.0).contains(&site.longitude) {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidLocation,
            format!(
                "Location ({}, {}) is out of range",
                site.latitude, site.longitude
            ),
        ));
    }

    for (label, value) in [
        ("slope", site.slope_percent),
        ("organic matter", site.organic_matter_percent),
        ("clay", site.clay_percent),
    ] {
        if !(0.0..=100.0).contains(&value) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidPercentage,
                format!("Site {label} percentage {value} outside [0, 100]"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validates weather windows.
///
/// An empty list is valid (every day is then assumed neutral).
pub fn validate_weather(windows: &[WeatherWindow]) -> ValidationResult {
    let mut errors = Vec::new();

    for (i, w) in windows.iter().enumerate() {
        if w.end < w.start {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidWeatherWindow,
                format!("Weather window {i} ends ({}) before it starts ({})", w.end, w.start),
            ));
        }
        let checks = [
            (
                "temperature",
                w.temperature_c,
                TEMPERATURE_RANGE.0,
                TEMPERATURE_RANGE.1,
            ),
            (
                "precipitation probability",
                w.precipitation_probability,
                0.0,
                1.0,
            ),
            ("wind speed", w.wind_speed_kmh, WIND_RANGE.0, WIND_RANGE.1),
            ("soil moisture", w.soil_moisture, 0.0, 1.0),
            ("suitability score", w.suitability_score, 0.0, 1.0),
        ];
        for (label, value, lo, hi) in checks {
            if !(lo..=hi).contains(&value) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidWeatherWindow,
                    format!("Weather window {i} {label} {value} outside [{lo}, {hi}]"),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validates a growth-stage calendar: non-empty and monotonic.
pub fn validate_calendar(calendar: &GrowthStageCalendar) -> ValidationResult {
    let mut errors = Vec::new();

    if calendar.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidGrowthCalendar,
            "Growth calendar has no stages",
        ));
    } else if !calendar.is_monotonic() {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidGrowthCalendar,
            "Growth calendar stages go backwards in time",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validates all optimizer inputs together, collecting every error.
pub fn validate_inputs(
    request: &OptimizationRequest,
    windows: &[WeatherWindow],
    calendar: &GrowthStageCalendar,
) -> ValidationResult {
    let mut errors = Vec::new();
    for result in [
        validate_request(request),
        validate_weather(windows),
        validate_calendar(calendar),
    ] {
        if let Err(mut e) = result {
            errors.append(&mut e);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GrowthStage, Nutrient, SiteProfile, WeatherCondition};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn planting() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 20).unwrap()
    }

    fn valid_request() -> OptimizationRequest {
        OptimizationRequest::new("F1", "corn", planting(), 120)
            .with_requirement(Nutrient::Nitrogen, 150.0)
    }

    fn calendar() -> GrowthStageCalendar {
        GrowthStageCalendar::from_offsets(
            planting(),
            &[(0, GrowthStage::Planting), (10, GrowthStage::Emergence)],
        )
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_request(&valid_request()).is_ok());
        assert!(validate_inputs(&valid_request(), &[], &calendar()).is_ok());
    }

    #[test]
    fn test_empty_requirements() {
        let req = OptimizationRequest::new("F1", "corn", planting(), 120);
        let errors = validate_request(&req).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::EmptyRequirements));
    }

    #[test]
    fn test_negative_amount() {
        let req = valid_request().with_requirement(Nutrient::Potassium, -5.0);
        let errors = validate_request(&req).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::InvalidAmount && e.message.contains("potassium")));
    }

    #[test]
    fn test_zero_amount_is_allowed() {
        let req = valid_request().with_requirement(Nutrient::Sulfur, 0.0);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_no_methods() {
        let mut req = valid_request();
        req.methods = BTreeSet::new();
        let errors = validate_request(&req).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::NoApplicationMethods));
    }

    #[test]
    fn test_out_of_range_values() {
        let req = valid_request()
            .with_risk_tolerance(1.5)
            .with_budget(0.0)
            .with_site(SiteProfile::default().with_location(95.0, 0.0).with_slope(140.0));
        let errors = validate_request(&req).unwrap_err();
        let kinds: Vec<_> = errors.iter().map(|e| e.kind.clone()).collect();
        assert!(kinds.contains(&ValidationErrorKind::RiskToleranceOutOfRange));
        assert!(kinds.contains(&ValidationErrorKind::InvalidBudget));
        assert!(kinds.contains(&ValidationErrorKind::InvalidLocation));
        assert!(kinds.contains(&ValidationErrorKind::InvalidPercentage));
    }

    #[test]
    fn test_reversed_weather_window() {
        let mut w = WeatherWindow::new(planting(), planting(), WeatherCondition::Good);
        w.end = planting() - chrono::Duration::days(2);
        let errors = validate_weather(&[w]).unwrap_err();
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidWeatherWindow);
    }

    #[test]
    fn test_weather_covariate_bounds() {
        let mut w = WeatherWindow::new(planting(), planting(), WeatherCondition::Good);
        w.precipitation_probability = 1.4;
        w.soil_moisture = -0.1;
        let errors = validate_weather(&[w]).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_calendar_checks() {
        assert!(validate_calendar(&GrowthStageCalendar::new()).is_err());
        let backwards = GrowthStageCalendar::from_offsets(
            planting(),
            &[(0, GrowthStage::Flowering), (10, GrowthStage::Emergence)],
        );
        assert!(validate_calendar(&backwards).is_err());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let req = OptimizationRequest::new("F1", "corn", planting(), 0).with_risk_tolerance(-1.0);
        let errors = validate_inputs(&req, &[], &GrowthStageCalendar::new()).unwrap_err();
        assert!(errors.len() >= 4);
    }
}
