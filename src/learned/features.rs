//! Feature extraction for candidate and historical applications.
//!
//! Every feature is scaled to roughly [0, 1]:
//!
//! | # | Feature | Scaling |
//! |---|---------|---------|
//! | 0 | day of year | / 365 |
//! | 1 | days since planting | / 365 |
//! | 2 | growth stage index | / 7 |
//! | 3 | temperature | (°C + 10) / 50 |
//! | 4 | soil moisture | as is |
//! | 5 | weather condition index | / 4 |
//! | 6-9 | cumulative applied N, P, K, S | / 200 |
//! | 10 | proposed amount | / 200 |
//! | 11 | field slope | / 20 |

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::context::FieldContext;
use crate::models::{
    GrowthStage, HistoricalRecord, Nutrient, OptimizationRequest, WeatherCondition,
    WeatherSnapshot,
};

pub const FEATURE_COUNT: usize = 12;

pub type FeatureVector = [f64; FEATURE_COUNT];

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "day_of_year",
    "days_since_planting",
    "growth_stage",
    "temperature",
    "soil_moisture",
    "weather_condition",
    "cumulative_nitrogen",
    "cumulative_phosphorus",
    "cumulative_potassium",
    "cumulative_sulfur",
    "amount",
    "slope",
];

const AMOUNT_SCALE: f64 = 200.0;
const SLOPE_SCALE: f64 = 20.0;
const FALLBACK_TEMPERATURE_C: f64 = 18.0;

/// Raw inputs of one feature vector.
#[derive(Debug, Clone, Copy)]
pub struct FeatureInputs {
    pub date: NaiveDate,
    pub days_since_planting: i64,
    pub stage: GrowthStage,
    pub temperature_c: f64,
    pub soil_moisture: f64,
    pub condition: WeatherCondition,
    /// Applied so far per nutrient, indexed by [`Nutrient::index`].
    pub cumulative: [f64; 4],
    pub amount: f64,
    pub slope_percent: f64,
}

impl FeatureInputs {
    pub fn to_vector(&self) -> FeatureVector {
        let mut x = [0.0; FEATURE_COUNT];
        x[0] = f64::from(self.date.ordinal()) / 365.0;
        x[1] = self.days_since_planting.clamp(0, 365) as f64 / 365.0;
        x[2] = self.stage.index() as f64 / 7.0;
        x[3] = (self.temperature_c + 10.0) / 50.0;
        x[4] = self.soil_moisture.clamp(0.0, 1.0);
        x[5] = self.condition.index() as f64 / 4.0;
        for (slot, applied) in x[6..10].iter_mut().zip(self.cumulative) {
            *slot = applied.max(0.0) / AMOUNT_SCALE;
        }
        x[10] = self.amount.max(0.0) / AMOUNT_SCALE;
        x[11] = self.slope_percent.max(0.0) / SLOPE_SCALE;
        x
    }
}

/// Features of a candidate application on `day` of the horizon.
pub fn candidate_features(
    ctx: &FieldContext<'_>,
    day: u32,
    amount: f64,
    cumulative: &[f64; 4],
) -> FeatureVector {
    let weather: WeatherSnapshot = ctx.weather_on(day);
    FeatureInputs {
        date: ctx.date_of(day),
        days_since_planting: i64::from(day),
        stage: ctx.stage_on(day),
        temperature_c: weather.temperature_c,
        soil_moisture: weather.soil_moisture,
        condition: weather.condition,
        cumulative: *cumulative,
        amount,
        slope_percent: ctx.request.site.slope_percent,
    }
    .to_vector()
}

/// One supervised example (outcome scaled to [0, 1]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub target: f64,
}

/// Whether a record can be used for training.
pub fn is_usable(record: &HistoricalRecord) -> bool {
    record.amount.is_finite()
        && record.amount >= 0.0
        && record.outcome.is_finite()
        && (0.0..=1.0).contains(&record.soil_moisture)
}

/// Converts history into training samples.
///
/// Cumulative amounts are accumulated per field and season (calendar
/// year) in date order. Days since planting are measured from the
/// request's planting day-of-year. Unusable records are skipped.
pub fn training_samples(
    records: &[HistoricalRecord],
    request: &OptimizationRequest,
) -> Vec<TrainingSample> {
    let mut ordered: Vec<&HistoricalRecord> = records.iter().filter(|r| is_usable(r)).collect();
    ordered.sort_by(|a, b| (&a.field_id, a.date).cmp(&(&b.field_id, b.date)));

    let planting_doy = i64::from(request.planting_date.ordinal());
    let mut applied: BTreeMap<(&str, i32), [f64; 4]> = BTreeMap::new();
    let mut samples = Vec::with_capacity(ordered.len());

    for record in ordered {
        let season = applied
            .entry((record.field_id.as_str(), record.date.year()))
            .or_insert([0.0; 4]);
        let inputs = FeatureInputs {
            date: record.date,
            days_since_planting: i64::from(record.date.ordinal()) - planting_doy,
            stage: record.growth_stage,
            temperature_c: record.temperature_c.unwrap_or(FALLBACK_TEMPERATURE_C),
            soil_moisture: record.soil_moisture,
            condition: record.weather_condition,
            cumulative: *season,
            amount: record.amount,
            slope_percent: request.site.slope_percent,
        };
        samples.push(TrainingSample {
            features: inputs.to_vector(),
            target: (record.outcome / 100.0).clamp(0.0, 1.0),
        });
        season[record.nutrient.index()] += record.amount;
    }
    samples
}

/// Cumulative array with `amount` of `nutrient` added.
pub fn with_applied(cumulative: &[f64; 4], nutrient: Nutrient, amount: f64) -> [f64; 4] {
    let mut next = *cumulative;
    next[nutrient.index()] += amount;
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationMethod;
    use crate::scoring::ScoringParams;
    use crate::scoring::test_support::*;

    #[test]
    fn test_candidate_features_scaled() {
        let request = corn_request(120);
        let weather = season_weather(120);
        let calendar = corn_calendar();
        let params = ScoringParams::default();
        let ctx = FieldContext::new(&request, &weather, &calendar, &params);

        let x = candidate_features(&ctx, 30, 50.0, &[100.0, 0.0, 0.0, 0.0]);
        assert_eq!(x.len(), FEATURE_NAMES.len());
        assert!((x[1] - 30.0 / 365.0).abs() < 1e-12);
        assert!((x[2] - 2.0 / 7.0).abs() < 1e-12);
        assert!((x[6] - 0.5).abs() < 1e-12);
        assert!((x[10] - 0.25).abs() < 1e-12);
        assert!((x[11] - 0.1).abs() < 1e-12);
        for v in x {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_training_samples_accumulate_per_season() {
        let request = corn_request(120);
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        let records = vec![
            HistoricalRecord::new("f", d(6, 1), Nutrient::Nitrogen, 60.0, ApplicationMethod::Banded)
                .with_outcome(70.0, 40.0),
            HistoricalRecord::new("f", d(5, 1), Nutrient::Nitrogen, 80.0, ApplicationMethod::Banded)
                .with_outcome(60.0, 50.0),
            HistoricalRecord::new("f", d(5, 2), Nutrient::Nitrogen, f64::NAN, ApplicationMethod::Banded),
        ];
        let samples = training_samples(&records, &request);
        assert_eq!(samples.len(), 2);
        // date order: May first with nothing applied before it
        assert_eq!(samples[0].features[6], 0.0);
        assert!((samples[0].target - 0.6).abs() < 1e-12);
        assert!((samples[1].features[6] - 0.4).abs() < 1e-12);
    }
}
