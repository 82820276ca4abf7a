//! Monte Carlo scenario generation.
//!
//! A scenario perturbs the deterministic inputs:
//!
//! - **Weather**: Gaussian noise on temperature, precipitation, wind and
//!   soil moisture, growing linearly with the window's distance from
//!   planting (`1 + days / horizon_growth_days`). The categorical
//!   condition moves one level per `condition_step` change in the
//!   derived suitability score.
//! - **Growth**: each stage transition is delayed by a uniform integer
//!   in `[-max_stage_delay_days, max_stage_delay_days]`.
//! - **Yield response / prices**: multipliers drawn from clamped normals.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::models::{GrowthStageCalendar, OptimizationRequest, WeatherWindow};

/// Noise magnitudes of scenario generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioNoise {
    /// Temperature σ at planting (°C).
    pub temperature_std: f64,
    /// Precipitation-probability σ at planting.
    pub precipitation_std: f64,
    /// Wind σ at planting (km/h).
    pub wind_std: f64,
    /// Soil-moisture σ at planting.
    pub moisture_std: f64,
    /// Days over which weather noise grows by 100%.
    pub horizon_growth_days: f64,
    /// Suitability change that moves the condition one level.
    pub condition_step: f64,
    pub max_stage_delay_days: i64,
    pub yield_std: f64,
    pub yield_bounds: (f64, f64),
    pub cost_std: f64,
    pub cost_bounds: (f64, f64),
}

impl Default for ScenarioNoise {
    fn default() -> Self {
        Self {
            temperature_std: 2.0,
            precipitation_std: 0.10,
            wind_std: 3.0,
            moisture_std: 0.05,
            horizon_growth_days: 30.0,
            condition_step: 0.10,
            max_stage_delay_days: 5,
            yield_std: 0.10,
            yield_bounds: (0.7, 1.3),
            cost_std: 0.08,
            cost_bounds: (0.8, 1.2),
        }
    }
}

/// Scales applied to one uncertainty source (1.0 = nominal).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseScale {
    pub weather: f64,
    pub growth: f64,
    pub yield_response: f64,
}

impl Default for NoiseScale {
    fn default() -> Self {
        Self {
            weather: 1.0,
            growth: 1.0,
            yield_response: 1.0,
        }
    }
}

/// One Monte Carlo draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub weather: Vec<WeatherWindow>,
    /// Delay (days) per growth-stage transition, in calendar order.
    pub stage_delays: Vec<i64>,
    pub yield_multiplier: f64,
    pub cost_multiplier: f64,
    /// Sampling weight (scenarios of one set sum to 1).
    pub probability: f64,
}

impl Scenario {
    /// The growth calendar under this scenario's delays.
    pub fn calendar(&self, base: &GrowthStageCalendar) -> GrowthStageCalendar {
        base.with_delays(&self.stage_delays)
    }
}

/// Generates `count` equally weighted scenarios.
pub fn generate_scenarios<R: Rng>(
    request: &OptimizationRequest,
    windows: &[WeatherWindow],
    calendar: &GrowthStageCalendar,
    noise: &ScenarioNoise,
    scale: NoiseScale,
    count: usize,
    rng: &mut R,
) -> Vec<Scenario> {
    if count == 0 {
        return Vec::new();
    }
    let probability = 1.0 / count as f64;
    let max_delay = (noise.max_stage_delay_days as f64 * scale.growth).round() as i64;
    (0..count)
        .map(|_| {
            let weather = windows
                .iter()
                .map(|w| perturb_window(w, request, noise, scale.weather, rng))
                .collect();
            let stage_delays = (0..calendar.len())
                .map(|_| {
                    if max_delay > 0 {
                        rng.random_range(-max_delay..=max_delay)
                    } else {
                        0
                    }
                })
                .collect();
            let yield_multiplier = bounded_normal(
                1.0,
                noise.yield_std * scale.yield_response,
                noise.yield_bounds,
                rng,
            );
            let cost_multiplier = bounded_normal(1.0, noise.cost_std, noise.cost_bounds, rng);
            Scenario {
                weather,
                stage_delays,
                yield_multiplier,
                cost_multiplier,
                probability,
            }
        })
        .collect()
}

fn perturb_window<R: Rng>(
    window: &WeatherWindow,
    request: &OptimizationRequest,
    noise: &ScenarioNoise,
    scale: f64,
    rng: &mut R,
) -> WeatherWindow {
    let distance = (window.start - request.planting_date).num_days().max(0) as f64;
    let growth = scale * (1.0 + distance / noise.horizon_growth_days.max(1.0));

    let perturbed = window
        .clone()
        .with_temperature(window.temperature_c + gaussian(noise.temperature_std * growth, rng))
        .with_precipitation(
            window.precipitation_probability + gaussian(noise.precipitation_std * growth, rng),
        )
        .with_wind(window.wind_speed_kmh + gaussian(noise.wind_std * growth, rng))
        .with_soil_moisture(window.soil_moisture + gaussian(noise.moisture_std * growth, rng));

    let delta = perturbed.suitability_score - window.suitability_score;
    let levels = if noise.condition_step > 0.0 {
        (delta / noise.condition_step).round() as i64
    } else {
        0
    };
    let mut result = perturbed;
    result.condition = window.condition.shifted(levels);
    result.rederive_score();
    result
}

fn gaussian<R: Rng>(std: f64, rng: &mut R) -> f64 {
    match Normal::new(0.0, std.max(0.0)) {
        Ok(normal) => normal.sample(rng),
        Err(_) => 0.0,
    }
}

fn bounded_normal<R: Rng>(mean: f64, std: f64, bounds: (f64, f64), rng: &mut R) -> f64 {
    (mean + gaussian(std, rng)).clamp(bounds.0, bounds.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::test_support::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn scenarios(scale: NoiseScale, count: usize, seed: u64) -> Vec<Scenario> {
        let mut rng = SmallRng::seed_from_u64(seed);
        generate_scenarios(
            &corn_request(120),
            &season_weather(120),
            &corn_calendar(),
            &ScenarioNoise::default(),
            scale,
            count,
            &mut rng,
        )
    }

    #[test]
    fn test_bounds_and_weights() {
        let set = scenarios(NoiseScale::default(), 200, 42);
        assert_eq!(set.len(), 200);
        let total: f64 = set.iter().map(|s| s.probability).sum();
        assert!((total - 1.0).abs() < 1e-9);
        for s in &set {
            assert!((0.7..=1.3).contains(&s.yield_multiplier));
            assert!((0.8..=1.2).contains(&s.cost_multiplier));
            assert_eq!(s.stage_delays.len(), corn_calendar().len());
            assert!(s.stage_delays.iter().all(|d| d.abs() <= 5));
            assert!(s.calendar(&corn_calendar()).is_monotonic());
            for w in &s.weather {
                assert!((0.0..=1.0).contains(&w.precipitation_probability));
                assert!((0.0..=1.0).contains(&w.soil_moisture));
                assert!((0.0..=1.0).contains(&w.suitability_score));
            }
        }
    }

    #[test]
    fn test_noise_grows_with_distance() {
        let base = season_weather(120);
        let set = scenarios(NoiseScale::default(), 400, 7);
        let spread = |idx: usize| {
            let deltas: Vec<f64> = set
                .iter()
                .map(|s| s.weather[idx].temperature_c - base[idx].temperature_c)
                .collect();
            (deltas.iter().map(|d| d * d).sum::<f64>() / deltas.len() as f64).sqrt()
        };
        // week 0 σ ≈ 2, week 16 σ ≈ 2 × (1 + 112/30)
        assert!(spread(16) > 2.0 * spread(0));
    }

    #[test]
    fn test_deterministic_and_empty() {
        assert_eq!(scenarios(NoiseScale::default(), 5, 3), scenarios(NoiseScale::default(), 5, 3));
        assert!(scenarios(NoiseScale::default(), 0, 3).is_empty());
    }

    #[test]
    fn test_zero_growth_scale_keeps_calendar() {
        let scale = NoiseScale {
            growth: 0.0,
            ..NoiseScale::default()
        };
        for s in scenarios(scale, 20, 11) {
            assert!(s.stage_delays.iter().all(|&d| d == 0));
        }
    }
}
