//! Outcome-distribution statistics.
//!
//! | Metric | Definition |
//! |--------|------------|
//! | mean | probability-weighted mean |
//! | std | weighted standard deviation |
//! | CI | `mean ± z(level) · std` (normal approximation) |
//! | VaR | 5th percentile |
//! | CVaR | mean of outcomes at or below VaR |
//! | downside deviation | RMS shortfall of below-mean outcomes |
//! | Sharpe-like | `mean / std` (0 when std = 0) |
//!
//! Empty inputs yield zeroed statistics rather than NaN.

use serde::{Deserialize, Serialize};

/// Levels reported by default.
pub const CONFIDENCE_LEVELS: [f64; 3] = [0.80, 0.90, 0.95];

/// Tail probability used for VaR / CVaR.
pub const VAR_LEVEL: f64 = 0.05;

/// Two-sided interval around a mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Coverage level (e.g. 0.95).
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Normal-approximation interval `mean ± z · std`.
    pub fn normal(mean: f64, std: f64, level: f64) -> Self {
        let half = two_sided_z(level) * std.max(0.0);
        Self {
            level,
            lower: mean - half,
            upper: mean + half,
        }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Intervals at every level in [`CONFIDENCE_LEVELS`].
pub fn intervals(mean: f64, std: f64) -> Vec<ConfidenceInterval> {
    CONFIDENCE_LEVELS
        .iter()
        .map(|&level| ConfidenceInterval::normal(mean, std, level))
        .collect()
}

/// z such that P(|Z| ≤ z) = level.
pub fn two_sided_z(level: f64) -> f64 {
    normal_quantile(0.5 + level.clamp(0.0, 0.999_999) / 2.0)
}

/// Inverse standard normal CDF.
///
/// Rational approximation with relative error below 1.15e-9.
///
/// # Reference
/// Acklam (2003), "An algorithm for computing the inverse normal
/// cumulative distribution function"
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838,
        -2.549732539343734,
        4.374664141464968,
        2.938163982698783,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996,
        3.754408661907416,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -normal_quantile(1.0 - p)
    }
}

/// Summary of one outcome distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStatistics {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// 10th percentile.
    pub p10: f64,
    pub intervals: Vec<ConfidenceInterval>,
}

impl OutcomeStatistics {
    /// Statistics of `values` under `weights` (uniform when `weights` is
    /// empty or its length differs).
    pub fn from_samples(values: &[f64], weights: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                intervals: intervals(0.0, 0.0),
                ..Self::default()
            };
        }
        let (mean, std_dev) = weighted_mean_std(values, weights);
        Self {
            mean,
            std_dev,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            p10: weighted_percentile(values, weights, 0.10),
            intervals: intervals(mean, std_dev),
        }
    }

    /// Interval at `level`, if reported.
    pub fn interval(&self, level: f64) -> Option<&ConfidenceInterval> {
        self.intervals.iter().find(|ci| (ci.level - level).abs() < 1e-9)
    }
}

/// Downside risk metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Value-at-Risk: 5th percentile outcome.
    pub value_at_risk: f64,
    /// Conditional VaR: mean of the worst 5%.
    pub conditional_value_at_risk: f64,
    /// RMS shortfall below the mean.
    pub downside_deviation: f64,
    /// Mean ÷ standard deviation.
    pub sharpe_ratio: f64,
    /// Share of outcomes below the mean.
    pub probability_below_mean: f64,
}

impl RiskMetrics {
    pub fn from_samples(values: &[f64], weights: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let (mean, std_dev) = weighted_mean_std(values, weights);
        let var = percentile(values, VAR_LEVEL);

        let tail: Vec<f64> = values.iter().copied().filter(|&v| v <= var).collect();
        let cvar = if tail.is_empty() {
            var
        } else {
            tail.iter().sum::<f64>() / tail.len() as f64
        };

        let below: Vec<f64> = values.iter().copied().filter(|&v| v < mean).collect();
        let downside = if below.is_empty() {
            0.0
        } else {
            (below.iter().map(|v| (mean - v).powi(2)).sum::<f64>() / below.len() as f64).sqrt()
        };

        Self {
            value_at_risk: var,
            conditional_value_at_risk: cvar,
            downside_deviation: downside,
            sharpe_ratio: if std_dev > 0.0 { mean / std_dev } else { 0.0 },
            probability_below_mean: below.len() as f64 / values.len() as f64,
        }
    }
}

/// Weighted mean and (population) standard deviation.
pub fn weighted_mean_std(values: &[f64], weights: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let uniform = weights.len() != values.len() || weights.iter().sum::<f64>() <= 0.0;
    let weight = |i: usize| if uniform { 1.0 } else { weights[i].max(0.0) };
    let total: f64 = (0..values.len()).map(weight).sum();
    if total <= 0.0 {
        return (0.0, 0.0);
    }
    let mean = values
        .iter()
        .enumerate()
        .map(|(i, v)| v * weight(i))
        .sum::<f64>()
        / total;
    let variance = values
        .iter()
        .enumerate()
        .map(|(i, v)| weight(i) * (v - mean).powi(2))
        .sum::<f64>()
        / total;
    (mean, variance.max(0.0).sqrt())
}

/// Linear-interpolated percentile, `q` in [0, 1]. 0 for empty input.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Weighted linear-interpolated percentile, `q` in [0, 1].
///
/// Sorted value `i` sits at `(Sᵢ − wᵢ) / (W − w_last)` with `Sᵢ` the
/// cumulative weight, so equal weights reproduce [`percentile`]. Weights
/// fall back to uniform as in [`weighted_mean_std`]; zero-weight values
/// are ignored.
pub fn weighted_percentile(values: &[f64], weights: &[f64], q: f64) -> f64 {
    let uniform = weights.len() != values.len() || weights.iter().sum::<f64>() <= 0.0;
    if uniform {
        return percentile(values, q);
    }
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .zip(weights)
        .filter(|&(_, &w)| w > 0.0)
        .map(|(&v, &w)| (v, w))
        .collect();
    if pairs.is_empty() {
        return 0.0;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|p| p.1).sum();
    let span = total - pairs[pairs.len() - 1].1;
    if span <= 0.0 {
        return pairs[0].0;
    }
    let target = q.clamp(0.0, 1.0);
    let mut cumulative = 0.0;
    let mut prev = (pairs[0].0, 0.0);
    for &(value, weight) in &pairs {
        let pos = cumulative / span;
        cumulative += weight;
        if pos >= target {
            let gap = pos - prev.1;
            if gap <= 0.0 {
                return value;
            }
            return prev.0 + (value - prev.0) * (target - prev.1) / gap;
        }
        prev = (value, pos);
    }
    pairs[pairs.len() - 1].0
}
