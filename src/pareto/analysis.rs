//! Trade-off analysis of a Pareto front.
//!
//! - Per-objective ranges and the member best in each objective
//! - Pairwise Pearson correlation between objectives (negative = conflict)
//! - Knee point: the member closest to the ideal point after
//!   normalizing every objective to [0, 1] over the front
//!
//! # Reference
//! Branke et al. (2004), "Finding Knees in Multi-objective Optimization"

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::models::{Objective, ObjectiveVector};

/// Value range of one objective across the front.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveRange {
    pub objective: Objective,
    pub min: f64,
    pub max: f64,
    /// Front index holding `max`.
    pub best_index: usize,
}

/// Correlation between two objectives across the front.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveCorrelation {
    pub first: Objective,
    pub second: Objective,
    /// Pearson coefficient in [-1, 1]; 0 when either objective is constant.
    pub coefficient: f64,
}

impl ObjectiveCorrelation {
    /// Improving one objective tends to worsen the other.
    pub fn is_conflicting(&self) -> bool {
        self.coefficient < -0.3
    }
}

/// Summary of the trade-offs represented by a front.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeOffAnalysis {
    pub front_size: usize,
    pub ranges: Vec<ObjectiveRange>,
    pub correlations: Vec<ObjectiveCorrelation>,
    /// Front index of the knee point.
    pub knee_index: Option<usize>,
}

impl TradeOffAnalysis {
    /// Analyzes a front. An empty front gives an empty analysis.
    pub fn from_front(front: &[ObjectiveVector]) -> Self {
        if front.is_empty() {
            return Self::default();
        }

        let ranges = Objective::ALL
            .iter()
            .map(|&objective| {
                let mut range = ObjectiveRange {
                    objective,
                    min: f64::INFINITY,
                    max: f64::NEG_INFINITY,
                    best_index: 0,
                };
                for (i, v) in front.iter().enumerate() {
                    let x = v.get(objective);
                    range.min = range.min.min(x);
                    if x > range.max {
                        range.max = x;
                        range.best_index = i;
                    }
                }
                range
            })
            .collect();

        let mut correlations = Vec::with_capacity(6);
        for (i, &first) in Objective::ALL.iter().enumerate() {
            for &second in &Objective::ALL[i + 1..] {
                let xs: Vec<f64> = front.iter().map(|v| v.get(first)).collect();
                let ys: Vec<f64> = front.iter().map(|v| v.get(second)).collect();
                correlations.push(ObjectiveCorrelation {
                    first,
                    second,
                    coefficient: pearson(&xs, &ys),
                });
            }
        }

        Self {
            front_size: front.len(),
            ranges,
            correlations,
            knee_index: knee_point(front),
        }
    }

    /// Pairs of objectives that conflict across the front.
    pub fn conflicts(&self) -> impl Iterator<Item = &ObjectiveCorrelation> {
        self.correlations.iter().filter(|c| c.is_conflicting())
    }

    pub fn range_of(&self, objective: Objective) -> Option<&ObjectiveRange> {
        self.ranges.iter().find(|r| r.objective == objective)
    }
}

/// Pearson correlation; 0 for fewer than two points or zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x = xs[..n].iter().sum::<f64>() / nf;
    let mean_y = ys[..n].iter().sum::<f64>() / nf;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}

/// Index of the member nearest the normalized ideal point.
///
/// Objectives constant across the front are ignored. `None` only for an
/// empty front.
pub fn knee_point(front: &[ObjectiveVector]) -> Option<usize> {
    if front.is_empty() {
        return None;
    }
    let mut min = [f64::INFINITY; 4];
    let mut max = [f64::NEG_INFINITY; 4];
    for v in front {
        for (k, x) in v.as_array().into_iter().enumerate() {
            min[k] = min[k].min(x);
            max[k] = max[k].max(x);
        }
    }

    let mut best: Option<(usize, f64)> = None;
    for (i, v) in front.iter().enumerate() {
        let mut distance = 0.0;
        for (k, x) in v.as_array().into_iter().enumerate() {
            let range = max[k] - min[k];
            if range > 0.0 {
                let shortfall = (max[k] - x) / range;
                distance += shortfall * shortfall;
            }
        }
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((i, distance));
        }
    }
    best.map(|(i, _)| i)
}

/// Fails if any member of `front` dominates another.
pub fn verify_front(front: &[ObjectiveVector]) -> Result<()> {
    for (i, a) in front.iter().enumerate() {
        for (j, b) in front.iter().enumerate() {
            if i != j && a.dominates(b) {
                return Err(OptimizerError::InvariantViolation(format!(
                    "pareto front member {i} dominates member {j}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(y: f64, c: f64, e: f64, r: f64) -> ObjectiveVector {
        ObjectiveVector::new(y, c, e, r)
    }

    fn sample_front() -> Vec<ObjectiveVector> {
        vec![
            v(90.0, 20.0, 60.0, 50.0),
            v(70.0, 60.0, 60.0, 55.0),
            v(40.0, 90.0, 60.0, 60.0),
        ]
    }

    #[test]
    fn test_ranges_and_best() {
        let a = TradeOffAnalysis::from_front(&sample_front());
        assert_eq!(a.front_size, 3);
        let y = a.range_of(Objective::Yield).unwrap();
        assert_eq!((y.min, y.max, y.best_index), (40.0, 90.0, 0));
        let c = a.range_of(Objective::Cost).unwrap();
        assert_eq!(c.best_index, 2);
        assert_eq!(a.correlations.len(), 6);
    }

    #[test]
    fn test_yield_cost_conflict_detected() {
        let a = TradeOffAnalysis::from_front(&sample_front());
        let conflict: Vec<_> = a.conflicts().collect();
        assert!(conflict
            .iter()
            .any(|c| c.first == Objective::Yield && c.second == Objective::Cost));
        // Environment is constant, so its correlations are 0.
        assert!(a
            .correlations
            .iter()
            .filter(|c| c.first == Objective::Environment || c.second == Objective::Environment)
            .all(|c| c.coefficient == 0.0));
    }

    #[test]
    fn test_knee_is_balanced_member() {
        assert_eq!(knee_point(&sample_front()), Some(1));
        assert_eq!(knee_point(&[]), None);
        assert_eq!(knee_point(&[v(1.0, 1.0, 1.0, 1.0)]), Some(0));
    }

    #[test]
    fn test_pearson() {
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&[1.0], &[1.0]), 0.0);
        assert_eq!(pearson(&[1.0, 1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_verify_front() {
        assert!(verify_front(&sample_front()).is_ok());
        let bad = vec![v(50.0, 50.0, 50.0, 50.0), v(40.0, 50.0, 50.0, 50.0)];
        let err = verify_front(&bad).unwrap_err();
        assert!(matches!(err, OptimizerError::InvariantViolation(_)));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_empty_front() {
        let a = TradeOffAnalysis::from_front(&[]);
        assert_eq!(a.front_size, 0);
        assert!(a.knee_index.is_none());
        assert!(verify_front(&[]).is_ok());
    }
}
