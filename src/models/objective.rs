//! Objective vector and preference weights.
//!
//! All four objectives are normalized to [0, 100] and maximized.

use serde::{Deserialize, Serialize};

/// Identifies one objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Yield,
    Cost,
    Environment,
    Risk,
}

impl Objective {
    pub const ALL: [Objective; 4] = [
        Objective::Yield,
        Objective::Cost,
        Objective::Environment,
        Objective::Risk,
    ];
}

/// Four normalized scores (higher = better for each).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveVector {
    /// Yield benefit.
    pub yield_benefit: f64,
    /// Cost efficiency (higher = cheaper).
    pub cost_efficiency: f64,
    /// Environmental favorability (higher = safer).
    pub environmental: f64,
    /// Risk mitigation (higher = lower risk).
    pub risk_mitigation: f64,
}

impl ObjectiveVector {
    /// Creates a vector, clamping each score into [0, 100].
    pub fn new(yield_benefit: f64, cost_efficiency: f64, environmental: f64, risk: f64) -> Self {
        Self {
            yield_benefit: clamp_score(yield_benefit),
            cost_efficiency: clamp_score(cost_efficiency),
            environmental: clamp_score(environmental),
            risk_mitigation: clamp_score(risk),
        }
    }

    /// Value of one objective.
    #[inline]
    pub fn get(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Yield => self.yield_benefit,
            Objective::Cost => self.cost_efficiency,
            Objective::Environment => self.environmental,
            Objective::Risk => self.risk_mitigation,
        }
    }

    /// Values in [`Objective::ALL`] order.
    #[inline]
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.yield_benefit,
            self.cost_efficiency,
            self.environmental,
            self.risk_mitigation,
        ]
    }

    /// Weighted sum (0..=100 when weights sum to 1).
    pub fn weighted_sum(&self, weights: &ObjectiveWeights) -> f64 {
        self.yield_benefit * weights.yield_benefit
            + self.cost_efficiency * weights.cost_efficiency
            + self.environmental * weights.environmental
            + self.risk_mitigation * weights.risk_mitigation
    }

    /// Pareto dominance: not worse in any objective and strictly better
    /// in at least one.
    pub fn dominates(&self, other: &Self) -> bool {
        let a = self.as_array();
        let b = other.as_array();
        let mut strictly_better = false;
        for i in 0..4 {
            if a[i] < b[i] {
                return false;
            }
            if a[i] > b[i] {
                strictly_better = true;
            }
        }
        strictly_better
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Preference weights over the four objectives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub yield_benefit: f64,
    pub cost_efficiency: f64,
    pub environmental: f64,
    pub risk_mitigation: f64,
}

impl Default for ObjectiveWeights {
    /// Yield 0.40, cost 0.25, environment 0.20, risk 0.15.
    fn default() -> Self {
        Self {
            yield_benefit: 0.40,
            cost_efficiency: 0.25,
            environmental: 0.20,
            risk_mitigation: 0.15,
        }
    }
}

impl ObjectiveWeights {
    pub fn new(yield_benefit: f64, cost: f64, environmental: f64, risk: f64) -> Self {
        Self {
            yield_benefit,
            cost_efficiency: cost,
            environmental,
            risk_mitigation: risk,
        }
    }

    /// Sum of the four weights.
    pub fn total(&self) -> f64 {
        self.yield_benefit + self.cost_efficiency + self.environmental + self.risk_mitigation
    }

    /// Rescales the weights to sum to 1.
    ///
    /// Falls back to the defaults if the total is not positive.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 || !total.is_finite() {
            return Self::default();
        }
        Self {
            yield_benefit: self.yield_benefit / total,
            cost_efficiency: self.cost_efficiency / total,
            environmental: self.environmental / total,
            risk_mitigation: self.risk_mitigation / total,
        }
    }

    /// Whether all weights are non-negative and sum to 1 (±1e-6).
    pub fn is_normalized(&self) -> bool {
        [
            self.yield_benefit,
            self.cost_efficiency,
            self.environmental,
            self.risk_mitigation,
        ]
        .iter()
        .all(|w| *w >= 0.0)
            && (self.total() - 1.0).abs() < 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps() {
        let v = ObjectiveVector::new(120.0, -5.0, f64::NAN, 50.0);
        assert_eq!(v.yield_benefit, 100.0);
        assert_eq!(v.cost_efficiency, 0.0);
        assert_eq!(v.environmental, 0.0);
        assert_eq!(v.risk_mitigation, 50.0);
    }

    #[test]
    fn test_dominance() {
        let a = ObjectiveVector::new(80.0, 60.0, 50.0, 40.0);
        let b = ObjectiveVector::new(70.0, 60.0, 50.0, 40.0);
        let c = ObjectiveVector::new(90.0, 10.0, 50.0, 40.0);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(!a.dominates(&c));
        assert!(!c.dominates(&a));
        assert!(!a.dominates(&a));
    }

    #[test]
    fn test_weighted_sum_defaults() {
        let w = ObjectiveWeights::default();
        assert!(w.is_normalized());
        let v = ObjectiveVector::new(100.0, 100.0, 100.0, 100.0);
        assert!((v.weighted_sum(&w) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_weights() {
        let w = ObjectiveWeights::new(2.0, 1.0, 1.0, 0.0).normalized();
        assert!((w.yield_benefit - 0.5).abs() < 1e-12);
        assert!(w.is_normalized());
        let fallback = ObjectiveWeights::new(0.0, 0.0, 0.0, 0.0).normalized();
        assert_eq!(fallback, ObjectiveWeights::default());
    }

    #[test]
    fn test_get_matches_array() {
        let v = ObjectiveVector::new(1.0, 2.0, 3.0, 4.0);
        for (i, o) in Objective::ALL.iter().enumerate() {
            assert_eq!(v.get(*o), v.as_array()[i]);
        }
    }
}
