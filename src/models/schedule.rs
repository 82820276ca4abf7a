//! Schedule (solution) model.
//!
//! A schedule is a chronologically ordered list of dated application
//! actions, plus any constraint violations detected for it. A schedule
//! with a [`ViolationType::RequirementUnmet`] violation is *partial*;
//! otherwise it is *complete*.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ApplicationAction, ApplicationMethod, Nutrient, OptimizationRequest};

/// Relative tolerance for requirement satisfaction (1%).
pub const REQUIREMENT_TOLERANCE: f64 = 0.01;

/// A fertilizer schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Dated actions, ordered by date.
    pub entries: Vec<ScheduledAction>,
    /// Constraint violations detected in this schedule.
    pub violations: Vec<Violation>,
}

/// One dated action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub date: NaiveDate,
    pub action: ApplicationAction,
}

/// A dated application with its payload unpacked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Application {
    pub date: NaiveDate,
    pub nutrient: Nutrient,
    pub amount: f64,
    pub method: ApplicationMethod,
}

/// A constraint violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Type of violation.
    pub violation_type: ViolationType,
    /// Human-readable description.
    pub message: String,
    /// Severity (0-100, higher = worse).
    pub severity: i32,
}

/// Classification of constraint violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViolationType {
    /// A nutrient's applied total misses its requirement.
    RequirementUnmet { nutrient: Nutrient, shortfall: f64 },
    /// Estimated cost exceeds the budget ceiling.
    BudgetExceeded { overrun: f64 },
    /// An application falls on an unsuitable-weather day.
    UnsuitableWeather,
    /// An action lies outside the planting horizon.
    OutsideHorizon,
    /// Domain-specific violation.
    Custom(String),
}

impl ScheduledAction {
    pub fn new(date: NaiveDate, action: ApplicationAction) -> Self {
        Self { date, action }
    }
}

impl Violation {
    /// Requirement shortfall (or excess, if negative).
    pub fn requirement_unmet(nutrient: Nutrient, shortfall: f64) -> Self {
        Self {
            violation_type: ViolationType::RequirementUnmet {
                nutrient,
                shortfall,
            },
            message: format!("{nutrient} requirement missed by {shortfall:.2} lbs/acre"),
            severity: 90,
        }
    }

    /// Budget overrun.
    pub fn budget_exceeded(overrun: f64) -> Self {
        Self {
            violation_type: ViolationType::BudgetExceeded { overrun },
            message: format!("budget exceeded by ${overrun:.2}/acre"),
            severity: 70,
        }
    }

    /// Application on an unsuitable day.
    pub fn unsuitable_weather(date: NaiveDate) -> Self {
        Self {
            violation_type: ViolationType::UnsuitableWeather,
            message: format!("application on {date} falls in unsuitable weather"),
            severity: 60,
        }
    }

    /// Action outside the horizon.
    pub fn outside_horizon(date: NaiveDate) -> Self {
        Self {
            violation_type: ViolationType::OutsideHorizon,
            message: format!("action on {date} lies outside the horizon"),
            severity: 95,
        }
    }
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action, keeping entries ordered by date.
    ///
    /// Entries with equal dates keep insertion order.
    pub fn push(&mut self, date: NaiveDate, action: ApplicationAction) {
        let pos = self.entries.partition_point(|e| e.date <= date);
        self.entries.insert(pos, ScheduledAction::new(date, action));
    }

    /// Adds an apply action.
    pub fn add_application(
        &mut self,
        date: NaiveDate,
        nutrient: Nutrient,
        amount: f64,
        method: ApplicationMethod,
    ) {
        self.push(date, ApplicationAction::apply(nutrient, amount, method));
    }

    /// Adds a violation.
    pub fn add_violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Whether the schedule has no violations.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Whether every requirement is met (no `RequirementUnmet` violation).
    pub fn is_complete(&self) -> bool {
        !self
            .violations
            .iter()
            .any(|v| matches!(v.violation_type, ViolationType::RequirementUnmet { .. }))
    }

    /// Iterates over apply actions.
    pub fn applications(&self) -> impl Iterator<Item = Application> + '_ {
        self.entries.iter().filter_map(|e| match e.action {
            ApplicationAction::Wait => None,
            ApplicationAction::Apply {
                nutrient,
                amount,
                method,
            } => Some(Application {
                date: e.date,
                nutrient,
                amount,
                method,
            }),
        })
    }

    /// Applications of one nutrient.
    pub fn applications_for(&self, nutrient: Nutrient) -> Vec<Application> {
        self.applications().filter(|a| a.nutrient == nutrient).collect()
    }

    /// Number of apply actions.
    pub fn application_count(&self) -> usize {
        self.applications().count()
    }

    /// Total applied for a nutrient (lbs/acre).
    pub fn total_applied(&self, nutrient: Nutrient) -> f64 {
        self.applications()
            .filter(|a| a.nutrient == nutrient)
            .map(|a| a.amount)
            .sum()
    }

    /// Totals per nutrient.
    pub fn applied_totals(&self) -> BTreeMap<Nutrient, f64> {
        let mut totals = BTreeMap::new();
        for a in self.applications() {
            *totals.entry(a.nutrient).or_insert(0.0) += a.amount;
        }
        totals
    }

    /// Number of nutrients applied on more than one date.
    pub fn split_nutrient_count(&self) -> usize {
        let mut counts: BTreeMap<Nutrient, usize> = BTreeMap::new();
        for a in self.applications() {
            *counts.entry(a.nutrient).or_insert(0) += 1;
        }
        counts.values().filter(|&&c| c > 1).count()
    }

    /// Earliest action date.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.entries.first().map(|e| e.date)
    }

    /// Latest action date.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.entries.last().map(|e| e.date)
    }

    /// Drops `Wait` entries.
    pub fn without_waits(mut self) -> Self {
        self.entries.retain(|e| !e.action.is_wait());
        self
    }

    /// Whether every action lies within the request horizon.
    pub fn within_horizon(&self, request: &OptimizationRequest) -> bool {
        self.entries.iter().all(|e| request.in_horizon(e.date))
    }

    /// Replaces requirement and horizon violations by re-checking against
    /// the request.
    ///
    /// A nutrient is satisfied when its applied total is within
    /// [`REQUIREMENT_TOLERANCE`] of the requirement.
    pub fn check_requirements(&mut self, request: &OptimizationRequest) {
        self.violations.retain(|v| {
            !matches!(
                v.violation_type,
                ViolationType::RequirementUnmet { .. } | ViolationType::OutsideHorizon
            )
        });

        for (&nutrient, &required) in &request.requirements {
            let applied = self.total_applied(nutrient);
            let tolerance = (required * REQUIREMENT_TOLERANCE).max(1e-9);
            if (applied - required).abs() > tolerance {
                self.add_violation(Violation::requirement_unmet(nutrient, required - applied));
            }
        }

        let outside: Vec<NaiveDate> = self
            .entries
            .iter()
            .filter(|e| !request.in_horizon(e.date))
            .map(|e| e.date)
            .collect();
        for date in outside {
            self.add_violation(Violation::outside_horizon(date));
        }
    }

    /// Shortfall per nutrient for `RequirementUnmet` violations.
    pub fn unmet_requirements(&self) -> BTreeMap<Nutrient, f64> {
        self.violations
            .iter()
            .filter_map(|v| match v.violation_type {
                ViolationType::RequirementUnmet {
                    nutrient,
                    shortfall,
                } => Some((nutrient, shortfall)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 20).unwrap() + Duration::days(offset)
    }

    fn request() -> OptimizationRequest {
        OptimizationRequest::new("F1", "corn", d(0), 120)
            .with_requirement(Nutrient::Nitrogen, 150.0)
            .with_requirement(Nutrient::Phosphorus, 40.0)
    }

    fn sample_schedule() -> Schedule {
        let mut s = Schedule::new();
        s.add_application(d(40), Nutrient::Nitrogen, 100.0, ApplicationMethod::Injection);
        s.add_application(d(0), Nutrient::Nitrogen, 50.0, ApplicationMethod::Broadcast);
        s.add_application(d(0), Nutrient::Phosphorus, 40.0, ApplicationMethod::Banded);
        s
    }

    #[test]
    fn test_push_keeps_chronological_order() {
        let s = sample_schedule();
        let dates: Vec<_> = s.entries.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![d(0), d(0), d(40)]);
        // equal dates keep insertion order
        assert_eq!(s.entries[0].action.nutrient(), Some(Nutrient::Nitrogen));
        assert_eq!(s.first_date(), Some(d(0)));
        assert_eq!(s.last_date(), Some(d(40)));
    }

    #[test]
    fn test_totals() {
        let s = sample_schedule();
        assert!((s.total_applied(Nutrient::Nitrogen) - 150.0).abs() < 1e-12);
        assert_eq!(s.application_count(), 3);
        assert_eq!(s.split_nutrient_count(), 1);
        assert_eq!(s.applications_for(Nutrient::Phosphorus).len(), 1);
        assert_eq!(s.applied_totals().len(), 2);
    }

    #[test]
    fn test_check_requirements_complete() {
        let mut s = sample_schedule();
        s.check_requirements(&request());
        assert!(s.is_complete());
        assert!(s.is_valid());
        assert!(s.within_horizon(&request()));
    }

    #[test]
    fn test_check_requirements_partial() {
        let mut s = Schedule::new();
        s.add_application(d(10), Nutrient::Nitrogen, 140.0, ApplicationMethod::Broadcast);
        s.add_application(d(130), Nutrient::Phosphorus, 40.0, ApplicationMethod::Broadcast);
        s.check_requirements(&request());

        assert!(!s.is_complete());
        let unmet = s.unmet_requirements();
        assert!((unmet[&Nutrient::Nitrogen] - 10.0).abs() < 1e-9);
        assert!(!unmet.contains_key(&Nutrient::Phosphorus));
        assert!(s
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::OutsideHorizon));
    }

    #[test]
    fn test_within_tolerance_is_complete() {
        let mut s = Schedule::new();
        s.add_application(d(10), Nutrient::Nitrogen, 149.0, ApplicationMethod::Broadcast);
        s.add_application(d(10), Nutrient::Phosphorus, 40.2, ApplicationMethod::Broadcast);
        s.check_requirements(&request());
        assert!(s.is_complete());
    }

    #[test]
    fn test_recheck_replaces_stale_violations() {
        let mut s = Schedule::new();
        s.check_requirements(&request());
        assert_eq!(s.unmet_requirements().len(), 2);
        s.add_application(d(5), Nutrient::Nitrogen, 150.0, ApplicationMethod::Broadcast);
        s.add_application(d(5), Nutrient::Phosphorus, 40.0, ApplicationMethod::Broadcast);
        s.check_requirements(&request());
        assert!(s.is_complete());
    }

    #[test]
    fn test_without_waits() {
        let mut s = sample_schedule();
        s.push(d(20), ApplicationAction::Wait);
        assert_eq!(s.entries.len(), 4);
        let s = s.without_waits();
        assert_eq!(s.entries.len(), 3);
    }

    #[test]
    fn test_violation_factories() {
        let v = Violation::budget_exceeded(12.5);
        assert_eq!(v.violation_type, ViolationType::BudgetExceeded { overrun: 12.5 });
        let v = Violation::unsuitable_weather(d(3));
        assert_eq!(v.violation_type, ViolationType::UnsuitableWeather);
        assert!(v.message.contains("2025-04-23"));
    }
}
