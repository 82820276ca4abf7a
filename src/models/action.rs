//! Application actions.
//!
//! "No application" is its own variant rather than an `Apply` with an
//! empty nutrient and zero amount.

use serde::{Deserialize, Serialize};

use super::{ApplicationMethod, Nutrient};

/// What happens on a decision date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApplicationAction {
    /// Do nothing.
    Wait,
    /// Apply `amount` lbs/acre of `nutrient` using `method`.
    Apply {
        nutrient: Nutrient,
        amount: f64,
        method: ApplicationMethod,
    },
}

impl ApplicationAction {
    /// Creates an apply action.
    pub fn apply(nutrient: Nutrient, amount: f64, method: ApplicationMethod) -> Self {
        Self::Apply {
            nutrient,
            amount,
            method,
        }
    }

    #[inline]
    pub fn is_wait(&self) -> bool {
        matches!(self, Self::Wait)
    }

    /// Applied amount (0 for `Wait`).
    #[inline]
    pub fn amount(&self) -> f64 {
        match self {
            Self::Wait => 0.0,
            Self::Apply { amount, .. } => *amount,
        }
    }

    /// Nutrient applied, if any.
    #[inline]
    pub fn nutrient(&self) -> Option<Nutrient> {
        match self {
            Self::Wait => None,
            Self::Apply { nutrient, .. } => Some(*nutrient),
        }
    }

    /// Method used, if any.
    #[inline]
    pub fn method(&self) -> Option<ApplicationMethod> {
        match self {
            Self::Wait => None,
            Self::Apply { method, .. } => Some(*method),
        }
    }
}
