//! Nutrients and application methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fertilizer nutrient with a per-acre requirement.
///
/// Ordered so that nutrient maps iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nutrient {
    /// N
    Nitrogen,
    /// P (as P2O5)
    Phosphorus,
    /// K (as K2O)
    Potassium,
    /// S
    Sulfur,
}

impl Nutrient {
    /// All nutrients in canonical order.
    pub const ALL: [Nutrient; 4] = [
        Nutrient::Nitrogen,
        Nutrient::Phosphorus,
        Nutrient::Potassium,
        Nutrient::Sulfur,
    ];

    /// Position in [`Nutrient::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Nutrient::Nitrogen => 0,
            Nutrient::Phosphorus => 1,
            Nutrient::Potassium => 2,
            Nutrient::Sulfur => 3,
        }
    }

    /// Short chemical symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Nutrient::Nitrogen => "N",
            Nutrient::Phosphorus => "P",
            Nutrient::Potassium => "K",
            Nutrient::Sulfur => "S",
        }
    }

    /// Mobile nutrients leach readily and benefit most from split timing.
    pub fn is_mobile(self) -> bool {
        matches!(self, Nutrient::Nitrogen | Nutrient::Sulfur)
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Nutrient::Nitrogen => "nitrogen",
            Nutrient::Phosphorus => "phosphorus",
            Nutrient::Potassium => "potassium",
            Nutrient::Sulfur => "sulfur",
        };
        f.write_str(name)
    }
}

/// How fertilizer is placed in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationMethod {
    /// Surface spread over the whole field.
    Broadcast,
    /// Placed in bands near the seed row.
    Banded,
    /// Injected below the surface.
    Injection,
    /// Dissolved in irrigation water.
    Fertigation,
    /// Sprayed onto the canopy.
    Foliar,
}

impl ApplicationMethod {
    /// All methods in canonical order.
    pub const ALL: [ApplicationMethod; 5] = [
        ApplicationMethod::Broadcast,
        ApplicationMethod::Banded,
        ApplicationMethod::Injection,
        ApplicationMethod::Fertigation,
        ApplicationMethod::Foliar,
    ];

    /// Position in [`ApplicationMethod::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            ApplicationMethod::Broadcast => 0,
            ApplicationMethod::Banded => 1,
            ApplicationMethod::Injection => 2,
            ApplicationMethod::Fertigation => 3,
            ApplicationMethod::Foliar => 4,
        }
    }
}

impl fmt::Display for ApplicationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplicationMethod::Broadcast => "broadcast",
            ApplicationMethod::Banded => "banded",
            ApplicationMethod::Injection => "injection",
            ApplicationMethod::Fertigation => "fertigation",
            ApplicationMethod::Foliar => "foliar",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nutrient_index_matches_all() {
        for (i, n) in Nutrient::ALL.iter().enumerate() {
            assert_eq!(n.index(), i);
        }
        for (i, m) in ApplicationMethod::ALL.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Nutrient::Nitrogen).unwrap();
        assert_eq!(json, "\"nitrogen\"");
        let m: ApplicationMethod = serde_json::from_str("\"fertigation\"").unwrap();
        assert_eq!(m, ApplicationMethod::Fertigation);
    }

    #[test]
    fn test_mobility() {
        assert!(Nutrient::Nitrogen.is_mobile());
        assert!(!Nutrient::Phosphorus.is_mobile());
    }
}
