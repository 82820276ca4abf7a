//! Fertilizer scheduling domain models.
//!
//! Shared by every optimizer: the request, the externally supplied
//! weather windows and growth calendar, and the solution types.
//!
//! | Type | Role |
//! |------|------|
//! | `OptimizationRequest` | What must be applied, how, when, under which limits |
//! | `WeatherWindow` | Date range with a suitability rating |
//! | `GrowthStageCalendar` | Date → crop growth stage |
//! | `ApplicationAction` | `Wait` or `Apply { nutrient, amount, method }` |
//! | `Schedule` | Dated actions + violations |
//! | `ObjectiveVector` | Yield / cost / environment / risk scores |
//! | `HistoricalRecord` | Past application with observed outcome |

mod action;
mod growth;
mod history;
mod nutrient;
mod objective;
mod request;
mod schedule;
mod weather;

pub use action::ApplicationAction;
pub use growth::{GrowthStage, GrowthStageCalendar};
pub use history::HistoricalRecord;
pub use nutrient::{ApplicationMethod, Nutrient};
pub use objective::{Objective, ObjectiveVector, ObjectiveWeights};
pub use request::{OptimizationRequest, SiteProfile};
pub use schedule::{
    Application, REQUIREMENT_TOLERANCE, Schedule, ScheduledAction, Violation, ViolationType,
};
pub use weather::{
    TEMPERATURE_RANGE, WIND_RANGE, WeatherCondition, WeatherSnapshot, WeatherWindow,
    derive_suitability,
};
