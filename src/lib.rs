//! Fertilizer application timing optimization.
//!
//! Given a field's nutrient requirements, a weather forecast, a crop
//! growth-stage calendar and optional application history, produces a
//! dated schedule of (nutrient, amount, method) applications scored on
//! yield benefit, cost efficiency, environmental impact and risk.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `OptimizationRequest`, `WeatherWindow`,
//!   `GrowthStageCalendar`, `Schedule`, `ObjectiveVector`, `HistoricalRecord`
//! - **`validation`**: Input integrity checks (collects every violation)
//! - **`scoring`**: Shared heuristic application scoring and schedule KPIs
//! - **`dp`**: Backward-induction dynamic programming over growth stages
//! - **`ga`**: Genetic algorithm over variable-length application lists
//! - **`pareto`**: NSGA-II multi-objective search and trade-off analysis
//! - **`learned`**: Neural outcome predictor trained on history
//! - **`uncertainty`**: Monte Carlo scenarios, risk metrics, robust selection
//! - **`orchestrator`**: Algorithm selection and result normalization
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use u_fertilize::models::{
//!     GrowthStage, GrowthStageCalendar, Nutrient, OptimizationRequest, WeatherCondition,
//!     WeatherWindow,
//! };
//! use u_fertilize::orchestrator::{OptimizationOptions, Orchestrator};
//!
//! let planting = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();
//! let request = OptimizationRequest::new("field-1", "corn", planting, 60)
//!     .with_requirement(Nutrient::Nitrogen, 120.0);
//! let weather = vec![WeatherWindow::new(
//!     planting,
//!     planting + chrono::Duration::days(60),
//!     WeatherCondition::Good,
//! )];
//! let calendar = GrowthStageCalendar::from_offsets(
//!     planting,
//!     &[(0, GrowthStage::Planting), (10, GrowthStage::Emergence), (25, GrowthStage::EarlyVegetative)],
//! );
//!
//! let outcome = Orchestrator::default()
//!     .optimize(&request, &weather, &calendar, &[], &OptimizationOptions::default())
//!     .unwrap();
//! assert!(outcome.schedule.application_count() > 0);
//! ```
//!
//! # References
//!
//! - Bellman (1957), "Dynamic Programming"
//! - Deb et al. (2002), "A Fast and Elitist Multiobjective Genetic Algorithm: NSGA-II"
//! - Rockafellar & Uryasev (2000), "Optimization of Conditional Value-at-Risk"

pub mod context;
pub mod control;
pub mod dp;
pub mod error;
pub mod ga;
pub mod learned;
pub mod models;
pub mod orchestrator;
pub mod pareto;
pub mod scoring;
pub mod uncertainty;
pub mod validation;

pub use error::{OptimizerError, Result};
pub use orchestrator::{
    AlgorithmKind, OptimizationOptions, OptimizationOutcome, Orchestrator, OrchestratorConfig,
};
