//! Monte Carlo engine for FAIR risk quantification.
//!
//! A [`Quant`] describes one loss scenario as triangular estimates; the
//! engine samples it into annual loss and per-event loss distributions,
//! optionally with FAIR-CAM controls applied, and summarizes the samples as
//! percentile stats and a loss exceedance curve.

pub mod analysis;
pub mod config;
pub mod controlled;
pub mod controls;
pub mod distributions;
pub mod draw;
pub mod error;
pub mod portfolio;
pub mod quant;
pub mod simulation;
pub mod types;

pub use analysis::{CurvePoint, DistStats, RunStats};
pub use config::RunOptions;
pub use controls::{Control, ControlFunction, ControlStatus, Mechanism, Rating};
pub use error::{EngineError, Result};
pub use portfolio::{ControlsImpact, ScenarioInput, ScenarioReport, run_portfolio};
pub use quant::{Quant, Validation};
pub use simulation::{RunObserver, RunResult, Simulation, run_baseline, run_what_if, validate};
pub use types::{Factor, Level, SusceptibilityMode, Triad};
