use serde::{Deserialize, Serialize};

use crate::controls::{Control, ControlFunction, ControlStatus, Mechanism, Rating};
use crate::quant::Quant;
use crate::types::{ControlId, Level, SusceptibilityMode, Triad};

pub const DEFAULT_SIMS: u32 = 10_000;
pub const MIN_SIMS: u32 = 1_000;
pub const MAX_SIMS: u32 = 200_000;

pub const DEFAULT_CURVE_POINTS: usize = 60;
pub const MIN_CURVE_POINTS: usize = 20;
pub const MAX_CURVE_POINTS: usize = 200;

pub const DEFAULT_CHUNK_SIZE: u32 = 2_000;

/// Individual event losses kept per run; later events count towards the
/// total but are not recorded.
pub const MAX_PEL_SAMPLES: usize = 2_000_000;

/// Smoothing constant for the capacity-vs-resistance logistic curve.
pub const SUSCEPTIBILITY_SOFTNESS: f64 = 2.0;

/// Caller-tunable run parameters. Out-of-range values are clamped by
/// [`RunOptions::resolve`], never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    /// Falls back to `quant.sims`.
    pub sim_count: Option<u32>,
    /// Falls back to `quant.seed`; an unseeded run draws one from the OS.
    pub seed: Option<u64>,
    pub curve_points: usize,
    pub chunk_size: u32,
    /// Evaluate each chunk's draws across the rayon pool.
    pub parallel: bool,
    /// Controls applied by a baseline run (implemented ones only).
    pub controls: Option<Vec<Control>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            sim_count: None,
            seed: None,
            curve_points: DEFAULT_CURVE_POINTS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: true,
            controls: None,
        }
    }
}

impl RunOptions {
    pub fn seeded(seed: u64) -> Self {
        RunOptions { seed: Some(seed), ..RunOptions::default() }
    }

    pub fn with_sims(mut self, sims: u32) -> Self {
        self.sim_count = Some(sims);
        self
    }

    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = Some(controls);
        self
    }

    /// Clamp every count into its supported range.
    pub fn resolve(&self, quant: &Quant) -> ResolvedOptions {
        let requested = self.sim_count.unwrap_or(quant.sims);
        let sims = requested.clamp(MIN_SIMS, MAX_SIMS);
        if sims != requested {
            tracing::warn!(requested, sims, "simulation count clamped");
        }
        let curve_points = self.curve_points.clamp(MIN_CURVE_POINTS, MAX_CURVE_POINTS);
        if curve_points != self.curve_points {
            tracing::warn!(
                requested = self.curve_points,
                curve_points,
                "curve point count clamped"
            );
        }
        ResolvedOptions {
            sims,
            seed: self.seed.or(quant.seed),
            curve_points,
            chunk_size: self.chunk_size.clamp(1, sims),
            parallel: self.parallel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub sims: u32,
    pub seed: Option<u64>,
    pub curve_points: usize,
    pub chunk_size: u32,
    pub parallel: bool,
}

/// Demo scenario: a vendor breach estimated directly at the LEF level.
/// Mean ALE is E[LEF] × E[loss] = 7/3 × 26 000/3 ≈ 20 200; zero-event
/// years and the right skew put the median near 15 000.
pub fn canonical_quant() -> Quant {
    Quant {
        level: Level::Lef,
        susceptibility_mode: SusceptibilityMode::Direct,
        lef: Triad::new(1.0, 2.0, 4.0),
        primary_loss: Triad::new(1_000.0, 5_000.0, 20_000.0),
        secondary_loss_event_frequency: Triad::new(0.0, 0.0, 0.0),
        secondary_loss_magnitude: Triad::new(0.0, 0.0, 0.0),
        sims: 20_000,
        seed: Some(42),
        ..Quant::default()
    }
}

/// Controls that go with [`canonical_quant`]: one in place, one proposed,
/// and a monitoring control that shores up the other two.
pub fn canonical_controls() -> Vec<Control> {
    vec![
        Control {
            id: ControlId("mfa".into()),
            name: "Vendor MFA enforcement".into(),
            function: ControlFunction::LossEvent(Mechanism::Resistance),
            status: ControlStatus::Implemented,
            intended: Rating::High,
            coverage: Rating::Moderate,
            reliability: Rating::Moderate,
            include_in_what_if: true,
            supports: Vec::new(),
        },
        Control {
            id: ControlId("ir-retainer".into()),
            name: "Incident response retainer".into(),
            function: ControlFunction::LossEvent(Mechanism::Response),
            status: ControlStatus::Proposed,
            intended: Rating::High,
            coverage: Rating::High,
            reliability: Rating::Moderate,
            include_in_what_if: true,
            supports: Vec::new(),
        },
        Control {
            id: ControlId("soc-review".into()),
            name: "Quarterly SOC 2 report review".into(),
            function: ControlFunction::VariantManagement,
            status: ControlStatus::Proposed,
            intended: Rating::Moderate,
            coverage: Rating::High,
            reliability: Rating::High,
            include_in_what_if: true,
            supports: Vec::new(),
        },
    ]
}
