//! FAIR-CAM control model: qualitative ratings, effectiveness triads, and
//! the rules for composing several controls acting on the same factor.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::distributions::{ControlStreams, clamp01, stream_key, triangular};
use crate::types::{Bounds, ControlId};

/// Qualitative effectiveness rating entered for each control dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "Very Low")]
    VeryLow,
    Low,
    Moderate,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
    #[default]
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl Rating {
    /// Effectiveness triad for the rating. Ranges tighten and shift up with
    /// each step; N/A contributes nothing.
    pub fn triad(self) -> Bounds {
        match self {
            Rating::VeryLow => Bounds::new(0.0, 0.25, 0.5),
            Rating::Low => Bounds::new(0.4, 0.55, 0.7),
            Rating::Moderate => Bounds::new(0.65, 0.75, 0.85),
            Rating::High => Bounds::new(0.85, 0.9, 0.95),
            Rating::VeryHigh => Bounds::new(0.97, 0.985, 0.999),
            Rating::NotApplicable => Bounds::ZERO,
        }
    }
}

/// How a loss-event control acts on the risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mechanism {
    Avoidance,
    Deterrence,
    Resistance,
    Detection,
    Response,
    Resilience,
    LossMinimization,
}

/// A point in the frequency/loss chain a control can perturb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Tef,
    Susceptibility,
    Lef,
    LossMagnitude,
}

impl Mechanism {
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Mechanism::Avoidance | Mechanism::Deterrence => &[Stage::Tef],
            Mechanism::Resistance => &[Stage::Susceptibility],
            Mechanism::Detection => &[Stage::Lef],
            Mechanism::Response => &[Stage::Lef, Stage::LossMagnitude],
            Mechanism::Resilience | Mechanism::LossMinimization => &[Stage::LossMagnitude],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFunction {
    /// Acts directly on frequency or magnitude.
    LossEvent(Mechanism),
    /// Keeps other controls working; raises their reliability.
    VariantManagement,
    /// Informs decisions; no numeric effect.
    DecisionSupport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlStatus {
    Implemented,
    Proposed,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Baseline,
    WhatIf,
}

/// A risk-mitigation measure attached to a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ControlRecord", into = "ControlRecord")]
pub struct Control {
    pub id: ControlId,
    pub name: String,
    pub function: ControlFunction,
    pub status: ControlStatus,
    pub intended: Rating,
    pub coverage: Rating,
    pub reliability: Rating,
    pub include_in_what_if: bool,
    /// Loss-event controls a variant-management control shores up.
    /// Empty means all of them.
    pub supports: Vec<ControlId>,
}

impl Control {
    /// Pointwise product of the three dimension triads.
    pub fn operational_triad(&self) -> Bounds {
        self.intended.triad().product(self.coverage.triad()).product(self.reliability.triad())
    }

    pub fn is_active(&self, kind: RunKind) -> bool {
        match (kind, self.status) {
            (_, ControlStatus::Implemented) => true,
            (RunKind::Baseline, _) | (_, ControlStatus::Rejected) => false,
            (RunKind::WhatIf, ControlStatus::Proposed) => self.include_in_what_if,
        }
    }
}

/// Controls that take part in a run of the given kind.
pub fn select_controls(controls: &[Control], kind: RunKind) -> Vec<&Control> {
    controls.iter().filter(|c| c.is_active(kind)).collect()
}

pub fn sample_effectiveness(triad: Bounds, rng: &mut impl Rng) -> f64 {
    clamp01(triangular(triad, rng))
}

/// Combined effect of independent reductions on one factor.
///
/// Tracks the surviving fraction `Π(1 − eᵢ)`, so the result is order
/// independent and only reaches 1 if some single effect does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduction {
    survival: f64,
}

impl Reduction {
    pub const NONE: Reduction = Reduction { survival: 1.0 };

    pub fn add(self, effect: f64) -> Reduction {
        Reduction { survival: self.survival * (1.0 - clamp01(effect)) }
    }

    pub fn merge(self, other: Reduction) -> Reduction {
        Reduction { survival: self.survival * other.survival }
    }

    pub fn value(self) -> f64 {
        1.0 - self.survival
    }

    /// Multiplier to apply to the reduced quantity.
    pub fn remaining(self) -> f64 {
        self.survival
    }
}

impl Default for Reduction {
    fn default() -> Self {
        Reduction::NONE
    }
}

pub fn combine_reductions(effects: impl IntoIterator<Item = f64>) -> f64 {
    effects.into_iter().fold(Reduction::NONE, Reduction::add).value()
}

/// Raise a reliability sample towards 1 by a combined VMC effect.
pub fn uplift_reliability(reliability: f64, vmc_effect: f64) -> f64 {
    reliability + vmc_effect * (1.0 - reliability)
}

#[derive(Debug, Clone)]
struct LossEventControl {
    id: ControlId,
    key: u64,
    mechanism: Mechanism,
    intended: Bounds,
    coverage: Bounds,
    reliability: Bounds,
}

#[derive(Debug, Clone)]
struct VariantControl {
    key: u64,
    effectiveness: Bounds,
    supports: Vec<ControlId>,
}

impl VariantControl {
    fn supports(&self, lec: &ControlId) -> bool {
        self.supports.is_empty() || self.supports.contains(lec)
    }
}

/// Where resistance controls land for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResistanceRoute {
    /// Cut the sampled susceptibility directly.
    SusceptibilityCut,
    /// Scale resistance strength before deriving susceptibility.
    ResistanceUplift,
}

/// Combined reductions per bucket for one draw.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reductions {
    pub tef: Reduction,
    pub susceptibility: Reduction,
    pub resistance_uplift: Reduction,
    pub lef: Reduction,
    pub loss: Reduction,
}

impl Reductions {
    /// All frequency-side buckets folded into one, for scenarios estimated
    /// directly at LEF.
    pub fn frequency(&self) -> Reduction {
        self.tef.merge(self.lef).merge(self.susceptibility).merge(self.resistance_uplift)
    }
}

/// Controls partitioned by function and reduced to the triads a draw samples.
#[derive(Debug, Clone, Default)]
pub struct ControlSet {
    lecs: Vec<LossEventControl>,
    vmcs: Vec<VariantControl>,
}

impl ControlSet {
    pub fn new<'a>(controls: impl IntoIterator<Item = &'a Control>) -> Self {
        let mut set = ControlSet::default();
        for control in controls {
            match control.function {
                ControlFunction::LossEvent(mechanism) => {
                    let ratings = [control.intended, control.coverage, control.reliability];
                    if ratings.contains(&Rating::NotApplicable) {
                        tracing::warn!(
                            control = %control.id.0,
                            "loss-event control rated N/A has no effect"
                        );
                    }
                    set.lecs.push(LossEventControl {
                        id: control.id.clone(),
                        key: stream_key(&control.id.0),
                        mechanism,
                        intended: control.intended.triad(),
                        coverage: control.coverage.triad(),
                        reliability: control.reliability.triad(),
                    })
                }
                ControlFunction::VariantManagement => set.vmcs.push(VariantControl {
                    key: stream_key(&control.id.0),
                    effectiveness: control.operational_triad(),
                    supports: control.supports.clone(),
                }),
                ControlFunction::DecisionSupport => {}
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.lecs.is_empty()
    }

    pub fn loss_event_count(&self) -> usize {
        self.lecs.len()
    }

    pub fn variant_count(&self) -> usize {
        self.vmcs.len()
    }

    /// Sample every control once and pool the effects into buckets.
    ///
    /// Each control reads from the block its id keys in `streams`: a VMC
    /// takes one sample, an LEC takes intended, coverage, and reliability
    /// in that order. What one control draws never depends on which other
    /// controls are in the set. Controls sharing an id share samples.
    pub fn sample_reductions(
        &self,
        route: ResistanceRoute,
        streams: &ControlStreams,
    ) -> Reductions {
        let mut out = Reductions::default();
        if self.lecs.is_empty() {
            return out;
        }
        let vmc_effects: Vec<f64> = self
            .vmcs
            .iter()
            .map(|v| sample_effectiveness(v.effectiveness, &mut streams.for_key(v.key)))
            .collect();

        for lec in &self.lecs {
            let mut rng = streams.for_key(lec.key);
            let intended = sample_effectiveness(lec.intended, &mut rng);
            let coverage = sample_effectiveness(lec.coverage, &mut rng);
            let reliability = sample_effectiveness(lec.reliability, &mut rng);
            let uplift = combine_reductions(
                self.vmcs
                    .iter()
                    .zip(&vmc_effects)
                    .filter(|(v, _)| v.supports(&lec.id))
                    .map(|(_, &e)| e),
            );
            let effect = intended * coverage * uplift_reliability(reliability, uplift);

            for stage in lec.mechanism.stages() {
                let bucket = match (stage, route) {
                    (Stage::Tef, _) => &mut out.tef,
                    (Stage::Susceptibility, ResistanceRoute::SusceptibilityCut) => {
                        &mut out.susceptibility
                    }
                    (Stage::Susceptibility, ResistanceRoute::ResistanceUplift) => {
                        &mut out.resistance_uplift
                    }
                    (Stage::Lef, _) => &mut out.lef,
                    (Stage::LossMagnitude, _) => &mut out.loss,
                };
                *bucket = bucket.add(effect);
            }
        }
        out
    }
}

/// Flat wire shape for a control, as the scenario editor stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlRecord {
    id: ControlId,
    #[serde(default)]
    name: String,
    function: FunctionCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mechanism_type: Option<Mechanism>,
    status: ControlStatus,
    #[serde(default)]
    intended_rating: Rating,
    #[serde(default)]
    coverage_rating: Rating,
    #[serde(default)]
    reliability_rating: Rating,
    #[serde(default)]
    include_in_what_if: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    supports: Vec<ControlId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum FunctionCode {
    #[serde(rename = "LEC", alias = "LossEventControl")]
    Lec,
    #[serde(rename = "VMC", alias = "VariantManagementControl")]
    Vmc,
    #[serde(rename = "DSC", alias = "DecisionSupportControl")]
    Dsc,
}

impl TryFrom<ControlRecord> for Control {
    type Error = String;

    fn try_from(r: ControlRecord) -> Result<Self, Self::Error> {
        let function = match (r.function, r.mechanism_type) {
            (FunctionCode::Lec, Some(m)) => ControlFunction::LossEvent(m),
            (FunctionCode::Lec, None) => {
                return Err(format!("loss event control {:?} has no mechanismType", r.id.0));
            }
            (FunctionCode::Vmc, _) => ControlFunction::VariantManagement,
            (FunctionCode::Dsc, _) => ControlFunction::DecisionSupport,
        };
        Ok(Control {
            id: r.id,
            name: r.name,
            function,
            status: r.status,
            intended: r.intended_rating,
            coverage: r.coverage_rating,
            reliability: r.reliability_rating,
            include_in_what_if: r.include_in_what_if,
            supports: r.supports,
        })
    }
}

impl From<Control> for ControlRecord {
    fn from(c: Control) -> Self {
        let (function, mechanism_type) = match c.function {
            ControlFunction::LossEvent(m) => (FunctionCode::Lec, Some(m)),
            ControlFunction::VariantManagement => (FunctionCode::Vmc, None),
            ControlFunction::DecisionSupport => (FunctionCode::Dsc, None),
        };
        ControlRecord {
            id: c.id,
            name: c.name,
            function,
            mechanism_type,
            status: c.status,
            intended_rating: c.intended,
            coverage_rating: c.coverage,
            reliability_rating: c.reliability,
            include_in_what_if: c.include_in_what_if,
            supports: c.supports,
        }
    }
}
