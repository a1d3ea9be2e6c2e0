use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(pub String);

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub String);

/// An uncertain quantity as entered by the user: min / most likely / max.
/// Any field may be absent; see [`Triad::bounds`] for the validated form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Triad {
    pub min: Option<f64>,
    #[serde(rename = "ml", alias = "mostLikely")]
    pub most_likely: Option<f64>,
    pub max: Option<f64>,
}

impl Triad {
    pub fn new(min: f64, most_likely: f64, max: f64) -> Self {
        Triad { min: Some(min), most_likely: Some(most_likely), max: Some(max) }
    }

    /// The empty placeholder used for factors the user has not filled in.
    pub fn empty() -> Self {
        Triad::default()
    }

    /// Validated bounds, or `None` when any field is missing or non-finite,
    /// or when `max < min`. An out-of-range mode is clamped into `[min, max]`.
    pub fn bounds(&self) -> Option<Bounds> {
        let (min, mode, max) = (self.min?, self.most_likely?, self.max?);
        if !(min.is_finite() && mode.is_finite() && max.is_finite()) || max < min {
            return None;
        }
        Some(Bounds { min, mode: mode.clamp(min, max), max })
    }

    pub fn is_valid(&self) -> bool {
        self.bounds().is_some()
    }

    pub(crate) fn scaled(&self, factor: f64) -> Self {
        Triad {
            min: self.min.map(|v| v * factor),
            most_likely: self.most_likely.map(|v| v * factor),
            max: self.max.map(|v| v * factor),
        }
    }
}

/// A validated triad: finite, `min <= mode <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub mode: f64,
    pub max: f64,
}

impl Bounds {
    pub const ZERO: Bounds = Bounds { min: 0.0, mode: 0.0, max: 0.0 };

    pub const fn new(min: f64, mode: f64, max: f64) -> Self {
        Bounds { min, mode, max }
    }

    /// Pointwise product, used to fold independent effectiveness dimensions.
    pub fn product(self, other: Bounds) -> Bounds {
        Bounds {
            min: self.min * other.min,
            mode: self.mode * other.mode,
            max: self.max * other.max,
        }
    }
}

/// Which stage of the frequency chain is estimated directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    #[default]
    #[serde(rename = "LEF")]
    Lef,
    #[serde(rename = "TEF")]
    Tef,
    ContactFrequency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SusceptibilityMode {
    #[default]
    Direct,
    FromCapacityVsResistance,
}

/// Unit in which the susceptibility triad was entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SusceptibilityUnit {
    #[default]
    Fraction,
    Percent,
}

/// A named FAIR factor. `Display` yields the label shown in missing-factor
/// checklists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Factor {
    Lef,
    Tef,
    ContactFrequency,
    ProbabilityOfAction,
    Susceptibility,
    ThreatCapacity,
    ResistanceStrength,
    PrimaryLoss,
    SecondaryLossEventFrequency,
    SecondaryLossMagnitude,
}

impl Factor {
    pub fn label(self) -> &'static str {
        match self {
            Factor::Lef => "LEF",
            Factor::Tef => "TEF",
            Factor::ContactFrequency => "Contact Frequency",
            Factor::ProbabilityOfAction => "Probability of Action",
            Factor::Susceptibility => "Susceptibility",
            Factor::ThreatCapacity => "Threat Capacity",
            Factor::ResistanceStrength => "Resistance Strength",
            Factor::PrimaryLoss => "Primary Loss",
            Factor::SecondaryLossEventFrequency => "Secondary Loss Event Frequency",
            Factor::SecondaryLossMagnitude => "Secondary Loss Magnitude",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
