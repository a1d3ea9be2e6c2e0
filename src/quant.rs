use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::{CurvePoint, RunStats};
use crate::config::DEFAULT_SIMS;
use crate::error::{EngineError, Result};
use crate::simulation::RunResult;
use crate::types::{Bounds, Factor, Level, SusceptibilityMode, SusceptibilityUnit, Triad};

/// One scenario's full FAIR parameterization, always structurally complete.
///
/// Susceptibility is held as a fraction in `[0, 1]`; [`Quant::canonicalize`]
/// converts percentage input at the boundary. The trailing output fields are
/// written by [`Quant::record`] and are empty before the first run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Quant {
    pub level: Level,
    pub susceptibility_mode: SusceptibilityMode,

    pub lef: Triad,
    pub tef: Triad,
    pub contact_frequency: Triad,
    pub probability_of_action: Triad,
    pub susceptibility: Triad,
    pub threat_capacity: Triad,
    pub resistance_strength: Triad,

    pub primary_loss: Triad,
    pub secondary_loss_event_frequency: Triad,
    pub secondary_loss_magnitude: Triad,

    pub sims: u32,
    pub seed: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ale_samples: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pel_samples: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub curve: Vec<CurvePoint>,
}

impl Default for Quant {
    fn default() -> Self {
        Quant {
            level: Level::Lef,
            susceptibility_mode: SusceptibilityMode::Direct,
            lef: Triad::empty(),
            tef: Triad::empty(),
            contact_frequency: Triad::empty(),
            probability_of_action: Triad::empty(),
            susceptibility: Triad::empty(),
            threat_capacity: Triad::empty(),
            resistance_strength: Triad::empty(),
            primary_loss: Triad::empty(),
            secondary_loss_event_frequency: Triad::empty(),
            secondary_loss_magnitude: Triad::empty(),
            sims: DEFAULT_SIMS,
            seed: None,
            last_run_at: None,
            stats: None,
            ale_samples: Vec::new(),
            pel_samples: Vec::new(),
            curve: Vec::new(),
        }
    }
}

/// Outcome of [`Quant::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub ok: bool,
    pub missing: Vec<Factor>,
}

impl Validation {
    pub fn missing_names(&self) -> Vec<String> {
        self.missing.iter().map(|f| f.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SusceptibilityModel {
    Direct(Bounds),
    Derived { capacity: Bounds, resistance: Bounds },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrequencyModel {
    Lef(Bounds),
    Tef { tef: Bounds, susceptibility: SusceptibilityModel },
    ContactFrequency { contact: Bounds, action: Bounds, susceptibility: SusceptibilityModel },
}

impl FrequencyModel {
    /// Largest LEF a draw can produce: susceptibility and probability of
    /// action never exceed 1.
    pub fn max_rate(&self) -> f64 {
        match *self {
            FrequencyModel::Lef(lef) => lef.max,
            FrequencyModel::Tef { tef, .. } => tef.max,
            FrequencyModel::ContactFrequency { contact, action, .. } => {
                contact.max * action.max.clamp(0.0, 1.0)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossModel {
    pub primary: Bounds,
    pub secondary_frequency: Bounds,
    pub secondary_magnitude: Bounds,
}

/// A validated quant, reduced to exactly the triads its level samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioModel {
    pub frequency: FrequencyModel,
    pub loss: LossModel,
}

impl Quant {
    /// Build a complete quant from loosely shaped JSON.
    ///
    /// Never fails: unknown enum strings fall back to defaults, absent
    /// triads become empty placeholders, triad fields may be numbers or
    /// numeric strings, and previously computed output fields are kept.
    pub fn canonicalize(raw: &Value) -> Quant {
        let mut quant = Quant {
            level: raw.get("level").and_then(parse_level).unwrap_or_default(),
            susceptibility_mode: raw
                .get("susceptibilityMode")
                .and_then(parse_susceptibility_mode)
                .unwrap_or_default(),
            lef: triad_at(raw, "lef"),
            tef: triad_at(raw, "tef"),
            contact_frequency: triad_at(raw, "contactFrequency"),
            probability_of_action: triad_at(raw, "probabilityOfAction"),
            susceptibility: triad_at(raw, "susceptibility"),
            threat_capacity: triad_at(raw, "threatCapacity"),
            resistance_strength: triad_at(raw, "resistanceStrength"),
            primary_loss: triad_at(raw, "primaryLoss"),
            secondary_loss_event_frequency: triad_at(raw, "secondaryLossEventFrequency"),
            secondary_loss_magnitude: triad_at(raw, "secondaryLossMagnitude"),
            sims: raw.get("sims").and_then(number).map(normalize_sims).unwrap_or(DEFAULT_SIMS),
            seed: raw
                .get("seed")
                .and_then(number)
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(|s| s as u64),
            last_run_at: decode(raw, "lastRunAt"),
            stats: decode(raw, "stats"),
            ale_samples: decode(raw, "aleSamples").unwrap_or_default(),
            pel_samples: decode(raw, "pelSamples").unwrap_or_default(),
            curve: decode(raw, "curve").unwrap_or_default(),
        };

        let unit = raw
            .get("susceptibilityUnit")
            .and_then(Value::as_str)
            .and_then(parse_unit)
            .unwrap_or_else(|| infer_unit(&quant.susceptibility));
        if unit == SusceptibilityUnit::Percent {
            quant.susceptibility = quant.susceptibility.scaled(0.01);
        }
        quant
    }

    pub fn validate(&self) -> Validation {
        let (_, missing) = self.resolve();
        Validation { ok: missing.is_empty(), missing }
    }

    /// The typed model the samplers consume, or every missing factor.
    pub fn model(&self) -> Result<ScenarioModel> {
        match self.resolve() {
            (Some(model), _) => Ok(model),
            (None, missing) => Err(EngineError::InvalidInput { missing }),
        }
    }

    /// Cache a run's output on the quant, replacing any earlier run.
    pub fn record(&mut self, result: &RunResult) {
        self.sims = result.sims;
        self.last_run_at = Some(result.last_run_at);
        self.stats = Some(result.stats.clone());
        self.ale_samples = result.ale_samples.clone();
        self.pel_samples = result.pel_samples.clone();
        self.curve = result.curve.clone();
    }

    fn resolve(&self) -> (Option<ScenarioModel>, Vec<Factor>) {
        let mut missing = Vec::new();
        let mut require = |factor: Factor, triad: &Triad| {
            let bounds = triad.bounds();
            if bounds.is_none() {
                missing.push(factor);
            }
            bounds
        };

        let frequency = match self.level {
            Level::Lef => require(Factor::Lef, &self.lef).map(FrequencyModel::Lef),
            Level::Tef => {
                let tef = require(Factor::Tef, &self.tef);
                let susceptibility = self.susceptibility_model(&mut require);
                tef.zip(susceptibility)
                    .map(|(tef, susceptibility)| FrequencyModel::Tef { tef, susceptibility })
            }
            Level::ContactFrequency => {
                let contact = require(Factor::ContactFrequency, &self.contact_frequency);
                let action = require(Factor::ProbabilityOfAction, &self.probability_of_action);
                let susceptibility = self.susceptibility_model(&mut require);
                match (contact, action, susceptibility) {
                    (Some(contact), Some(action), Some(susceptibility)) => {
                        Some(FrequencyModel::ContactFrequency { contact, action, susceptibility })
                    }
                    _ => None,
                }
            }
        };

        let primary = require(Factor::PrimaryLoss, &self.primary_loss);
        let secondary_frequency =
            require(Factor::SecondaryLossEventFrequency, &self.secondary_loss_event_frequency);
        let secondary_magnitude =
            require(Factor::SecondaryLossMagnitude, &self.secondary_loss_magnitude);

        let model = match (frequency, primary, secondary_frequency, secondary_magnitude) {
            (Some(frequency), Some(primary), Some(sl_frequency), Some(sl_magnitude)) => {
                let loss = LossModel {
                    primary,
                    secondary_frequency: sl_frequency,
                    secondary_magnitude: sl_magnitude,
                };
                Some(ScenarioModel { frequency, loss })
            }
            _ => None,
        };
        (model, missing)
    }

    fn susceptibility_model(
        &self,
        require: &mut impl FnMut(Factor, &Triad) -> Option<Bounds>,
    ) -> Option<SusceptibilityModel> {
        match self.susceptibility_mode {
            SusceptibilityMode::Direct => {
                let susceptibility = require(Factor::Susceptibility, &self.susceptibility);
                susceptibility.map(SusceptibilityModel::Direct)
            }
            SusceptibilityMode::FromCapacityVsResistance => {
                let capacity = require(Factor::ThreatCapacity, &self.threat_capacity);
                let resistance = require(Factor::ResistanceStrength, &self.resistance_strength);
                let (capacity, resistance) = capacity.zip(resistance)?;
                Some(SusceptibilityModel::Derived { capacity, resistance })
            }
        }
    }
}

/// Serde adapter that routes a field through [`Quant::canonicalize`].
pub fn deserialize_canonical<'de, D>(deserializer: D) -> std::result::Result<Quant, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(Quant::canonicalize(&raw))
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn triad_at(raw: &Value, key: &str) -> Triad {
    let Some(t) = raw.get(key) else {
        return Triad::empty();
    };
    Triad {
        min: t.get("min").and_then(number),
        most_likely: t.get("ml").or_else(|| t.get("mostLikely")).and_then(number),
        max: t.get("max").and_then(number),
    }
}

fn decode<T: serde::de::DeserializeOwned>(raw: &Value, key: &str) -> Option<T> {
    raw.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn normalize_sims(n: f64) -> u32 {
    if !n.is_finite() || n < 1.0 {
        return DEFAULT_SIMS;
    }
    n.round().min(u32::MAX as f64) as u32
}

fn parse_level(v: &Value) -> Option<Level> {
    match v.as_str()?.trim().to_ascii_lowercase().as_str() {
        "lef" => Some(Level::Lef),
        "tef" => Some(Level::Tef),
        "contactfrequency" | "contact_frequency" | "contact" | "cf" => {
            Some(Level::ContactFrequency)
        }
        _ => None,
    }
}

fn parse_susceptibility_mode(v: &Value) -> Option<SusceptibilityMode> {
    match v.as_str()?.trim().to_ascii_lowercase().as_str() {
        "direct" => Some(SusceptibilityMode::Direct),
        "fromcapacityvsresistance" | "derived" | "tcvsrs" => {
            Some(SusceptibilityMode::FromCapacityVsResistance)
        }
        _ => None,
    }
}

fn parse_unit(s: &str) -> Option<SusceptibilityUnit> {
    match s.trim().to_ascii_lowercase().as_str() {
        "percent" | "pct" | "%" => Some(SusceptibilityUnit::Percent),
        "fraction" | "ratio" => Some(SusceptibilityUnit::Fraction),
        _ => None,
    }
}

/// No probability exceeds 1, so a triad topping out above it was typed as a
/// percentage.
fn infer_unit(triad: &Triad) -> SusceptibilityUnit {
    match triad.max {
        Some(max) if max > 1.0 => SusceptibilityUnit::Percent,
        _ => SusceptibilityUnit::Fraction,
    }
}
