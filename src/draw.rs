use rand::Rng;
use serde::Serialize;

use crate::config::SUSCEPTIBILITY_SOFTNESS;
use crate::distributions::{clamp01, triangular};
use crate::quant::{FrequencyModel, ScenarioModel, SusceptibilityModel};

/// One simulated year's inputs to the compound Poisson model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Draw {
    /// Expected loss events this year (the Poisson rate).
    pub lef: f64,
    /// Loss if a single event occurs.
    pub per_event_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SusceptibilitySample {
    Direct(f64),
    Derived { capacity: f64, resistance: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrequencySample {
    /// LEF estimated directly.
    Lef(f64),
    /// TEF, either sampled or built from contact frequency × probability of action.
    Chain { tef: f64, susceptibility: SusceptibilitySample },
}

/// Raw factor values for one draw, before any control acts on them.
///
/// Sampling order is fixed: frequency factors in chain order, then primary
/// loss, secondary frequency, secondary magnitude. Controls never change it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorSample {
    pub frequency: FrequencySample,
    pub primary_loss: f64,
    pub secondary_frequency: f64,
    pub secondary_magnitude: f64,
}

pub fn sample_factors(model: &ScenarioModel, rng: &mut impl Rng) -> FactorSample {
    let frequency = match model.frequency {
        FrequencyModel::Lef(lef) => FrequencySample::Lef(floor0(triangular(lef, rng))),
        FrequencyModel::Tef { tef, susceptibility } => {
            let tef = floor0(triangular(tef, rng));
            let susceptibility = sample_susceptibility(susceptibility, rng);
            FrequencySample::Chain { tef, susceptibility }
        }
        FrequencyModel::ContactFrequency { contact, action, susceptibility } => {
            let contact = floor0(triangular(contact, rng));
            let action = clamp01(triangular(action, rng));
            let susceptibility = sample_susceptibility(susceptibility, rng);
            FrequencySample::Chain { tef: contact * action, susceptibility }
        }
    };
    FactorSample {
        frequency,
        primary_loss: floor0(triangular(model.loss.primary, rng)),
        secondary_frequency: floor0(triangular(model.loss.secondary_frequency, rng)),
        secondary_magnitude: floor0(triangular(model.loss.secondary_magnitude, rng)),
    }
}

fn sample_susceptibility(model: SusceptibilityModel, rng: &mut impl Rng) -> SusceptibilitySample {
    match model {
        SusceptibilityModel::Direct(s) => SusceptibilitySample::Direct(clamp01(triangular(s, rng))),
        SusceptibilityModel::Derived { capacity, resistance } => SusceptibilitySample::Derived {
            capacity: floor0(triangular(capacity, rng)),
            resistance: floor0(triangular(resistance, rng)),
        },
    }
}

impl SusceptibilitySample {
    pub fn value(self) -> f64 {
        match self {
            SusceptibilitySample::Direct(s) => s,
            SusceptibilitySample::Derived { capacity, resistance } => {
                derived_susceptibility(capacity, resistance)
            }
        }
    }
}

impl FactorSample {
    /// The uncontrolled draw.
    pub fn evaluate(&self) -> Draw {
        let lef = match self.frequency {
            FrequencySample::Lef(lef) => lef,
            FrequencySample::Chain { tef, susceptibility } => tef * susceptibility.value(),
        };
        Draw {
            lef,
            per_event_loss: per_event_loss(
                self.primary_loss,
                self.secondary_frequency,
                self.secondary_magnitude,
            ),
        }
    }
}

/// Draw one (LEF, per-event loss) pair from the scenario.
pub fn sample_draw(model: &ScenarioModel, rng: &mut impl Rng) -> Draw {
    sample_factors(model, rng).evaluate()
}

/// Logistic in the capacity-resistance gap: 0.5 when they are equal,
/// rising towards 1 as capacity pulls ahead.
pub fn derived_susceptibility(capacity: f64, resistance: f64) -> f64 {
    1.0 / (1.0 + (-(capacity - resistance) / SUSCEPTIBILITY_SOFTNESS).exp())
}

pub(crate) fn per_event_loss(
    primary: f64,
    secondary_frequency: f64,
    secondary_magnitude: f64,
) -> f64 {
    primary + secondary_frequency * secondary_magnitude
}

pub(crate) fn floor0(x: f64) -> f64 {
    if x > 0.0 { x } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::distributions::seeded;
    use crate::quant::LossModel;
    use crate::types::Bounds;

    fn rng() -> ChaCha20Rng {
        seeded(42)
    }

    fn fixed(v: f64) -> Bounds {
        Bounds::new(v, v, v)
    }

    fn loss(primary: f64, slef: f64, slm: f64) -> LossModel {
        LossModel {
            primary: fixed(primary),
            secondary_frequency: fixed(slef),
            secondary_magnitude: fixed(slm),
        }
    }

    #[test]
    fn lef_level_passes_lef_through() {
        let model = ScenarioModel {
            frequency: FrequencyModel::Lef(fixed(3.0)),
            loss: loss(100.0, 0.5, 40.0),
        };
        let draw = sample_draw(&model, &mut rng());
        assert_eq!(draw, Draw { lef: 3.0, per_event_loss: 120.0 });
    }

    #[test]
    fn tef_level_multiplies_susceptibility() {
        let model = ScenarioModel {
            frequency: FrequencyModel::Tef {
                tef: fixed(10.0),
                susceptibility: SusceptibilityModel::Direct(fixed(0.25)),
            },
            loss: loss(1.0, 0.0, 0.0),
        };
        assert_eq!(sample_draw(&model, &mut rng()).lef, 2.5);
    }

    #[test]
    fn contact_level_chains_three_factors() {
        let model = ScenarioModel {
            frequency: FrequencyModel::ContactFrequency {
                contact: fixed(20.0),
                action: fixed(0.5),
                susceptibility: SusceptibilityModel::Direct(fixed(0.1)),
            },
            loss: loss(1.0, 0.0, 0.0),
        };
        assert!((sample_draw(&model, &mut rng()).lef - 1.0).abs() < 1e-12);
    }

    #[test]
    fn probability_of_action_is_clamped() {
        let model = ScenarioModel {
            frequency: FrequencyModel::ContactFrequency {
                contact: fixed(4.0),
                action: fixed(3.0),
                susceptibility: SusceptibilityModel::Direct(fixed(1.0)),
            },
            loss: loss(1.0, 0.0, 0.0),
        };
        assert_eq!(sample_draw(&model, &mut rng()).lef, 4.0);
    }

    #[test]
    fn derived_susceptibility_follows_capacity_gap() {
        assert!((derived_susceptibility(50.0, 50.0) - 0.5).abs() < 1e-12);
        assert!(derived_susceptibility(60.0, 50.0) > 0.99);
        assert!(derived_susceptibility(40.0, 50.0) < 0.01);
        let s = derived_susceptibility(51.0, 50.0);
        assert!(s > 0.5 && s < 1.0);
    }

    #[test]
    fn negative_samples_are_floored() {
        let model = ScenarioModel {
            frequency: FrequencyModel::Lef(Bounds::new(-5.0, -2.0, -1.0)),
            loss: LossModel {
                primary: Bounds::new(-10.0, -5.0, -1.0),
                secondary_frequency: fixed(1.0),
                secondary_magnitude: Bounds::new(-3.0, -2.0, -1.0),
            },
        };
        let draw = sample_draw(&model, &mut rng());
        assert_eq!(draw, Draw { lef: 0.0, per_event_loss: 0.0 });
    }

    #[test]
    fn same_stream_same_draw() {
        let model = ScenarioModel {
            frequency: FrequencyModel::Tef {
                tef: Bounds::new(1.0, 4.0, 12.0),
                susceptibility: SusceptibilityModel::Derived {
                    capacity: Bounds::new(30.0, 50.0, 70.0),
                    resistance: Bounds::new(40.0, 55.0, 80.0),
                },
            },
            loss: LossModel {
                primary: Bounds::new(1_000.0, 5_000.0, 20_000.0),
                secondary_frequency: Bounds::new(0.0, 0.2, 0.5),
                secondary_magnitude: Bounds::new(0.0, 10_000.0, 50_000.0),
            },
        };
        assert_eq!(sample_draw(&model, &mut seeded(9)), sample_draw(&model, &mut seeded(9)));
    }
}
