use rand::Rng;
use serde::Serialize;

use crate::controls::{ControlSet, Reductions, ResistanceRoute};
use crate::distributions::ControlStreams;
use crate::draw::{
    Draw, FactorSample, FrequencySample, SusceptibilitySample, derived_susceptibility,
    per_event_loss, sample_factors,
};
use crate::quant::ScenarioModel;

/// Intermediate values of a controlled draw, for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawTrace {
    /// TEF after avoidance/deterrence; `None` for LEF-level scenarios.
    pub effective_tef: Option<f64>,
    pub effective_susceptibility: Option<f64>,
    pub tef_cut: f64,
    pub susceptibility_cut: f64,
    pub resistance_uplift: f64,
    pub lef_cut: f64,
    /// Aggregate frequency cut applied to a directly estimated LEF.
    pub frequency_cut: f64,
    pub loss_cut: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlledDraw {
    pub draw: Draw,
    pub trace: DrawTrace,
}

/// One draw with controls applied.
///
/// Scenario factors come from `scenario_rng` exactly as in
/// [`crate::draw::sample_draw`]; control effectiveness comes from
/// `control_streams`. With no loss-event controls the result equals the
/// uncontrolled draw bit for bit.
pub fn sample_controlled_draw(
    model: &ScenarioModel,
    controls: &ControlSet,
    scenario_rng: &mut impl Rng,
    control_streams: &ControlStreams,
) -> ControlledDraw {
    let factors = sample_factors(model, scenario_rng);
    let route = match factors.frequency {
        FrequencySample::Chain { susceptibility: SusceptibilitySample::Derived { .. }, .. } => {
            ResistanceRoute::ResistanceUplift
        }
        _ => ResistanceRoute::SusceptibilityCut,
    };
    let reductions = controls.sample_reductions(route, control_streams);
    apply_reductions(&factors, &reductions)
}

pub fn apply_reductions(factors: &FactorSample, r: &Reductions) -> ControlledDraw {
    let mut trace = DrawTrace {
        tef_cut: r.tef.value(),
        susceptibility_cut: r.susceptibility.value(),
        resistance_uplift: r.resistance_uplift.value(),
        lef_cut: r.lef.value(),
        loss_cut: r.loss.value(),
        ..DrawTrace::default()
    };

    let lef = match factors.frequency {
        FrequencySample::Lef(lef) => {
            let frequency = r.frequency();
            trace.frequency_cut = frequency.value();
            lef * frequency.remaining()
        }
        FrequencySample::Chain { tef, susceptibility } => {
            let tef = tef * r.tef.remaining();
            let susceptibility = match susceptibility {
                SusceptibilitySample::Direct(s) => s * r.susceptibility.remaining(),
                SusceptibilitySample::Derived { capacity, resistance } => {
                    let uplift = 1.0 + r.resistance_uplift.value();
                    derived_susceptibility(capacity, resistance * uplift)
                }
            };
            trace.effective_tef = Some(tef);
            trace.effective_susceptibility = Some(susceptibility);
            tef * susceptibility * r.lef.remaining()
        }
    };

    let magnitude = r.loss.remaining();
    let draw = Draw {
        lef,
        per_event_loss: per_event_loss(
            factors.primary_loss * magnitude,
            factors.secondary_frequency,
            factors.secondary_magnitude * magnitude,
        ),
    };
    ControlledDraw { draw, trace }
}

#[cfg(test)]
mod tests {
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::controls::{Control, ControlFunction, ControlStatus, Mechanism, Rating, Reduction};
    use crate::distributions::seeded;
    use crate::draw::sample_draw;
    use crate::quant::{FrequencyModel, LossModel, SusceptibilityModel};
    use crate::types::{Bounds, ControlId};

    fn rngs(seed: u64) -> (ChaCha20Rng, ControlStreams) {
        (seeded(seed), ControlStreams::from_seed(seed.wrapping_add(1_000)))
    }

    fn loss() -> LossModel {
        LossModel {
            primary: Bounds::new(1_000.0, 5_000.0, 20_000.0),
            secondary_frequency: Bounds::new(0.0, 0.3, 0.6),
            secondary_magnitude: Bounds::new(500.0, 2_000.0, 9_000.0),
        }
    }

    fn models() -> Vec<ScenarioModel> {
        let direct = SusceptibilityModel::Direct(Bounds::new(0.1, 0.3, 0.6));
        let derived = SusceptibilityModel::Derived {
            capacity: Bounds::new(40.0, 55.0, 70.0),
            resistance: Bounds::new(35.0, 50.0, 65.0),
        };
        vec![
            ScenarioModel {
                frequency: FrequencyModel::Lef(Bounds::new(1.0, 2.0, 4.0)),
                loss: loss(),
            },
            ScenarioModel {
                frequency: FrequencyModel::Tef {
                    tef: Bounds::new(2.0, 6.0, 12.0),
                    susceptibility: direct,
                },
                loss: loss(),
            },
            ScenarioModel {
                frequency: FrequencyModel::Tef {
                    tef: Bounds::new(2.0, 6.0, 12.0),
                    susceptibility: derived,
                },
                loss: loss(),
            },
            ScenarioModel {
                frequency: FrequencyModel::ContactFrequency {
                    contact: Bounds::new(10.0, 20.0, 40.0),
                    action: Bounds::new(0.1, 0.2, 0.4),
                    susceptibility: derived,
                },
                loss: loss(),
            },
        ]
    }

    fn lec(mechanism: Mechanism) -> Control {
        Control {
            id: ControlId(format!("{mechanism:?}")),
            name: format!("{mechanism:?}"),
            function: ControlFunction::LossEvent(mechanism),
            status: ControlStatus::Implemented,
            intended: Rating::High,
            coverage: Rating::Moderate,
            reliability: Rating::High,
            include_in_what_if: false,
            supports: Vec::new(),
        }
    }

    const ALL_MECHANISMS: [Mechanism; 7] = [
        Mechanism::Avoidance,
        Mechanism::Deterrence,
        Mechanism::Resistance,
        Mechanism::Detection,
        Mechanism::Response,
        Mechanism::Resilience,
        Mechanism::LossMinimization,
    ];

    #[test]
    fn no_controls_matches_base_sampler_exactly() {
        let empty = ControlSet::default();
        for model in models() {
            for seed in 0..50 {
                let (mut s, c) = rngs(seed);
                let controlled = sample_controlled_draw(&model, &empty, &mut s, &c);
                let base = sample_draw(&model, &mut seeded(seed));
                assert_eq!(controlled.draw, base, "seed {seed}");
            }
        }
    }

    #[test]
    fn every_mechanism_never_increases_frequency_or_magnitude() {
        let empty = ControlSet::default();
        for mechanism in ALL_MECHANISMS {
            let control = lec(mechanism);
            let set = ControlSet::new([&control]);
            for model in models() {
                for seed in 0..50 {
                    let (mut s, c) = rngs(seed);
                    let with = sample_controlled_draw(&model, &set, &mut s, &c).draw;
                    let (mut s, c) = rngs(seed);
                    let without = sample_controlled_draw(&model, &empty, &mut s, &c).draw;
                    assert!(with.lef <= without.lef, "{mechanism:?} raised LEF");
                    let raised = with.per_event_loss > without.per_event_loss;
                    assert!(!raised, "{mechanism:?} raised loss");
                }
            }
        }
    }

    #[test]
    fn loss_controls_leave_frequency_alone() {
        let control = lec(Mechanism::Resilience);
        let set = ControlSet::new([&control]);
        let model = models()[1];
        let (mut s, c) = rngs(11);
        let with = sample_controlled_draw(&model, &set, &mut s, &c);
        let base = sample_draw(&model, &mut seeded(11));
        assert_eq!(with.draw.lef, base.lef);
        assert!(with.draw.per_event_loss < base.per_event_loss);
        assert!(with.trace.loss_cut > 0.0);
    }

    #[test]
    fn lef_level_folds_all_frequency_buckets() {
        let factors = FactorSample {
            frequency: FrequencySample::Lef(10.0),
            primary_loss: 100.0,
            secondary_frequency: 0.0,
            secondary_magnitude: 0.0,
        };
        let r = Reductions {
            tef: Reduction::NONE.add(0.5),
            lef: Reduction::NONE.add(0.5),
            ..Reductions::default()
        };
        let out = apply_reductions(&factors, &r);
        assert_eq!(out.draw.lef, 2.5);
        assert_eq!(out.trace.frequency_cut, 0.75);
        assert_eq!(out.trace.effective_tef, None);
    }

    #[test]
    fn chain_applies_cuts_at_each_stage() {
        let factors = FactorSample {
            frequency: FrequencySample::Chain {
                tef: 8.0,
                susceptibility: SusceptibilitySample::Direct(0.5),
            },
            primary_loss: 1_000.0,
            secondary_frequency: 0.5,
            secondary_magnitude: 400.0,
        };
        let r = Reductions {
            tef: Reduction::NONE.add(0.5),
            susceptibility: Reduction::NONE.add(0.5),
            lef: Reduction::NONE.add(0.5),
            loss: Reduction::NONE.add(0.5),
            ..Reductions::default()
        };
        let out = apply_reductions(&factors, &r);
        assert_eq!(out.trace.effective_tef, Some(4.0));
        assert_eq!(out.trace.effective_susceptibility, Some(0.25));
        assert_eq!(out.draw.lef, 0.5);
        assert_eq!(out.draw.per_event_loss, 500.0 + 0.5 * 200.0);
    }

    #[test]
    fn resistance_uplift_scales_resistance_strength() {
        let factors = FactorSample {
            frequency: FrequencySample::Chain {
                tef: 1.0,
                susceptibility: SusceptibilitySample::Derived { capacity: 10.0, resistance: 10.0 },
            },
            primary_loss: 0.0,
            secondary_frequency: 0.0,
            secondary_magnitude: 0.0,
        };
        let r = Reductions { resistance_uplift: Reduction::NONE.add(0.5), ..Reductions::default() };
        let out = apply_reductions(&factors, &r);
        assert_eq!(out.trace.effective_susceptibility, Some(derived_susceptibility(10.0, 15.0)));
        assert!(out.draw.lef < 0.5);
    }
}
