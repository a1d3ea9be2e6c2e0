use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::RunOptions;
use crate::controls::{Control, ControlStatus};
use crate::quant::Quant;
use crate::simulation::{RunResult, run_baseline, run_what_if};
use crate::types::ScenarioId;

/// One vendor scenario as the dashboard hands it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioInput {
    #[serde(default)]
    pub id: ScenarioId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(deserialize_with = "crate::quant::deserialize_canonical")]
    pub quant: Quant,
    #[serde(default)]
    pub controls: Vec<Control>,
}

/// Change in ALE headline figures from baseline to what-if. Negative values
/// mean the proposed controls lower the loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsImpact {
    pub delta_min: f64,
    pub delta_ml: f64,
    pub delta_p90: f64,
    pub delta_max: f64,
    pub delta_mean: f64,
}

impl ControlsImpact {
    /// Only meaningful for runs that shared a seed.
    pub fn between(baseline: &RunResult, what_if: &RunResult) -> Option<Self> {
        if baseline.seed != what_if.seed || baseline.sims != what_if.sims {
            return None;
        }
        let (b, w) = (&baseline.stats.ale, &what_if.stats.ale);
        Some(ControlsImpact {
            delta_min: w.min - b.min,
            delta_ml: w.ml - b.ml,
            delta_p90: w.p90 - b.p90,
            delta_max: w.max - b.max,
            delta_mean: w.mean - b.mean,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub id: ScenarioId,
    pub name: String,
    pub vendor: String,
    /// Factor labels when the scenario could not be run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<RunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub what_if: Option<RunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<ControlsImpact>,
}

impl ScenarioReport {
    pub fn is_runnable(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Run baseline and what-if for one scenario on a shared seed.
///
/// The baseline applies the scenario's implemented controls; the what-if is
/// skipped when nothing beyond them is proposed.
pub fn run_scenario(input: &ScenarioInput, options: &RunOptions) -> ScenarioReport {
    let mut report = ScenarioReport {
        id: input.id.clone(),
        name: input.name.clone(),
        vendor: input.vendor.clone(),
        missing: Vec::new(),
        baseline: None,
        what_if: None,
        impact: None,
    };

    let mut baseline_opts = options.clone();
    baseline_opts.controls = Some(input.controls.clone());
    let baseline = match run_baseline(&input.quant, &baseline_opts) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(scenario = %input.id.0, error = %e, "scenario skipped");
            report.missing = e.missing_factors();
            return report;
        }
    };

    let proposes_more = input
        .controls
        .iter()
        .any(|c| c.status == ControlStatus::Proposed && c.include_in_what_if);
    if proposes_more {
        // Pin the what-if to the seed the baseline actually used.
        let paired = RunOptions { seed: Some(baseline.seed), ..options.clone() };
        match run_what_if(&input.quant, &input.controls, &paired) {
            Ok(what_if) => {
                report.impact = ControlsImpact::between(&baseline, &what_if);
                report.what_if = Some(what_if);
            }
            Err(e) => tracing::warn!(scenario = %input.id.0, error = %e, "what-if run failed"),
        }
    }
    report.baseline = Some(baseline);
    report
}

/// Run every scenario across the rayon pool. Reports come back in input
/// order; each scenario owns its own random streams.
pub fn run_portfolio(inputs: &[ScenarioInput], options: &RunOptions) -> Vec<ScenarioReport> {
    tracing::info!(scenarios = inputs.len(), "running portfolio");
    inputs.par_iter().map(|input| run_scenario(input, options)).collect()
}

/// Runnable reports ordered by baseline p90, largest exposure first.
pub fn rank_by_p90(reports: &[ScenarioReport]) -> Vec<&ScenarioReport> {
    let mut ranked: Vec<&ScenarioReport> =
        reports.iter().filter(|r| r.baseline.is_some()).collect();
    ranked.sort_by(|a, b| {
        let p90 = |r: &ScenarioReport| r.baseline.as_ref().map_or(0.0, |b| b.stats.ale.p90);
        p90(b).total_cmp(&p90(a))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{canonical_controls, canonical_quant};
    use crate::controls::{ControlFunction, Mechanism, Rating};
    use crate::types::{ControlId, Triad};

    fn input(id: &str, quant: Quant, controls: Vec<Control>) -> ScenarioInput {
        ScenarioInput {
            id: ScenarioId(id.into()),
            name: format!("{id} breach"),
            vendor: format!("{id} Ltd"),
            quant,
            controls,
        }
    }

    fn options() -> RunOptions {
        RunOptions::seeded(42).with_sims(2_000)
    }

    #[test]
    fn proposed_controls_lower_p90() {
        let payroll = input("payroll", canonical_quant(), canonical_controls());
        let report = run_scenario(&payroll, &options());
        assert!(report.is_runnable());
        let impact = report.impact.unwrap();
        assert!(impact.delta_p90 < 0.0, "delta p90 {}", impact.delta_p90);
        assert!(impact.delta_mean < 0.0);
        let (b, w) = (report.baseline.unwrap(), report.what_if.unwrap());
        assert_eq!(b.seed, w.seed);
        assert_eq!(impact.delta_p90, w.stats.ale.p90 - b.stats.ale.p90);
    }

    #[test]
    fn proposed_control_listed_first_keeps_samples_paired() {
        let proposed = Control {
            id: ControlId("backups".into()),
            name: "Offline backups".into(),
            function: ControlFunction::LossEvent(Mechanism::Resilience),
            status: ControlStatus::Proposed,
            intended: Rating::VeryLow,
            coverage: Rating::VeryLow,
            reliability: Rating::VeryLow,
            include_in_what_if: true,
            supports: Vec::new(),
        };
        let implemented = Control {
            id: ControlId("edr".into()),
            name: "Endpoint detection".into(),
            function: ControlFunction::LossEvent(Mechanism::Detection),
            status: ControlStatus::Implemented,
            intended: Rating::Low,
            coverage: Rating::Low,
            reliability: Rating::Low,
            include_in_what_if: true,
            supports: Vec::new(),
        };
        let report = run_scenario(
            &input("payroll", canonical_quant(), vec![proposed, implemented]),
            &RunOptions::seeded(42).with_sims(20_000),
        );
        let (b, w) = (report.baseline.unwrap(), report.what_if.unwrap());
        let raised = w.ale_samples.iter().zip(&b.ale_samples).filter(|(w, b)| w > b).count();
        assert_eq!(raised, 0, "{raised} of {} paired draws went up", b.sims);
        assert!(report.impact.unwrap().delta_p90 <= 0.0);
    }

    #[test]
    fn nothing_proposed_skips_what_if() {
        let mut controls = canonical_controls();
        controls.retain(|c| c.status == ControlStatus::Implemented);
        let report = run_scenario(&input("crm", canonical_quant(), controls), &options());
        assert!(report.baseline.is_some());
        assert!(report.what_if.is_none());
        assert!(report.impact.is_none());
    }

    #[test]
    fn invalid_scenario_is_reported_not_dropped() {
        let broken = Quant { lef: Triad::empty(), ..canonical_quant() };
        let inputs = vec![
            input("ok", canonical_quant(), Vec::new()),
            input("broken", broken, Vec::new()),
        ];
        let reports = run_portfolio(&inputs, &options());
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id.0, "ok");
        assert!(reports[0].is_runnable());
        assert_eq!(reports[1].missing, vec!["LEF"]);
        assert!(reports[1].baseline.is_none());
    }

    #[test]
    fn portfolio_matches_individual_runs() {
        let inputs = vec![
            input("a", canonical_quant(), canonical_controls()),
            input(
                "b",
                Quant { primary_loss: Triad::new(10.0, 50.0, 90.0), ..canonical_quant() },
                Vec::new(),
            ),
        ];
        let reports = run_portfolio(&inputs, &options());
        for (report, inp) in reports.iter().zip(&inputs) {
            let single = run_scenario(inp, &options());
            assert_eq!(
                report.baseline.as_ref().map(|r| &r.ale_samples),
                single.baseline.as_ref().map(|r| &r.ale_samples)
            );
        }
    }

    #[test]
    fn ranking_puts_largest_exposure_first() {
        let small = Quant { primary_loss: Triad::new(10.0, 20.0, 30.0), ..canonical_quant() };
        let reports = run_portfolio(
            &[input("small", small, Vec::new()), input("large", canonical_quant(), Vec::new())],
            &options(),
        );
        let ranked: Vec<&str> = rank_by_p90(&reports).iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ranked, vec!["large", "small"]);
    }

    #[test]
    fn impact_requires_shared_seed() {
        let quant = canonical_quant();
        let a = run_baseline(&quant, &RunOptions::seeded(1).with_sims(1_000)).unwrap();
        let b = run_baseline(&quant, &RunOptions::seeded(2).with_sims(1_000)).unwrap();
        assert!(ControlsImpact::between(&a, &b).is_none());
        let same = ControlsImpact::between(&a, &a).unwrap();
        assert_eq!(same.delta_p90, 0.0);
    }

    #[test]
    fn scenario_input_reads_dashboard_json() {
        let inp: ScenarioInput = serde_json::from_str(
            r#"{"id":"s1","vendor":"Acme","quant":{"level":"LEF","lef":{"min":1,"ml":2,"max":4},
                "primaryLoss":{"min":1000,"ml":5000,"max":20000},
                "secondaryLossEventFrequency":{"min":0,"ml":0,"max":0},
                "secondaryLossMagnitude":{"min":0,"ml":0,"max":0}},
                "controls":[{"id":"c1","function":"DSC","status":"Implemented"}]}"#,
        )
        .unwrap();
        assert!(inp.quant.validate().ok);
        assert_eq!(inp.controls.len(), 1);
        assert_eq!(inp.quant.sims, crate::config::DEFAULT_SIMS);
    }
}
