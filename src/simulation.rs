use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::{CurvePoint, RunStats, SortedSamples};
use crate::config::{MAX_PEL_SAMPLES, ResolvedOptions, RunOptions};
use crate::controlled::{DrawTrace, sample_controlled_draw};
use crate::controls::{Control, ControlSet, RunKind, select_controls};
use crate::distributions::{DrawStreams, SATURATING_LAMBDA, entropy_seed, poisson};
use crate::draw::sample_draw;
use crate::error::{EngineError, Result};
use crate::quant::{Quant, ScenarioModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub done: u32,
    pub total: u32,
}

/// Hooks called at chunk boundaries.
pub trait RunObserver {
    fn on_progress(&mut self, _progress: Progress) {}

    /// Checked before every chunk; returning true aborts the run.
    fn should_cancel(&mut self) -> bool {
        false
    }
}

impl RunObserver for () {}

/// Cancellation flag shared with another thread.
impl RunObserver for &AtomicBool {
    fn should_cancel(&mut self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Observer built from a pair of closures.
pub struct Callbacks<P, C> {
    pub on_progress: P,
    pub should_cancel: C,
}

impl<P, C> RunObserver for Callbacks<P, C>
where
    P: FnMut(Progress),
    C: FnMut() -> bool,
{
    fn on_progress(&mut self, progress: Progress) {
        (self.on_progress)(progress)
    }

    fn should_cancel(&mut self) -> bool {
        (self.should_cancel)()
    }
}

/// Mean trace values over a controls-aware run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    pub loss_event_controls: usize,
    pub variant_controls: usize,
    pub mean_effective_tef: Option<f64>,
    pub mean_effective_susceptibility: Option<f64>,
    pub mean_tef_cut: f64,
    pub mean_susceptibility_cut: f64,
    pub mean_resistance_uplift: f64,
    pub mean_lef_cut: f64,
    pub mean_frequency_cut: f64,
    pub mean_loss_cut: f64,
}

#[derive(Debug, Clone, Default)]
struct TraceTotals {
    draws: u64,
    chain_draws: u64,
    effective_tef: f64,
    effective_susceptibility: f64,
    tef_cut: f64,
    susceptibility_cut: f64,
    resistance_uplift: f64,
    lef_cut: f64,
    frequency_cut: f64,
    loss_cut: f64,
}

impl TraceTotals {
    fn add(&mut self, t: &DrawTrace) {
        self.draws += 1;
        if let (Some(tef), Some(s)) = (t.effective_tef, t.effective_susceptibility) {
            self.chain_draws += 1;
            self.effective_tef += tef;
            self.effective_susceptibility += s;
        }
        self.tef_cut += t.tef_cut;
        self.susceptibility_cut += t.susceptibility_cut;
        self.resistance_uplift += t.resistance_uplift;
        self.lef_cut += t.lef_cut;
        self.frequency_cut += t.frequency_cut;
        self.loss_cut += t.loss_cut;
    }

    fn summary(&self, controls: &ControlSet) -> TraceSummary {
        let n = self.draws.max(1) as f64;
        let chain = (self.chain_draws > 0).then_some(self.chain_draws as f64);
        TraceSummary {
            loss_event_controls: controls.loss_event_count(),
            variant_controls: controls.variant_count(),
            mean_effective_tef: chain.map(|c| self.effective_tef / c),
            mean_effective_susceptibility: chain.map(|c| self.effective_susceptibility / c),
            mean_tef_cut: self.tef_cut / n,
            mean_susceptibility_cut: self.susceptibility_cut / n,
            mean_resistance_uplift: self.resistance_uplift / n,
            mean_lef_cut: self.lef_cut / n,
            mean_frequency_cut: self.frequency_cut / n,
            mean_loss_cut: self.loss_cut / n,
        }
    }
}

/// Output of one run. Immutable once returned; callers decide where to keep it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub sims: u32,
    /// Seed actually used, including one drawn for an unseeded run.
    pub seed: u64,
    pub last_run_at: DateTime<Utc>,
    pub stats: RunStats,
    /// Annual loss per simulated year, in draw order.
    pub ale_samples: Vec<f64>,
    /// Loss of each simulated event, sorted ascending. Holds the first
    /// [`MAX_PEL_SAMPLES`] events when the run produced more.
    pub pel_samples: Vec<f64>,
    /// Events simulated across all years, saturating at `u64::MAX`.
    #[serde(default)]
    pub events: u64,
    pub curve: Vec<CurvePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceSummary>,
}

struct DrawOutcome {
    events: u64,
    per_event_loss: f64,
    trace: Option<DrawTrace>,
}

/// A Monte Carlo run over one scenario, advanced a chunk at a time.
///
/// Each draw takes its randomness from its own seeded streams (see
/// [`DrawStreams`]), so results do not depend on chunk size or on whether a
/// chunk's draws are spread across the rayon pool.
pub struct Simulation {
    model: ScenarioModel,
    controls: Option<ControlSet>,
    streams: DrawStreams,
    seed: u64,
    opts: ResolvedOptions,
    done: u32,
    ale_samples: Vec<f64>,
    pel_samples: Vec<f64>,
    pel_truncated: bool,
    events: u64,
    trace: TraceTotals,
}

impl Simulation {
    /// Uncontrolled run, or a run with implemented controls when
    /// `options.controls` is set.
    pub fn baseline(quant: &Quant, options: &RunOptions) -> Result<Self> {
        let controls = options
            .controls
            .as_deref()
            .map(|c| ControlSet::new(select_controls(c, RunKind::Baseline)));
        Simulation::new(quant, options, controls, RunKind::Baseline)
    }

    /// Run with implemented controls plus proposed ones flagged for what-if.
    /// `options.controls` is ignored in favour of `controls`.
    pub fn what_if(quant: &Quant, controls: &[Control], options: &RunOptions) -> Result<Self> {
        let set = ControlSet::new(select_controls(controls, RunKind::WhatIf));
        Simulation::new(quant, options, Some(set), RunKind::WhatIf)
    }

    fn new(
        quant: &Quant,
        options: &RunOptions,
        controls: Option<ControlSet>,
        kind: RunKind,
    ) -> Result<Self> {
        let model = quant.model()?;
        let max_rate = model.frequency.max_rate();
        if max_rate >= SATURATING_LAMBDA {
            tracing::warn!(max_rate, "event rate too large to sample; counts saturate at the rate");
        }
        let opts = options.resolve(quant);
        let seed = opts.seed.unwrap_or_else(entropy_seed);
        tracing::info!(
            ?kind,
            sims = opts.sims,
            seed,
            seeded = opts.seed.is_some(),
            loss_event_controls = controls.as_ref().map_or(0, ControlSet::loss_event_count),
            "starting simulation"
        );
        Ok(Simulation {
            model,
            controls,
            streams: DrawStreams::new(seed),
            seed,
            opts,
            done: 0,
            ale_samples: Vec::with_capacity(opts.sims as usize),
            pel_samples: Vec::new(),
            pel_truncated: false,
            events: 0,
            trace: TraceTotals::default(),
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn progress(&self) -> Progress {
        Progress { done: self.done, total: self.opts.sims }
    }

    pub fn is_finished(&self) -> bool {
        self.done >= self.opts.sims
    }

    fn simulate_draw(&self, index: u32) -> DrawOutcome {
        let index = u64::from(index);
        let mut rng = self.streams.scenario(index);
        let (draw, trace) = match &self.controls {
            None => (sample_draw(&self.model, &mut rng), None),
            Some(controls) => {
                let control_streams = self.streams.controls(index);
                let out = sample_controlled_draw(&self.model, controls, &mut rng, &control_streams);
                (out.draw, Some(out.trace))
            }
        };
        // Count last so the scenario stream is laid out identically in
        // baseline and what-if runs.
        let events = poisson(draw.lef, &mut rng);
        DrawOutcome { events, per_event_loss: draw.per_event_loss, trace }
    }

    /// Run the next chunk of draws and report progress.
    pub fn step(&mut self) -> Progress {
        if self.is_finished() {
            return self.progress();
        }
        let end = self.done.saturating_add(self.opts.chunk_size).min(self.opts.sims);
        let outcomes: Vec<DrawOutcome> = if self.opts.parallel {
            (self.done..end).into_par_iter().map(|i| self.simulate_draw(i)).collect()
        } else {
            (self.done..end).map(|i| self.simulate_draw(i)).collect()
        };

        for outcome in outcomes {
            self.ale_samples.push(outcome.events as f64 * outcome.per_event_loss);
            self.events = self.events.saturating_add(outcome.events);

            let room = MAX_PEL_SAMPLES - self.pel_samples.len();
            let events = usize::try_from(outcome.events).unwrap_or(usize::MAX);
            if events > room && !self.pel_truncated {
                self.pel_truncated = true;
                tracing::warn!(
                    cap = MAX_PEL_SAMPLES,
                    "per-event loss record full; further events only counted"
                );
            }
            self.pel_samples
                .extend(std::iter::repeat_n(outcome.per_event_loss, events.min(room)));
            if let Some(trace) = &outcome.trace {
                self.trace.add(trace);
            }
        }
        self.done = end;
        tracing::debug!(done = self.done, total = self.opts.sims, "chunk complete");
        self.progress()
    }

    /// Drive the run to completion, checking for cancellation before each
    /// chunk and reporting progress after it.
    pub fn run(mut self, observer: &mut impl RunObserver) -> Result<RunResult> {
        while !self.is_finished() {
            if observer.should_cancel() {
                let Progress { done, total } = self.progress();
                tracing::info!(done, total, "simulation cancelled");
                return Err(EngineError::Cancelled { done, total });
            }
            let progress = self.step();
            observer.on_progress(progress);
        }
        Ok(self.finish())
    }

    /// Summarize whatever has been simulated so far.
    pub fn finish(self) -> RunResult {
        // ALE keeps draw order for paired comparison, so only it is copied.
        // The per-event record can be far larger and is sorted in place.
        let ale = SortedSamples::new(self.ale_samples.clone());
        let pel = SortedSamples::new(self.pel_samples);
        let stats = RunStats { ale: ale.stats(), pel: pel.stats() };
        let curve = ale.exceedance_curve(self.opts.curve_points);
        let trace = self.controls.as_ref().map(|c| self.trace.summary(c));
        tracing::info!(
            sims = self.done,
            events = self.events,
            ale_ml = stats.ale.ml,
            ale_p90 = stats.ale.p90,
            "simulation complete"
        );
        RunResult {
            sims: self.done,
            seed: self.seed,
            last_run_at: Utc::now(),
            stats,
            ale_samples: self.ale_samples,
            pel_samples: pel.into_vec(),
            events: self.events,
            curve,
            trace,
        }
    }
}

pub fn validate(quant: &Quant) -> crate::quant::Validation {
    quant.validate()
}

pub fn run_baseline(quant: &Quant, options: &RunOptions) -> Result<RunResult> {
    run_baseline_with(quant, options, &mut ())
}

pub fn run_baseline_with(
    quant: &Quant,
    options: &RunOptions,
    observer: &mut impl RunObserver,
) -> Result<RunResult> {
    Simulation::baseline(quant, options)?.run(observer)
}

pub fn run_what_if(quant: &Quant, controls: &[Control], options: &RunOptions) -> Result<RunResult> {
    run_what_if_with(quant, controls, options, &mut ())
}

pub fn run_what_if_with(
    quant: &Quant,
    controls: &[Control],
    options: &RunOptions,
    observer: &mut impl RunObserver,
) -> Result<RunResult> {
    Simulation::what_if(quant, controls, options)?.run(observer)
}
