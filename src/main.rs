use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, bail};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use fairsim::analysis::DistStats;
use fairsim::config::{RunOptions, canonical_controls, canonical_quant};
use fairsim::portfolio::{self, ScenarioInput, ScenarioReport};
use fairsim::types::ScenarioId;

struct Args {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    seed: Option<u64>,
    sims: Option<u32>,
    curve_points: Option<usize>,
    quiet: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut out = Args {
        input: None,
        output: None,
        seed: None,
        sims: None,
        curve_points: None,
        quiet: false,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = |flag: &str| {
            i += 1;
            args.get(i).cloned().with_context(|| format!("{flag} requires a value"))
        };
        match flag {
            "--input" => out.input = Some(value("--input")?.into()),
            "--output" => out.output = Some(value("--output")?.into()),
            "--seed" => {
                out.seed = Some(value("--seed")?.parse().context("--seed requires a u64")?)
            }
            "--sims" => {
                out.sims = Some(value("--sims")?.parse().context("--sims requires a u32")?)
            }
            "--curve-points" => {
                let raw = value("--curve-points")?;
                out.curve_points =
                    Some(raw.parse().context("--curve-points requires an integer")?)
            }
            "--quiet" => out.quiet = true,
            other => bail!("unknown argument {other}"),
        }
        i += 1;
    }
    Ok(out)
}

fn load_scenarios(path: Option<&PathBuf>) -> anyhow::Result<Vec<ScenarioInput>> {
    let Some(path) = path else {
        return Ok(vec![ScenarioInput {
            id: ScenarioId("demo".into()),
            name: "Vendor breach".into(),
            vendor: "Demo vendor".into(),
            quant: canonical_quant(),
            controls: canonical_controls(),
        }]);
    };

    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let raw: Value = serde_json::from_reader(file)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let parsed = if raw.is_array() {
        serde_json::from_value(raw)
    } else {
        serde_json::from_value(raw).map(|one| vec![one])
    };
    let mut inputs: Vec<ScenarioInput> = parsed.context("input does not describe scenarios")?;

    for (n, input) in inputs.iter_mut().enumerate() {
        if input.id.0.is_empty() {
            input.id = ScenarioId(format!("scenario-{}", n + 1));
        }
    }
    Ok(inputs)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FAIRSIM_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let scenarios = load_scenarios(args.input.as_ref())?;

    let mut options = RunOptions { seed: args.seed, sim_count: args.sims, ..RunOptions::default() };
    if let Some(points) = args.curve_points {
        options.curve_points = points;
    }

    let reports = portfolio::run_portfolio(&scenarios, &options);

    if let Some(path) = &args.output {
        let file =
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &reports)
            .context("failed to write results")?;
    }

    if !args.quiet {
        for report in &reports {
            print_report(report);
        }
        if reports.len() > 1 {
            print_ranking(&reports);
        }
    }
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    let title = if report.name.is_empty() { report.id.0.as_str() } else { report.name.as_str() };
    println!("\n=== {title} ({}) ===", report.id.0);
    if !report.vendor.is_empty() {
        println!("  Vendor: {}", report.vendor);
    }

    if !report.is_runnable() {
        println!("  Validation: FAIL (missing {})", report.missing.join(", "));
        return;
    }
    println!("  Validation: PASS");

    let Some(baseline) = &report.baseline else { return };
    println!("  Sims: {}  Seed: {}", baseline.sims, baseline.seed);

    println!(
        "\n  {:<16} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12}",
        "", "min", "p10", "ml", "p90", "max", "mean"
    );
    println!("  {}", "-".repeat(16 + 6 * 15));
    print_stats_row("Baseline ALE", &baseline.stats.ale);
    print_stats_row("Baseline PEL", &baseline.stats.pel);
    if let Some(what_if) = &report.what_if {
        print_stats_row("What-if ALE", &what_if.stats.ale);
        print_stats_row("What-if PEL", &what_if.stats.pel);
    }

    if let Some(impact) = &report.impact {
        println!("\n  --- Controls impact (ALE, what-if minus baseline) ---");
        println!(
            "  Δmin {:>12.0} | Δml {:>12.0} | Δp90 {:>12.0} | Δmax {:>12.0} | Δmean {:>12.0}",
            impact.delta_min, impact.delta_ml, impact.delta_p90, impact.delta_max, impact.delta_mean
        );
    }

    if let Some(trace) = report.what_if.as_ref().and_then(|r| r.trace) {
        println!(
            "  Controls: {} loss-event, {} variant | mean frequency cut {:.1}% \
             | mean loss cut {:.1}%",
            trace.loss_event_controls,
            trace.variant_controls,
            trace.mean_frequency_cut.max(trace.mean_lef_cut) * 100.0,
            trace.mean_loss_cut * 100.0,
        );
    }
}

fn print_stats_row(label: &str, s: &DistStats) {
    println!(
        "  {:<16} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0}",
        label, s.min, s.p10, s.ml, s.p90, s.max, s.mean
    );
}

fn print_ranking(reports: &[ScenarioReport]) {
    println!("\n=== Portfolio ranked by baseline ALE p90 ===");
    println!("{:>4} | {:<24} | {:>12} | {:>12}", "Rank", "Scenario", "p90", "Δp90");
    for (rank, report) in portfolio::rank_by_p90(reports).iter().enumerate() {
        let p90 = report.baseline.as_ref().map_or(0.0, |b| b.stats.ale.p90);
        let delta =
            report.impact.map_or_else(|| "-".to_string(), |i| format!("{:.0}", i.delta_p90));
        println!("{:>4} | {:<24} | {:>12.0} | {:>12}", rank + 1, report.id.0, p90, delta);
    }
    let skipped = reports.iter().filter(|r| !r.is_runnable()).count();
    if skipped > 0 {
        println!("  {skipped} scenario(s) not runnable");
    }
}
