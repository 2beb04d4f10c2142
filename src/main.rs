//! ev-cosim entry point: CLI wiring, scenario loading, and export.

use std::process;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use ev_cosim::cli::{self, CliOptions};
use ev_cosim::config::ScenarioConfig;
use ev_cosim::io::export::{export_csv, export_json};
use ev_cosim::runner::run_scenario;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(opts: &CliOptions) -> Result<ScenarioConfig> {
    let mut cfg = match (&opts.scenario, &opts.preset) {
        (Some(path), _) => ScenarioConfig::from_toml_file(path)
            .with_context(|| format!("loading scenario {}", path.display()))?,
        (None, Some(name)) => {
            ScenarioConfig::from_preset(name).with_context(|| format!("loading preset {name}"))?
        }
        (None, None) => ScenarioConfig::from_preset(cli::DEFAULT_PRESET)?,
    };
    if let Some(seed) = opts.seed {
        cfg.simulation.seed = seed;
    }
    Ok(cfg)
}

fn run(opts: &CliOptions) -> Result<()> {
    let cfg = load_config(opts)?;
    let report = run_scenario(&cfg).context("simulation failed")?;

    if !opts.quiet {
        for step in &report.results {
            println!("{step}");
        }
        println!();
    }
    println!("{}", report.summary);

    if let Some(path) = &opts.csv_out {
        export_csv(&report.results, &report.series, path)
            .with_context(|| format!("writing CSV to {}", path.display()))?;
        info!(path = %path.display(), rows = report.results.len(), "step results exported");
    }
    if let Some(path) = &opts.json_out {
        export_json(&report.series, path)
            .with_context(|| format!("writing JSON to {}", path.display()))?;
        info!(path = %path.display(), "time series exported");
    }
    Ok(())
}

fn main() {
    let opts = match cli::parse_args() {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("error: {msg}");
            cli::print_usage();
            process::exit(2);
        }
    };
    if opts.help {
        cli::print_usage();
        return;
    }

    init_tracing();

    if let Err(err) = run(&opts) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}
