use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Parser;
use procprof_core::profilers::memory::CONFIG_PERIOD_MS;
use procprof_core::{Configuration, MemoryProfiler, Profiler, Scheduler, TracingSink};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "procprof",
    version,
    about = "Process profiler runner",
    long_about = "Runs the memory profiler on a fixed cadence and reports measurements through the log."
)]
struct Cli {
    /// Agent argument string, e.g. `task_family=daily_etl,memory_period_ms=500`.
    #[arg(long, default_value = "")]
    agent_args: String,

    /// Extra `key=value` setting; overrides `--agent-args`. Repeatable.
    #[arg(long = "arg", value_parser = parse_key_value)]
    args: Vec<(String, String)>,

    /// Sampling period in milliseconds (overrides `memory_period_ms`).
    #[arg(long)]
    period_ms: Option<u64>,

    /// Number of samples to take before shutting down.
    #[arg(long, default_value_t = 5)]
    ticks: u64,

    /// Ask the sink to suppress bound metrics.
    #[arg(long, default_value_t = false)]
    no_bounds: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `key=value`, got `{raw}`"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.trim().to_owned(), value.trim().to_owned()))
}

fn main() {
    init_tracing();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.ticks == 0 {
        bail!("--ticks must be at least 1");
    }

    let config = build_config(&cli)?;
    let sink = Arc::new(TracingSink::new(!cli.no_bounds));
    let profiler = Profiler::new(sink.clone(), &config, MemoryProfiler::new())
        .context("failed to construct memory profiler")?;
    tracing::info!(tags = %profiler.tags(), interval = ?profiler.interval(), "profiler ready");

    let mut scheduler = Scheduler::new();
    let stats = scheduler.register(profiler);
    let handle = scheduler.start()?;

    let started_at = Instant::now();
    while stats.samples() < cli.ticks {
        thread::sleep(Duration::from_millis(5));
    }
    let report = handle.shutdown();
    tracing::info!(
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        sink_events = sink.events(),
        "profiling finished"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_clean() {
        bail!("one or more profilers stopped with an error");
    }
    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<Configuration> {
    let agent = Configuration::parse_agent_args(&cli.agent_args)
        .context("failed to parse --agent-args")?;

    let mut merged: Vec<(String, String)> = agent
        .iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();
    merged.extend(cli.args.iter().cloned());
    if let Some(period_ms) = cli.period_ms {
        merged.push((CONFIG_PERIOD_MS.to_owned(), period_ms.to_string()));
    }

    Ok(merged.into_iter().collect())
}
