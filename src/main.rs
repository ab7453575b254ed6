use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;
use statemeter::cli::{Cli, OutputFormat};
use statemeter::{json_output, PerfAnalytics, PerfConfig, PerfEvent, PerfOptions, PerfRuntime};
use std::fs::File;
use std::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; notices are WARN, so they show by default
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the runtime, applying the optional TOML options file
fn build_runtime(args: &Cli) -> Result<PerfRuntime> {
    let mut config = PerfConfig::default();
    if let Some(path) = &args.config {
        let options = PerfOptions::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        config.merge(&options);
    }
    tracing::debug!(?config, "performance configuration");
    Ok(PerfRuntime::new(config))
}

/// Timing events pass when their name matches; state-size samples always pass
fn passes_filter(event: &PerfEvent, filter: Option<&Regex>) -> bool {
    match (filter, event.name()) {
        (Some(regex), Some(name)) => regex.is_match(name),
        _ => true,
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let filter = args
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid --filter regex")?;

    let runtime = build_runtime(&args)?;
    let analytics = PerfAnalytics::with_top_n(runtime.clone(), args.top);

    let file = File::open(&args.events)
        .with_context(|| format!("failed to open event log {}", args.events.display()))?;
    let events = json_output::read_events(BufReader::new(file))
        .with_context(|| format!("failed to parse event log {}", args.events.display()))?;

    let mut replayed = 0usize;
    for event in events {
        if passes_filter(&event, filter.as_ref()) {
            runtime.channel().publish(event);
            replayed += 1;
        }
    }
    tracing::info!(replayed, "event log replayed");

    let summary = analytics.summary();
    match args.format {
        OutputFormat::Text => print!("{}", summary),
        OutputFormat::Json => println!("{}", json_output::summary_to_json(&summary)?),
    }
    Ok(())
}
