//! Scenario replayer (ytpb-replay) - Main entry point
//!
//! Replays a scripted playback scenario against the tracker and prints every
//! dispatched event as one JSON line.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ytpb_common::config::{resolve_config_path, TrackerConfig};
use ytpb_iframe::scenario::{run_scenario, Scenario};

/// Command-line arguments for ytpb-replay
#[derive(Parser, Debug)]
#[command(name = "ytpb-replay")]
#[command(about = "Replay a YouTube playback tracking scenario")]
#[command(version)]
struct Args {
    /// Scenario file (TOML)
    scenario: PathBuf,

    /// Tracker configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print each event instead of one JSON object per line
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = TrackerConfig::load(config_path.as_deref())
        .context("Failed to load tracker configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    let level = &config.logging.level;
                    format!("ytpb_replay={0},ytpb_iframe={0},ytpb_common={0}", level).into()
                }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting ytpb-replay v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(path) = &config_path {
        info!("Configuration: {}", path.display());
    }
    info!("Scenario: {}", args.scenario.display());

    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("Failed to read scenario {}", args.scenario.display()))?;
    let events = run_scenario(&scenario, config).context("Scenario replay failed")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for recorded in &events {
        let line = if args.pretty {
            serde_json::to_string_pretty(recorded)?
        } else {
            serde_json::to_string(recorded)?
        };
        writeln!(out, "{}", line)?;
    }

    info!("{} event(s) dispatched", events.len());
    Ok(())
}
