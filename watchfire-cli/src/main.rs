//! Watchfire CLI
//!
//! Runs the geopolitical fusion engine against snapshot files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use watchfire_core::EngineConfig;
use watchfire_runtime::{Engine, EngineError, FeedSnapshot, FeedSource, RefreshReport};

#[derive(Parser)]
#[command(name = "watchfire")]
#[command(author, version, about = "Watchfire: geopolitical event fusion and alerting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a snapshot file
    Run {
        /// JSON snapshot, re-read on every cycle
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Number of refresh cycles
        #[arg(short, long, default_value = "1")]
        cycles: u64,

        /// Override the tick interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// TOML configuration (or set WATCHFIRE_CONFIG env var)
        #[arg(long, env = "WATCHFIRE_CONFIG")]
        config: Option<PathBuf>,

        /// Score everything on the main context
        #[arg(long)]
        inline: bool,

        /// Output file for the final report (default: report_<timestamp>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the default configuration as TOML
    Config,

    /// Validate a snapshot file
    Check {
        #[arg(short, long)]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Run {
            snapshot,
            cycles,
            interval_ms,
            config,
            inline,
            output,
        } => {
            run_engine(snapshot, cycles, interval_ms, config, inline, output).await?;
        }
        Commands::Config => {
            print!("{}", EngineConfig::default().to_toml_string()?);
        }
        Commands::Check { snapshot } => {
            check_snapshot(&snapshot)?;
        }
    }

    Ok(())
}

/// Re-reads one snapshot file on every cycle
struct FileFeed {
    path: PathBuf,
}

#[async_trait]
impl FeedSource for FileFeed {
    async fn next_snapshot(&mut self) -> Result<Option<FeedSnapshot>, EngineError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| EngineError::Feed(format!("{}: {}", self.path.display(), e)))?;
        FeedSnapshot::from_json(&content).map(Some)
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

async fn run_engine(
    snapshot: PathBuf,
    cycles: u64,
    interval_ms: Option<u64>,
    config_path: Option<PathBuf>,
    inline: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    println!("🔥 Watchfire - geopolitical event fusion\n");

    let mut config = load_config(config_path.as_deref())?;
    if let Some(ms) = interval_ms {
        config.engine.tick_interval_ms = ms;
    }
    if inline {
        config.engine.use_offload = false;
    }

    println!("📄 Snapshot: {}", snapshot.display());
    println!(
        "🔁 Cycles: {} | ⏱️  Interval: {} ms | Offload: {}\n",
        cycles,
        config.engine.tick_interval_ms,
        if config.engine.use_offload { "on" } else { "off" }
    );

    let mut engine = Engine::new(config)?;

    // Print signals as they are published
    let mut signals = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(signal) => println!(
                    "🚨 [{}] {} (score {:.2}, confidence {:.2})",
                    signal.signal_type, signal.title, signal.score, signal.confidence
                ),
                Err(RecvError::Lagged(n)) => println!("⚠️  Skipped {} signals", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut feed = FileFeed { path: snapshot };
    let report = engine.run(&mut feed, Some(cycles.max(1))).await?;
    let stats = engine.emitter_stats();
    drop(engine);
    let _ = printer.await;

    match report {
        Some(report) => {
            let output_path = output.unwrap_or_else(|| {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S");
                PathBuf::from(format!("report_{}.json", timestamp))
            });

            fs::write(&output_path, serde_json::to_string_pretty(&report)?)?;
            print_summary(&report);
            println!("\n✅ Report saved to: {}", output_path.display());
        }
        None => {
            println!("\n⚠️  No cycle completed. Check the snapshot with `watchfire check`.");
        }
    }

    println!("\n📊 Emitter stats:");
    println!("   Published: {}", stats.published_total);
    println!("   Suppressed: {}", stats.suppressed_total);
    println!("   Cooling down: {}", stats.cooling_down);

    Ok(())
}

fn print_summary(report: &RefreshReport) {
    println!("\n{}", "=".repeat(60));
    println!("Cycle {} at {}", report.cycle, report.scored_at.to_rfc3339());

    let mut countries: Vec<_> = report.countries.iter().collect();
    countries.sort_by(|a, b| b.score.value.total_cmp(&a.score.value));
    for country in countries.iter().take(10) {
        println!(
            "   {} {:<20} {:>5.1} {:<8} {:?}",
            country.code,
            country.name,
            country.score.value,
            country.score.level.as_str(),
            country.score.trend
        );
    }

    for escalation in &report.escalations {
        println!(
            "   🎯 {:<20} {:.2}/5 {:?}",
            escalation.hotspot_id, escalation.alert_score, escalation.trend
        );
    }

    println!(
        "   {} clusters ({:?}), {} surges, {} signals",
        report.clusters.len(),
        report.convergence_source,
        report.surges.len(),
        report.signals.len()
    );
}

fn check_snapshot(path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot = FeedSnapshot::from_json(&content)?;
    snapshot.validate()?;

    println!("✅ {} is valid", path.display());
    println!("   Countries: {}", snapshot.countries.len());
    println!("   Hotspots: {}", snapshot.hotspots.len());
    println!("   Events: {}", snapshot.events.len());
    println!("   Tracks: {}", snapshot.tracks.len());
    Ok(())
}
