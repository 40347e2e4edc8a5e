use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Local, NaiveTime};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod config;

use autopilot_core::{Engine, EntityCatalog, NoiseFilter, NoiseFilterConfig, RecorderBackend};
use autopilot_storage_sql::SqlStorage;
use config::{load_config, storage_config};

#[derive(Parser)]
#[command(name = "autopilot")]
#[command(about = "Mines behavioral patterns from smart-home history")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full pattern discovery pass
    #[command(alias = "mine")]
    Discover {
        /// History window in days (overrides the config)
        #[arg(long)]
        days: Option<u32>,
        /// Only process events after the previous run
        #[arg(long)]
        incremental: bool,
    },
    /// Export stored patterns as review JSON and a YAML draft
    #[command(alias = "exp")]
    Export {
        /// Minimum pattern score to include
        #[arg(long, default_value_t = 0.5)]
        min_score: f64,
    },
    /// Extract, enrich, and filter events to a JSONL file
    #[command(alias = "ext")]
    Extract {
        /// History window in days (overrides the config)
        #[arg(long)]
        days: Option<u32>,
        /// Output file name inside the export directory
        #[arg(long)]
        output: Option<String>,
    },
    /// Delete all discovered patterns
    Clear {
        /// Required for the destructive wipe
        #[arg(long)]
        confirm: bool,
    },
    /// Record user feedback on a stored pattern
    Feedback {
        /// Pattern id from the export
        pattern_id: i64,
        /// One of approved, rejected, ignored
        verdict: String,
    },
    /// Show pattern store and recorder statistics
    #[command(alias = "st")]
    Stats,
    /// Report entity signal classification
    #[command(alias = "cls")]
    Classify,
    /// Run discovery every day at 03:00 local time
    #[command(alias = "sched")]
    Schedule,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let config = load_config(cli.config.as_deref())?;
    let storage = Arc::new(SqlStorage::connect(storage_config(&config)).await?);
    let engine = Engine::new(storage.clone(), storage.clone(), config.clone());

    match cli.command {
        Commands::Discover { days, incremental } => {
            let days = days.unwrap_or(config.days);
            let incremental = incremental || config.incremental;
            let metadata = engine.discover_patterns(days, incremental).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }

        Commands::Export { min_score } => {
            let (json_path, yaml_path) = engine.export_patterns(min_score).await?;
            println!("patterns: {}", json_path.display());
            println!("automations: {}", yaml_path.display());
        }

        Commands::Extract { days, output } => {
            let days = days.unwrap_or(config.days);
            let events = engine.extract_events(days).await?;

            let path = autopilot_core::export::export_jsonl(
                &events,
                &config.export_dir,
                output.as_deref(),
            )?;
            autopilot_core::export::export_metadata(&events, &config.export_dir)?;

            let filter = NoiseFilter::new(NoiseFilterConfig {
                flap_threshold: config.flap_threshold,
                flap_window: config.flap_window,
                ..Default::default()
            });
            let report = filter.entity_report(&events);
            let noisy = report
                .values()
                .filter(|q| q.recommendation != "include")
                .count();
            info!("{noisy} of {} entities flagged by the quality report", report.len());

            println!("{} events -> {}", events.len(), path.display());
        }

        Commands::Clear { confirm } => {
            engine.clear_patterns(confirm).await?;
            println!("all pattern data cleared");
        }

        Commands::Feedback { pattern_id, verdict } => {
            let feedback = autopilot_core::Feedback::parse(&verdict)
                .ok_or_else(|| anyhow::anyhow!("unknown verdict {verdict:?}"))?;
            autopilot_core::storage::PatternStore::update_feedback(
                storage.as_ref(),
                pattern_id,
                feedback,
            )
            .await?;
            println!("pattern {pattern_id}: {}", feedback.as_str());
        }

        Commands::Stats => {
            let recorder_stats = storage.recorder_stats().await?;
            let store_stats =
                autopilot_core::storage::PatternStore::statistics(storage.as_ref()).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "recorder": recorder_stats,
                    "patterns": store_stats,
                }))?
            );
        }

        Commands::Classify => {
            let mut catalog = EntityCatalog::new(
                storage.clone(),
                config.custom_includes.clone(),
                config.custom_excludes.clone(),
            );
            let report = catalog.report().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Schedule => {
            if !config.mining_enabled {
                warn!("mining_enabled is false; nothing to schedule");
                return Ok(());
            }
            run_schedule(&engine, config.days).await;
        }
    }

    Ok(())
}

/// Daily mining loop. The next tick is computed after each run, so a run
/// that overlaps its successor's start time simply skips that tick.
async fn run_schedule(engine: &Engine, days: u32) {
    let mining_time = NaiveTime::from_hms_opt(3, 0, 0).unwrap_or_default();

    loop {
        let now = Local::now();
        let mut next = now.date_naive().and_time(mining_time);
        if next <= now.naive_local() {
            next += ChronoDuration::days(1);
        }
        let wait = (next - now.naive_local())
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(60));

        info!("Next mining run at {next} ({}s from now)", wait.as_secs());
        tokio::time::sleep(wait).await;

        info!("Starting scheduled pattern mining");
        match engine.discover_patterns(days, false).await {
            Ok(metadata) => info!(
                "Scheduled run stored {} patterns in {:.1}s",
                metadata.patterns_stored, metadata.duration_seconds
            ),
            Err(e) => warn!("Scheduled run failed: {e}"),
        }
    }
}
