// src/main.rs
//
// Offline driver: replays recorded perception outputs through the chunk
// pipeline and prints one JSON result per chunk on stdout.

use anyhow::Result;
use clap::Parser;
use drive_event_fusion::pipeline::{ChunkPipeline, DrivingEvent};
use drive_event_fusion::replay::{find_recordings, Recording};
use drive_event_fusion::{ChunkError, Config};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "drive-event-fusion",
    version,
    about = "Classify driving events from recorded dashcam perception outputs"
)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory searched for *.jsonl recordings (overrides replay.input_dir)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Log level (overrides logging.level; RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Default)]
struct RunStats {
    chunks: u64,
    events: u64,
    failed_chunks: u64,
    by_scenario: BTreeMap<u8, u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("drive_event_fusion={level}"))),
        )
        .with_writer(io::stderr)
        .init();

    info!("🚗 Driving event fusion starting");
    info!("✓ Configuration loaded from {}", args.config.display());

    let input_dir = args
        .input
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.replay.input_dir));
    let recordings = find_recordings(&input_dir)?;
    if recordings.is_empty() {
        error!("No recordings found in {}", input_dir.display());
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, finishing the current chunk");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut stats = RunStats::default();
    for path in &recordings {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        info!("\n========================================");
        info!("Replaying {}", path.display());
        info!("========================================");
        if let Err(e) = replay_one(path, &config, &stop, &mut stats).await {
            error!("❌ {}: {:#}", path.display(), e);
        }
    }

    info!("\n✓ Run finished");
    info!("  Chunks processed: {}", stats.chunks);
    info!("  Events: {}", stats.events);
    for (id, count) in &stats.by_scenario {
        info!("    scenario {:>2}: {}", id, count);
    }
    if stats.failed_chunks > 0 {
        warn!("  Failed chunks: {}", stats.failed_chunks);
    }
    Ok(())
}

async fn replay_one(
    path: &Path,
    config: &Config,
    stop: &AtomicBool,
    stats: &mut RunStats,
) -> Result<()> {
    let recording = Recording::load(path)?;
    info!("{} chunk(s) recorded", recording.chunk_count());
    let (chunks, collaborators) = recording.into_parts(config.signal.left_roi);
    let mut pipeline = ChunkPipeline::new(config.clone(), collaborators)?;

    let stdout = io::stdout();
    for chunk in chunks {
        // Only checked between chunks: a started chunk is always finished.
        if stop.load(Ordering::SeqCst) {
            info!("Stopping before chunk {}", chunk.chunk_id);
            break;
        }
        match pipeline.process_chunk(chunk).await {
            Ok(result) => {
                stats.chunks += 1;
                if result.scenario_id != 0 {
                    stats.events += 1;
                    *stats.by_scenario.entry(result.scenario_id).or_insert(0) += 1;
                }
                let mut out = stdout.lock();
                writeln!(out, "{}", serde_json::to_string(&result)?)?;
            }
            Err(e @ ChunkError::OutOfOrder { .. }) => {
                warn!("Skipping chunk: {}", e);
                stats.failed_chunks += 1;
            }
            Err(e) => {
                stats.failed_chunks += 1;
                return Err(e.into());
            }
        }
    }

    let events = pipeline.drain_events();
    let warnings = events
        .iter()
        .filter(|e| matches!(e, DrivingEvent::ThreatWarning { .. }))
        .count();
    let departures = events
        .iter()
        .filter(|e| matches!(e, DrivingEvent::LaneDeparture { .. }))
        .count();
    info!(
        "Recording done: {} threat warnings, {} lane departures in the last {} events",
        warnings,
        departures,
        events.len()
    );
    info!(
        "📊 {}",
        serde_json::to_string(&pipeline.metrics().summary())?
    );
    Ok(())
}
