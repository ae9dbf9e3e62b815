//! Replays a detection dump through the lane monitor.
//!
//! The input holds one JSON encoded frame per line:
//! `{"index": 0, "timestamp": 0.0, "dims": [1280, 720], "detections": [...]}`.

use anyhow::{Context, Result};
use clap::Parser;
use lanewatch::events::EventLogRecord;
use lanewatch::{EventLog, Frame, Pipeline, SiteConfig};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Bus lane violation replay over recorded detections")]
struct Args {
    /// Site config (lane, calibration, thresholds)
    #[arg(long, value_name = "PATH")]
    config: PathBuf,
    /// Detection dump, one frame per line
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Media identifier recorded in events, defaults to the input path
    #[arg(long)]
    media: Option<String>,
    /// Where to write the event log, defaults to
    /// `events/logs/{site}_video_{YYYYmmdd_HHMMSS}.json` when violations exist
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Print a line for every frame with a latched violation
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lanewatch=info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = SiteConfig::load(&args.config)
        .with_context(|| format!("loading site config {}", args.config.display()))?;
    info!("site {} loaded", config.site);

    let media = args
        .media
        .clone()
        .unwrap_or_else(|| args.input.display().to_string());

    let mut pipeline = Pipeline::new(&config, &media, EventLog::new(config.event_log_capacity))?;

    let reader = BufReader::new(
        File::open(&args.input).with_context(|| format!("opening {}", args.input.display()))?,
    );

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let frame: Frame = serde_json::from_str(&line)
            .with_context(|| format!("parsing frame on line {}", line_no + 1))?;

        let report = pipeline.process(&frame);

        for event in &report.events {
            info!(
                "VIOLATION {}: track {} ({}) {}",
                event.event_id,
                event.track_id,
                event.class,
                event
                    .speed_kph
                    .map(|s| format!("{:.1} km/h", s))
                    .unwrap_or_else(|| "speed unknown".to_string())
            );
        }

        if args.verbose && report.lane_violated {
            println!("frame {}: lane violated", report.frame_index);
        }
    }

    let total_frames = pipeline.frames_processed();
    let violations = pipeline.into_sink().drain();
    info!("{} frames processed, {} violation(s)", total_frames, violations.len());

    let record = EventLogRecord::new(
        &media,
        &args.config.display().to_string(),
        total_frames,
        config.fps,
        violations,
    );

    let output = match &args.output {
        Some(output) => Some(output.clone()),
        None if !record.violations.is_empty() => Some(
            PathBuf::from("events/logs").join(record.default_file_name(&config.site)),
        ),
        None => None,
    };

    if let Some(output) = output {
        record
            .write_json(&output)
            .with_context(|| format!("writing event log {}", output.display()))?;
    }

    Ok(())
}
