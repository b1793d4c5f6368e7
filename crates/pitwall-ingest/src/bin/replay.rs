//! Offline replay tool.
//!
//! Feeds a recorded session through the pipeline at full speed and prints
//! every detected event, with a summary at the end. Useful for checking a
//! recording and for eyeballing detector output without a broker.
//!
//! ```bash
//! pitwall-replay ./recordings/2024-9590
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pitwall_core::{Pipeline, SessionEvent};
use pitwall_ingest::{DataSource, RecordedSource};

/// Replay a recorded session through the event pipeline.
#[derive(Parser, Debug)]
#[command(name = "pitwall-replay")]
#[command(about = "Replay a recorded session and print detected events")]
#[command(version)]
struct Args {
    /// Path to a recording directory (containing metadata.json).
    recording: PathBuf,

    /// Print every processed message, not just events.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = Args::parse();

    let mut source = RecordedSource::new(&args.recording);
    let initial = source
        .initial_state()
        .await
        .with_context(|| format!("reading {}", args.recording.display()))?;
    let timeline = source.timeline().await?;

    if timeline.is_empty() {
        println!("recording is empty");
        return Ok(());
    }

    let mut pipeline = match &initial {
        Some(state) => Pipeline::with_initial(state),
        None => Pipeline::new(),
    };

    let mut flag_changes = 0usize;
    let mut overtakes = 0usize;
    let mut pit_stops = 0usize;
    let mut weather_changes = 0usize;

    for entry in timeline.iter() {
        let update = pipeline.process(entry);
        if args.verbose {
            println!("{} {}", entry.timestamp, entry.topic);
        }
        for event in &update.events {
            match event {
                SessionEvent::FlagChange {
                    previous_flag,
                    new_flag,
                    ..
                } => {
                    flag_changes += 1;
                    println!("{} flag {previous_flag} -> {new_flag}", entry.timestamp);
                }
                SessionEvent::Overtake {
                    overtaking_abbreviation,
                    overtaken_abbreviation,
                    new_position,
                    ..
                } => {
                    overtakes += 1;
                    println!(
                        "{} overtake {overtaking_abbreviation} passed \
                         {overtaken_abbreviation} for P{new_position}",
                        entry.timestamp
                    );
                }
                SessionEvent::PitStop {
                    abbreviation,
                    new_compound,
                    stint_number,
                    ..
                } => {
                    pit_stops += 1;
                    println!(
                        "{} pit stop {abbreviation} -> {new_compound} (stint {stint_number})",
                        entry.timestamp
                    );
                }
                SessionEvent::WeatherChange { new_rainfall, .. } => {
                    weather_changes += 1;
                    let conditions = if *new_rainfall { "rain" } else { "dry" };
                    println!("{} weather now {conditions}", entry.timestamp);
                }
            }
        }
    }

    let state = pipeline.state();
    println!();
    println!(
        "{} messages, {} flag changes, {} overtakes, {} pit stops, {} weather changes",
        timeline.len(),
        flag_changes,
        overtakes,
        pit_stops,
        weather_changes
    );
    println!(
        "final: flag={}, lap {}/{}",
        state.track_status.flag, state.lap_count.current, state.lap_count.total
    );

    Ok(())
}
