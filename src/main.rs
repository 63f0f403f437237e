// src/main.rs

//! Demo front end: load a JSON record file and sonify it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cadenza::{
    EngineMode, FilterKind, Notice, PitchScale, Record, Sonifier, TickObserver, TickSnapshot,
    Waveform,
};

#[derive(Parser, Debug)]
#[command(name = "cadenza", about = "Sonify a JSON record file")]
struct Args {
    /// JSON file containing an array of records (GeoJSON-style objects
    /// with a top-level array also work).
    file: PathBuf,

    #[arg(long, default_value = "synthesizer")]
    mode: EngineMode,

    #[arg(long, default_value = "sine")]
    waveform: Waveform,

    #[arg(long, default_value = "lowpass")]
    filter: FilterKind,

    /// Sample file to load in sampler mode.
    #[arg(long)]
    sample: Option<PathBuf>,

    /// How long to play before exiting, in seconds.
    #[arg(long, default_value_t = 30)]
    seconds: u64,

    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    #[arg(long, default_value_t = 0)]
    transpose: i32,

    /// Snap pitches to this scale.
    #[arg(long)]
    scale: Option<PitchScale>,

    /// Randomize mapping paths and ranges after planning.
    #[arg(long)]
    randomize: bool,
}

struct StdoutObserver;

impl TickObserver for StdoutObserver {
    fn on_tick(&self, snapshot: &TickSnapshot) {
        println!(
            "[{}/{}] spacing {:>6.0} ms  freq {:>7.1} Hz  pan {:>+5.2}  filter {:>6.0} Hz",
            snapshot.index,
            snapshot.total,
            snapshot.params.note_spacing,
            snapshot.params.frequency,
            snapshot.params.pan,
            snapshot.params.filter_freq,
        );
    }

    fn on_cleared(&self) {
        println!("stopped");
    }

    fn on_notice(&self, notice: &Notice) {
        eprintln!("notice: {:?}", notice);
    }
}

/// Accepts either a bare array of records or an object whose first array
/// member holds them (e.g. GeoJSON `features`).
fn extract_records(value: serde_json::Value) -> Option<Vec<Record>> {
    match value {
        serde_json::Value::Array(records) => Some(records),
        serde_json::Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                serde_json::Value::Array(records) => Some(records),
                _ => None,
            }),
        _ => None,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("parsing JSON")?;
    let records =
        extract_records(value).ok_or_else(|| anyhow!("no record array found in input"))?;
    if records.is_empty() {
        return Err(anyhow!("record array is empty"));
    }
    println!("loaded {} records from {}", records.len(), args.file.display());

    let mut engine = Sonifier::new();
    engine.set_records(records);
    engine.on_tick(Arc::new(StdoutObserver));
    engine.set_waveform(args.waveform);
    engine.set_filter_type(args.filter);
    engine.set_speed(args.speed);
    engine.set_transpose(args.transpose);
    if let Some(scale) = args.scale {
        engine.set_pitch_quantize(true, scale);
    }

    if args.mode == EngineMode::Sampler {
        let path = args
            .sample
            .as_ref()
            .ok_or_else(|| anyhow!("sampler mode needs --sample"))?;
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let info = engine.load_sample(bytes)?;
        println!(
            "sample: {:.1} s, {} Hz, {} ch",
            info.duration, info.sample_rate, info.channels
        );
        engine.set_mode(EngineMode::Sampler);
    }

    if args.randomize {
        engine.randomize_all();
    }

    for mapping in engine.mappings() {
        if mapping.is_data_driven() {
            println!(
                "  {} <- {} ({}, {:.1}..{:.1})",
                mapping.id, mapping.path, mapping.curve, mapping.min, mapping.max
            );
        }
    }

    engine.play()?;
    std::thread::sleep(Duration::from_secs(args.seconds));
    engine.stop();
    engine.cleanup();
    Ok(())
}
