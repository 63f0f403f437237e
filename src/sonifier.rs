// src/sonifier.rs

//! The public engine facade.
//!
//! `Sonifier` owns the record list, the mapping table, the control surface
//! and the command channel into the renderer. The output stream is opened
//! lazily on the first `play` (the host's user gesture); `detached()`
//! skips the device entirely and hands the renderer back for manual
//! pumping, which is how the integration tests run without audio hardware.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rand::thread_rng;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tracing::{info, warn};

use crate::audio_engine::command::AudioCommand;
use crate::audio_engine::AudioEngine;
use crate::audio_io;
use crate::driver::{self, DriverContext, PlaybackShared};
use crate::error::Result;
use crate::evaluate::DataRanges;
use crate::mapping::{Mapping, MappingPatch, MappingSet, ParamId};
use crate::observer::{ObserverSlot, TickObserver};
use crate::quantize::PitchScale;
use crate::record::{discover, PathDescriptor, Record};
use crate::sample::{decode_sample, SampleData, SampleInfo};
use crate::settings::{Controls, EngineMode, FilterKind, Waveform};

const COMMAND_QUEUE_CAPACITY: usize = 1024;
const TAP_CAPACITY: usize = 1 << 15;

/// Fallback rate used before a device stream reports the real one, and in
/// detached mode.
const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Drainable handle onto the rendered output, for waveform displays.
#[derive(Clone)]
pub struct Analyser {
    consumer: Arc<Mutex<HeapConsumer<f32>>>,
}

impl Analyser {
    /// Copies up to `out.len()` recent output samples, returning how many
    /// were available.
    pub fn drain(&self, out: &mut [f32]) -> usize {
        match self.consumer.lock() {
            Ok(mut consumer) => consumer.pop_slice(out),
            Err(_) => 0,
        }
    }
}

/// The data sonification engine.
pub struct Sonifier {
    records: Arc<Vec<Record>>,
    descriptors: Vec<PathDescriptor>,
    mappings: Arc<RwLock<MappingSet>>,
    controls: Arc<Controls>,
    shared: Arc<PlaybackShared>,
    observer: ObserverSlot,
    sample: Arc<RwLock<Option<Arc<SampleData>>>>,
    commands: Arc<Mutex<HeapProducer<AudioCommand>>>,
    analyser: Analyser,
    sample_rate: Arc<AtomicU32>,
    /// Consumer side of the command queue, parked here until the stream
    /// starts. `None` once a renderer owns it.
    pending_consumer: Option<HeapConsumer<AudioCommand>>,
    pending_tap: Option<HeapProducer<f32>>,
    stream: Option<cpal::Stream>,
    stream_error: Option<String>,
    detached: bool,
}

impl Sonifier {
    /// Creates an engine that will open the default output device on the
    /// first `play`.
    pub fn new() -> Sonifier {
        Sonifier::build(false).0
    }

    /// Creates an engine with no device stream and returns the renderer,
    /// to be pumped by hand with `process_buffer`.
    pub fn detached() -> (Sonifier, AudioEngine) {
        let (sonifier, engine) = Sonifier::build(true);
        (sonifier, engine.expect("detached build returns the renderer"))
    }

    fn build(detached: bool) -> (Sonifier, Option<AudioEngine>) {
        let (command_tx, command_rx) = HeapRb::<AudioCommand>::new(COMMAND_QUEUE_CAPACITY).split();
        let (tap_tx, tap_rx) = HeapRb::<f32>::new(TAP_CAPACITY).split();
        let analyser = Analyser {
            consumer: Arc::new(Mutex::new(tap_rx)),
        };

        let (engine, pending_consumer, pending_tap) = if detached {
            (
                Some(AudioEngine::new(
                    DEFAULT_SAMPLE_RATE as f32,
                    command_rx,
                    tap_tx,
                )),
                None,
                None,
            )
        } else {
            (None, Some(command_rx), Some(tap_tx))
        };

        let sonifier = Sonifier {
            records: Arc::new(Vec::new()),
            descriptors: Vec::new(),
            mappings: Arc::new(RwLock::new(MappingSet::new(EngineMode::Synthesizer))),
            controls: Arc::new(Controls::new()),
            shared: Arc::new(PlaybackShared::new()),
            observer: ObserverSlot::new(),
            sample: Arc::new(RwLock::new(None)),
            commands: Arc::new(Mutex::new(command_tx)),
            analyser,
            sample_rate: Arc::new(AtomicU32::new(DEFAULT_SAMPLE_RATE)),
            pending_consumer,
            pending_tap,
            stream: None,
            stream_error: None,
            detached,
        };
        (sonifier, engine)
    }

    // --- Data loading ---

    /// Replaces the record list, re-discovers paths and re-plans mappings.
    pub fn set_records(&mut self, records: Vec<Record>) {
        self.descriptors = discover(&records);
        self.records = Arc::new(records);
        let numeric = self.descriptors.iter().filter(|d| d.is_numeric()).count();
        info!(
            records = self.records.len(),
            paths = self.descriptors.len(),
            numeric, "records loaded"
        );
        if let Ok(mut set) = self.mappings.write() {
            set.plan(&self.records, &self.descriptors);
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn path_descriptors(&self) -> &[PathDescriptor] {
        &self.descriptors
    }

    // --- Mapping surface ---

    pub fn mappings(&self) -> Vec<Mapping> {
        self.mappings
            .read()
            .map(|set| set.mappings().to_vec())
            .unwrap_or_default()
    }

    /// Applies a partial mapping update. A path that was never discovered
    /// as numeric is rejected and logged; ranges are clamped.
    pub fn set_mapping(&self, id: ParamId, patch: MappingPatch) {
        if let Some(path) = &patch.path {
            let known = path.is_empty()
                || self
                    .descriptors
                    .iter()
                    .any(|d| d.is_numeric() && d.path == *path);
            if !known {
                warn!(%id, %path, "ignoring mapping to unknown path");
                return;
            }
        }
        if let Ok(mut set) = self.mappings.write() {
            set.apply_patch(id, patch);
        }
    }

    pub fn randomize_paths(&self) {
        if let Ok(mut set) = self.mappings.write() {
            set.randomize_paths(&self.descriptors, &mut thread_rng());
        }
    }

    pub fn randomize_ranges(&self) {
        if let Ok(mut set) = self.mappings.write() {
            set.randomize_ranges(&mut thread_rng());
        }
    }

    pub fn randomize_all(&self) {
        if let Ok(mut set) = self.mappings.write() {
            let mut rng = thread_rng();
            set.randomize_paths(&self.descriptors, &mut rng);
            set.randomize_ranges(&mut rng);
        }
    }

    /// Restores declared defaults, then re-plans from the current records.
    pub fn reset_mappings(&self) {
        if let Ok(mut set) = self.mappings.write() {
            set.reset();
            set.plan(&self.records, &self.descriptors);
        }
    }

    // --- Mode and sample ---

    pub fn mode(&self) -> EngineMode {
        self.controls.mode()
    }

    /// Switches synthesizer/sampler mode: swaps the parameter set,
    /// invalidates mappings to absent parameters and re-plans. The audio
    /// graph and effect tails are untouched.
    pub fn set_mode(&self, mode: EngineMode) {
        if self.controls.mode() == mode {
            return;
        }
        self.controls.set_mode(mode);
        if let Ok(mut set) = self.mappings.write() {
            set.set_mode(mode);
            set.plan(&self.records, &self.descriptors);
        }
        info!(%mode, "engine mode switched");
    }

    /// Decodes and installs a sample. On failure the previous sample stays
    /// loaded, the observer gets a typed notice, and the error is returned
    /// to the host.
    pub fn load_sample(&self, bytes: Vec<u8>) -> Result<SampleInfo> {
        let sample = match decode_sample(bytes) {
            Ok(sample) => sample,
            Err(e) => {
                self.observer
                    .publish_notice(&crate::observer::Notice::DecodeFailed(e.to_string()));
                return Err(e);
            }
        };
        let info = sample.info();
        if let Ok(mut slot) = self.sample.write() {
            *slot = Some(sample);
        }
        Ok(info)
    }

    pub fn clear_sample(&self) {
        if let Ok(mut slot) = self.sample.write() {
            *slot = None;
        }
    }

    pub fn sample_info(&self) -> Option<SampleInfo> {
        self.sample
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|s| s.info()))
    }

    // --- Playback ---

    /// Opens the output device eagerly. Optional: `play` initializes the
    /// stream on first use anyway, but calling this up front lets a host
    /// surface a missing-device error before playback is requested. In
    /// detached mode it is a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_stream()
    }

    /// Starts a new playback session. Any previous session observes the
    /// counter advancing and exits; scheduled tails keep ringing.
    pub fn play(&mut self) -> Result<()> {
        if self.records.is_empty() {
            warn!("play requested with no records loaded");
            return Ok(());
        }
        self.ensure_stream()?;

        let session = self.shared.session.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.playing.store(true, Ordering::SeqCst);
        self.shared.interrupt();

        // Data ranges are fixed for the whole session.
        let ranges = match self.mappings.read() {
            Ok(set) => DataRanges::compute(&self.records, &set),
            Err(_) => DataRanges::default(),
        };

        driver::spawn(DriverContext {
            records: self.records.clone(),
            mappings: self.mappings.clone(),
            ranges,
            controls: self.controls.clone(),
            shared: self.shared.clone(),
            observer: self.observer.clone(),
            sample: self.sample.clone(),
            commands: self.commands.clone(),
            sample_rate: self.sample_rate.load(Ordering::Relaxed) as f32,
            session,
        });
        info!(session, "playback started");
        Ok(())
    }

    /// Stops the current session. Idempotent and non-blocking: the session
    /// counter advances, the sleeping driver wakes and exits, and in-flight
    /// notes decay naturally on the audio clock.
    pub fn stop(&self) {
        self.shared.session.fetch_add(1, Ordering::SeqCst);
        let was_playing = self.shared.playing.swap(false, Ordering::SeqCst);
        self.shared.interrupt();
        if was_playing {
            info!("playback stopped");
        }
        self.observer.publish_cleared();
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    fn ensure_stream(&mut self) -> Result<()> {
        if self.detached || self.stream.is_some() {
            return Ok(());
        }
        let (Some(consumer), Some(tap)) = (self.pending_consumer.take(), self.pending_tap.take())
        else {
            // A previous initialization attempt consumed the channel ends.
            return match &self.stream_error {
                Some(msg) => Err(crate::error::CadenzaError::Stream(msg.clone())),
                None => Ok(()),
            };
        };
        match audio_io::start_output_stream(consumer, tap) {
            Ok((stream, rate)) => {
                self.sample_rate.store(rate, Ordering::Relaxed);
                self.stream = Some(stream);
                self.stream_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("audio graph initialization failed: {}", e);
                self.stream_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    // --- Global controls ---

    pub fn set_volume(&self, volume: f32) {
        self.controls.set_volume(volume);
    }

    pub fn set_transpose(&self, semitones: i32) {
        self.controls.set_transpose(semitones);
    }

    pub fn set_speed(&self, multiplier: f32) {
        self.controls.set_speed(multiplier);
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.controls.set_waveform(waveform);
    }

    pub fn set_filter_type(&self, kind: FilterKind) {
        self.controls.set_filter_kind(kind);
    }

    pub fn set_pitch_quantize(&self, enabled: bool, scale: PitchScale) {
        self.controls.set_pitch_quantize(enabled, scale);
    }

    pub fn set_rhythm_quantize(&self, enabled: bool) {
        self.controls.set_rhythm_quantize(enabled);
    }

    pub fn set_random_chop(&self, enabled: bool) {
        self.controls.set_random_chop(enabled);
    }

    pub fn set_full_note_duration(&self, enabled: bool) {
        self.controls.set_full_note_duration(enabled);
    }

    // --- Observation ---

    /// Registers the tick observer. Snapshots arrive on the driver thread;
    /// the observer must not block the audio path.
    pub fn on_tick(&self, observer: Arc<dyn TickObserver>) {
        self.observer.register(observer);
    }

    /// Handle for waveform rendering by the host.
    pub fn analyser(&self) -> Analyser {
        self.analyser.clone()
    }

    /// Stops playback and tears the output stream down.
    pub fn cleanup(&mut self) {
        self.stop();
        self.stream = None;
    }
}

impl Drop for Sonifier {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Default for Sonifier {
    fn default() -> Self {
        Sonifier::new()
    }
}
