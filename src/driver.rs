// src/driver.rs

//! The cooperative playback loop.
//!
//! Each `play` spawns one driver thread. A process-wide session counter is
//! bumped by every play and stop; the thread captures its own id at spawn
//! and re-checks it after every wait, so rapid start/stop chatter leaves at
//! most one live loop. Per record the driver evaluates parameters,
//! publishes a snapshot, posts the effects setpoints and the note event,
//! then sleeps `noteSpacing / speed` on a condvar that `stop` signals.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use ringbuf::HeapProducer;
use tracing::{debug, warn};

use crate::audio_engine::command::AudioCommand;
use crate::audio_engine::convolver::ReverbKernel;
use crate::audio_engine::envelope::Envelope;
use crate::audio_engine::voice::{FilterSpec, NoteEvent, OscShape, SourceSpec};
use crate::evaluate::{evaluate, AudioParams, DataRanges};
use crate::mapping::MappingSet;
use crate::observer::{Notice, ObserverSlot, TickSnapshot};
use crate::quantize::{quantize_pitch, quantize_spacing};
use crate::record::Record;
use crate::sample::SampleData;
use crate::settings::{Controls, EngineMode, Waveform, PARAM_SCALER};

/// Delay-time changes larger than this ramp instead of stepping.
const DELAY_STEP_THRESHOLD_S: f32 = 0.005;

/// Reverb impulse regeneration threshold, in seconds of decay.
const IMPULSE_REGEN_THRESHOLD_S: f32 = 0.5;

/// State shared between the facade and every driver thread.
pub(crate) struct PlaybackShared {
    /// Strictly monotonic session counter; bumped on every play and stop.
    pub session: AtomicU64,
    pub playing: AtomicBool,
    /// Last decay the reverb impulse was generated for, scaled by
    /// `PARAM_SCALER`; zero means no impulse yet. Survives sessions, like
    /// the convolver it mirrors.
    reverb_decay: AtomicU32,
    gate: Mutex<()>,
    signal: Condvar,
}

impl PlaybackShared {
    pub fn new() -> PlaybackShared {
        PlaybackShared {
            session: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            reverb_decay: AtomicU32::new(0),
            gate: Mutex::new(()),
            signal: Condvar::new(),
        }
    }

    pub fn is_current(&self, session: u64) -> bool {
        self.session.load(Ordering::SeqCst) == session
    }

    /// Wakes any driver currently sleeping between notes.
    pub fn interrupt(&self) {
        self.signal.notify_all();
    }

    fn current_reverb_decay(&self) -> Option<f32> {
        match self.reverb_decay.load(Ordering::Relaxed) {
            0 => None,
            scaled => Some(scaled as f32 / PARAM_SCALER),
        }
    }

    fn store_reverb_decay(&self, decay: f32) {
        self.reverb_decay
            .store(((decay * PARAM_SCALER) as u32).max(1), Ordering::Relaxed);
    }

    /// Sleeps up to `duration`, returning early when the session advances.
    fn wait_interruptible(&self, session: u64, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut guard = match self.gate.lock() {
            Ok(g) => g,
            Err(_) => return,
        };
        loop {
            if !self.is_current(session) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            guard = match self.signal.wait_timeout(guard, deadline - now) {
                Ok((g, _)) => g,
                Err(_) => return,
            };
        }
    }
}

/// Everything one driver thread needs, captured at `play` time.
pub(crate) struct DriverContext {
    pub records: Arc<Vec<Record>>,
    pub mappings: Arc<RwLock<MappingSet>>,
    /// Computed once per session, before the thread spawns.
    pub ranges: DataRanges,
    pub controls: Arc<Controls>,
    pub shared: Arc<PlaybackShared>,
    pub observer: ObserverSlot,
    pub sample: Arc<RwLock<Option<Arc<SampleData>>>>,
    pub commands: Arc<Mutex<HeapProducer<AudioCommand>>>,
    pub sample_rate: f32,
    pub session: u64,
}

pub(crate) fn spawn(ctx: DriverContext) {
    let result = thread::Builder::new()
        .name("cadenza-playback".into())
        .spawn(move || run(ctx));
    if let Err(e) = result {
        warn!("failed to spawn playback thread: {}", e);
    }
}

fn run(ctx: DriverContext) {
    let session = ctx.session;
    let total = ctx.records.len();
    if total == 0 {
        return;
    }
    let mut rng = rand::thread_rng();
    // Reset on every start so the first delay setpoint of a session steps
    // instead of bending from a stale value.
    let mut previous_delay: Option<f32> = None;
    let mut warned_no_sample = false;
    debug!(session, total, "playback loop started");

    'outer: loop {
        for (i, record) in ctx.records.iter().enumerate() {
            if !ctx.shared.is_current(session) {
                break 'outer;
            }

            let set = match ctx.mappings.read() {
                Ok(guard) => guard.clone(),
                Err(_) => break 'outer,
            };
            let params = evaluate(record, &set, &ctx.ranges);

            ctx.observer.publish_tick(&TickSnapshot {
                record: record.clone(),
                params,
                mappings: set.mappings().to_vec(),
                index: i + 1,
                total,
                is_playing: true,
            });

            schedule_effects(&ctx, &params, &mut previous_delay, &mut rng);

            let (event, missing_sample) = build_note(&ctx, &params, set.mode(), &mut rng);
            if missing_sample && !warned_no_sample {
                warned_no_sample = true;
                ctx.observer.publish_notice(&Notice::NoSample);
            }
            send(&ctx, AudioCommand::Note(Box::new(event)));

            let speed = ctx.controls.speed().max(0.05) as f64;
            let mut wait_ms = params.note_spacing / speed;
            if ctx.controls.rhythm_quantize() {
                wait_ms = quantize_spacing(wait_ms);
            }
            ctx.shared
                .wait_interruptible(session, Duration::from_secs_f64(wait_ms.max(1.0) / 1000.0));
            if !ctx.shared.is_current(session) {
                break 'outer;
            }
        }
    }
    debug!(session, "playback loop exited");
}

/// Posts the once-per-note global effects setpoints.
fn schedule_effects<R: Rng>(
    ctx: &DriverContext,
    params: &AudioParams,
    previous_delay: &mut Option<f32>,
    rng: &mut R,
) {
    let (seconds, ramp) = delay_setpoint(*previous_delay, params.delay_time);
    send(ctx, AudioCommand::DelayTime { seconds, ramp });
    *previous_delay = Some(seconds);

    send(
        ctx,
        AudioCommand::DelayFeedback((params.delay_feedback as f32).clamp(0.0, 0.9)),
    );
    send(ctx, AudioCommand::DelayMix(params.delay_mix as f32));
    send(ctx, AudioCommand::ReverbMix(params.reverb_mix as f32));

    let requested = params.reverb_decay as f32;
    if needs_new_impulse(ctx.shared.current_reverb_decay(), requested) {
        let kernel = build_reverb_kernel(requested, ctx.sample_rate, rng);
        ctx.shared.store_reverb_decay(requested);
        send(ctx, AudioCommand::ReverbKernel(Arc::new(kernel)));
    }
}

fn send(ctx: &DriverContext, command: AudioCommand) {
    match ctx.commands.lock() {
        Ok(mut producer) => {
            if producer.push(command).is_err() {
                warn!("audio command queue full; dropping command");
            }
        }
        Err(_) => warn!("audio command queue poisoned"),
    }
}

/// Decides step vs ramp for a delay-time setpoint: small moves step at
/// time, larger ones glide over 50 ms (the audible tape-bend).
pub(crate) fn delay_setpoint(previous: Option<f32>, requested_ms: f64) -> (f32, bool) {
    let seconds = (requested_ms as f32 / 1000.0).clamp(0.001, 2.0);
    let ramp = match previous {
        Some(prev) => (seconds - prev).abs() > DELAY_STEP_THRESHOLD_S,
        None => false,
    };
    (seconds, ramp)
}

/// The reverb impulse is regenerated only when the requested decay moved
/// far enough from the one the current impulse was built for.
pub(crate) fn needs_new_impulse(current: Option<f32>, requested: f32) -> bool {
    match current {
        Some(decay) => (decay - requested).abs() > IMPULSE_REGEN_THRESHOLD_S,
        None => true,
    }
}

/// Synthesizes the stereo impulse `random(-1,1) * (1 - i/len)^decay` and
/// partitions it for the convolver. Runs on the driver thread; the audio
/// thread only swaps the finished kernel in.
pub(crate) fn build_reverb_kernel<R: Rng>(
    decay_seconds: f32,
    sample_rate: f32,
    rng: &mut R,
) -> ReverbKernel {
    let length = ((decay_seconds.max(0.05) * sample_rate) as usize).max(1);
    let channel = |rng: &mut R| -> Vec<f32> {
        (0..length)
            .map(|i| {
                let fade = (1.0 - i as f32 / length as f32).powf(decay_seconds);
                rng.gen_range(-1.0f32..1.0) * fade
            })
            .collect()
    };
    let left = channel(rng);
    let right = channel(rng);
    ReverbKernel::from_impulse(&left, &right, decay_seconds)
}

/// Builds the note event for one record: source per mode and waveform,
/// filter and pan straight from the parameters, envelope with the sampler
/// anti-click floors.
fn build_note<R: Rng>(
    ctx: &DriverContext,
    params: &AudioParams,
    mode: EngineMode,
    rng: &mut R,
) -> (NoteEvent, bool) {
    let volume = ctx.controls.volume();
    let transpose_ratio = 2f64.powf(ctx.controls.transpose() as f64 / 12.0);
    let filter = FilterSpec {
        kind: ctx.controls.filter_kind(),
        cutoff_hz: params.filter_freq as f32,
        q: params.filter_q as f32,
    };
    let pan = params.pan as f32;

    match mode {
        EngineMode::Synthesizer => {
            let mut frequency = params.frequency * transpose_ratio;
            if let Some(scale) = ctx.controls.pitch_quantize() {
                frequency = quantize_pitch(frequency, scale);
            }
            let source = synth_source(
                ctx.controls.waveform(),
                frequency as f32,
                params.duration,
                ctx.sample_rate,
                rng,
            );
            let envelope = Envelope::new(
                params.attack,
                params.release,
                params.duration,
                volume,
                ctx.sample_rate,
            );
            (
                NoteEvent {
                    source,
                    filter,
                    pan,
                    envelope,
                },
                false,
            )
        }
        EngineMode::Sampler => {
            let sample = ctx.sample.read().ok().and_then(|guard| guard.clone());
            let Some(data) = sample else {
                // No sample loaded: a gain-only silent envelope keeps the
                // tick cadence without touching the graph.
                let envelope = Envelope::new(
                    params.attack.max(3.0),
                    params.release.max(3.0),
                    params.duration,
                    volume,
                    ctx.sample_rate,
                );
                return (
                    NoteEvent {
                        source: SourceSpec::Silent,
                        filter,
                        pan,
                        envelope,
                    },
                    true,
                );
            };

            let sample_duration = data.duration();
            let (start_seconds, crop_seconds) = if ctx.controls.random_chop() {
                // A uniformly chosen whole second, leaving room for the
                // 5 s chop window.
                let start = if sample_duration > 5.0 {
                    rng.gen_range(0..=(sample_duration - 5.0).floor() as u64) as f64
                } else {
                    0.0
                };
                (start, 5.0f64.min(sample_duration))
            } else {
                let start = params.sample_offset.clamp(0.0, 1.0) * sample_duration;
                let crop = if ctx.controls.full_note_duration() {
                    params.note_spacing / 1000.0
                } else {
                    params.duration / 1000.0
                };
                (start, crop)
            };

            let playback_rate = params.pitch * transpose_ratio;
            // Sampler notes click without a minimum fade; floor both ends.
            let envelope = Envelope::new(
                params.attack.max(3.0),
                params.release.max(3.0),
                crop_seconds * 1000.0,
                volume,
                ctx.sample_rate,
            );
            (
                NoteEvent {
                    source: SourceSpec::Sample {
                        data,
                        start_seconds,
                        playback_rate,
                        crop_seconds,
                    },
                    filter,
                    pan,
                    envelope,
                },
                false,
            )
        }
    }
}

fn synth_source<R: Rng>(
    waveform: Waveform,
    frequency: f32,
    duration_ms: f64,
    sample_rate: f32,
    rng: &mut R,
) -> SourceSpec {
    use crate::audio_engine::voice::noise_buffer;
    match waveform {
        Waveform::Sine => SourceSpec::Oscillator {
            shape: OscShape::Sine,
            frequency,
        },
        Waveform::Square | Waveform::Pwm => SourceSpec::Oscillator {
            shape: OscShape::Square,
            frequency,
        },
        Waveform::Sawtooth => SourceSpec::Oscillator {
            shape: OscShape::Sawtooth,
            frequency,
        },
        Waveform::Triangle => SourceSpec::Oscillator {
            shape: OscShape::Triangle,
            frequency,
        },
        Waveform::WhiteNoise | Waveform::PinkNoise | Waveform::BrownNoise => {
            let length = (duration_ms * sample_rate as f64 / 1000.0).ceil() as usize;
            SourceSpec::Noise {
                samples: Arc::new(noise_buffer(waveform, length, rng)),
            }
        }
        Waveform::Fm => SourceSpec::Fm { frequency },
        Waveform::Additive => SourceSpec::Additive { frequency },
    }
}
