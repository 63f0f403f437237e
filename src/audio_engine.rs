// src/audio_engine.rs

//! The audio-thread renderer.
//!
//! `AudioEngine` lives inside the output-stream callback (or is pumped by
//! hand in detached mode). Each buffer it first drains the command queue,
//! then renders: active voices are summed into a stereo frame, the frame
//! runs through the persistent effects bus, and the result is interleaved
//! into the device buffer. A copy of the output feeds the waveform tap for
//! the host's analyser display.

pub mod command;
pub mod convolver;
pub mod effects;
pub mod envelope;
pub mod voice;

use ringbuf::{HeapConsumer, HeapProducer};

use crate::audio_engine::command::AudioCommand;
use crate::audio_engine::effects::EffectsChain;
use crate::audio_engine::voice::Voice;

/// Upper bound on simultaneously sounding notes (one live note plus effect
/// tails); the oldest voice is stolen beyond this.
pub const MAX_VOICES: usize = 32;

pub struct AudioEngine {
    commands: HeapConsumer<AudioCommand>,
    voices: Vec<Voice>,
    effects: EffectsChain,
    tap: HeapProducer<f32>,
    sample_rate: f32,
}

impl AudioEngine {
    pub(crate) fn new(
        sample_rate: f32,
        commands: HeapConsumer<AudioCommand>,
        tap: HeapProducer<f32>,
    ) -> AudioEngine {
        AudioEngine {
            commands,
            voices: Vec::with_capacity(MAX_VOICES),
            effects: EffectsChain::new(sample_rate),
            tap,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Number of currently sounding voices (tails included).
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Drains pending setpoints and note events.
    pub fn handle_commands(&mut self) {
        while let Some(command) = self.commands.pop() {
            match command {
                AudioCommand::Note(event) => {
                    if self.voices.len() >= MAX_VOICES {
                        self.voices.remove(0);
                    }
                    self.voices.push(Voice::new(*event, self.sample_rate));
                }
                AudioCommand::DelayTime { seconds, ramp } => {
                    self.effects.set_delay_time(seconds, ramp)
                }
                AudioCommand::DelayFeedback(v) => self.effects.set_delay_feedback(v),
                AudioCommand::DelayMix(v) => self.effects.set_delay_mix(v),
                AudioCommand::ReverbMix(v) => self.effects.set_reverb_mix(v),
                AudioCommand::ReverbKernel(kernel) => self.effects.set_reverb_kernel(kernel),
            }
        }
    }

    /// Renders one interleaved buffer with the given channel count.
    pub fn process_buffer(&mut self, data: &mut [f32], channels: usize) {
        self.handle_commands();
        if channels == 0 {
            return;
        }
        for frame in data.chunks_mut(channels) {
            let (l, r) = self.next_frame();
            for (ch, slot) in frame.iter_mut().enumerate() {
                *slot = match ch {
                    0 => l,
                    1 => r,
                    _ => (l + r) * 0.5,
                };
            }
        }
    }

    fn next_frame(&mut self) -> (f32, f32) {
        let mut sum_l = 0.0f32;
        let mut sum_r = 0.0f32;
        let mut any_finished = false;
        for voice in &mut self.voices {
            let (l, r) = voice.next_frame();
            sum_l += l;
            sum_r += r;
            any_finished |= !voice.is_active();
        }
        if any_finished {
            self.voices.retain(|v| v.is_active());
        }

        let (out_l, out_r) = self.effects.process(sum_l, sum_r);
        // Feed the host's analyser; dropping samples when it lags is fine.
        let _ = self.tap.push((out_l + out_r) * 0.5);
        (out_l, out_r)
    }

    #[cfg(test)]
    pub(crate) fn effects(&self) -> &EffectsChain {
        &self.effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::envelope::Envelope;
    use crate::audio_engine::voice::{FilterSpec, NoteEvent, OscShape, SourceSpec};
    use crate::settings::FilterKind;
    use ringbuf::HeapRb;

    const SR: f32 = 44_100.0;

    fn engine_pair(
        capacity: usize,
    ) -> (HeapProducer<AudioCommand>, AudioEngine, HeapConsumer<f32>) {
        let (producer, consumer) = HeapRb::<AudioCommand>::new(capacity).split();
        let (tap_tx, tap_rx) = HeapRb::<f32>::new(1 << 15).split();
        (producer, AudioEngine::new(SR, consumer, tap_tx), tap_rx)
    }

    fn sine_note(duration_ms: f64) -> AudioCommand {
        AudioCommand::Note(Box::new(NoteEvent {
            source: SourceSpec::Oscillator {
                shape: OscShape::Sine,
                frequency: 440.0,
            },
            filter: FilterSpec {
                kind: FilterKind::Lowpass,
                cutoff_hz: 8000.0,
                q: 0.707,
            },
            pan: 0.0,
            envelope: Envelope::new(5.0, 20.0, duration_ms, 0.8, SR),
        }))
    }

    #[test]
    fn note_command_produces_audible_output() {
        let (mut producer, mut engine, _tap) = engine_pair(16);
        producer.push(sine_note(100.0)).ok();
        let mut buf = vec![0.0f32; 2048];
        engine.process_buffer(&mut buf, 2);
        assert_eq!(engine.active_voices(), 1);
        let energy: f32 = buf.iter().map(|s| s * s).sum();
        assert!(energy > 0.0);
        assert!(buf.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn finished_voices_are_reaped() {
        let (mut producer, mut engine, _tap) = engine_pair(16);
        producer.push(sine_note(10.0)).ok();
        let mut buf = vec![0.0f32; 4096];
        engine.process_buffer(&mut buf, 2);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn voice_cap_steals_the_oldest() {
        let (mut producer, mut engine, _tap) = engine_pair(MAX_VOICES * 2 + 4);
        for _ in 0..MAX_VOICES + 5 {
            producer.push(sine_note(5000.0)).ok();
        }
        let mut buf = vec![0.0f32; 64];
        engine.process_buffer(&mut buf, 2);
        assert_eq!(engine.active_voices(), MAX_VOICES);
    }

    #[test]
    fn effect_setpoints_reach_the_chain() {
        let (mut producer, mut engine, _tap) = engine_pair(16);
        producer
            .push(AudioCommand::DelayTime {
                seconds: 0.5,
                ramp: false,
            })
            .ok();
        producer.push(AudioCommand::DelayMix(0.4)).ok();
        let mut buf = vec![0.0f32; 64];
        engine.process_buffer(&mut buf, 2);
        assert_eq!(engine.effects().delay_time(), 0.5);
    }

    #[test]
    fn tap_receives_rendered_samples() {
        let (mut producer, mut engine, mut tap) = engine_pair(16);
        producer.push(sine_note(100.0)).ok();
        let mut buf = vec![0.0f32; 1024];
        engine.process_buffer(&mut buf, 2);
        let mut drained = vec![0.0f32; 1024];
        let n = tap.pop_slice(&mut drained);
        assert_eq!(n, 512);
    }

    #[test]
    fn mono_and_multichannel_buffers_are_supported() {
        let (mut producer, mut engine, _tap) = engine_pair(16);
        producer.push(sine_note(100.0)).ok();
        let mut mono = vec![0.0f32; 256];
        engine.process_buffer(&mut mono, 1);
        let mut quad = vec![0.0f32; 256];
        engine.process_buffer(&mut quad, 4);
        assert!(mono.iter().chain(quad.iter()).all(|s| s.is_finite()));
    }
}
