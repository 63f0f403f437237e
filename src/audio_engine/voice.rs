// src/audio_engine/voice.rs

//! Per-note source construction and rendering.
//!
//! Each note gets a fresh voice: source, biquad filter, equal-power panner
//! and its scheduled envelope. Voices are created when the audio thread
//! dequeues a note event and die when the envelope runs out; the persistent
//! effects bus lives elsewhere.

use std::f32::consts::TAU;
use std::f64::consts::FRAC_PI_4;
use std::sync::Arc;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use rand::Rng;

use crate::audio_engine::envelope::Envelope;
use crate::sample::SampleData;
use crate::settings::{FilterKind, Waveform};

/// Plain oscillator shapes; the modulated waveforms carry their own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscShape {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// What the driver decided this note's source should be.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    Oscillator { shape: OscShape, frequency: f32 },
    /// Carrier at `f`, sine modulator at `2.5f`, modulation depth `0.8f`.
    Fm { frequency: f32 },
    /// Fundamental plus partials at 2f, 3f, 4f with gains 0.3/h.
    Additive { frequency: f32 },
    /// Pre-generated buffer played once (the noise waveforms).
    Noise { samples: Arc<Vec<f32>> },
    Sample {
        data: Arc<SampleData>,
        start_seconds: f64,
        playback_rate: f64,
        crop_seconds: f64,
    },
    /// Gain-only envelope with no audio, used when sampler mode has no
    /// sample loaded.
    Silent,
}

/// Per-note filter settings.
#[derive(Debug, Clone, Copy)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub cutoff_hz: f32,
    pub q: f32,
}

/// Everything the audio thread needs to start one note. The envelope ships
/// inside the event, so a source can never start at default gain.
#[derive(Debug, Clone)]
pub struct NoteEvent {
    pub source: SourceSpec,
    pub filter: FilterSpec,
    /// Stereo position in [-1, 1].
    pub pan: f32,
    pub envelope: Envelope,
}

enum SourceState {
    Osc {
        shape: OscShape,
        phase: f32,
        step: f32,
    },
    Fm {
        frequency: f32,
        carrier_phase: f32,
        mod_phase: f32,
        sample_rate: f32,
    },
    Additive {
        phases: [f32; 4],
        steps: [f32; 4],
    },
    Noise {
        samples: Arc<Vec<f32>>,
        pos: usize,
    },
    Sample {
        data: Arc<SampleData>,
        pos: f64,
        step: f64,
        end: f64,
    },
    Silent,
}

/// One live note inside the renderer.
pub struct Voice {
    source: SourceState,
    filter: Option<DirectForm2Transposed<f32>>,
    pan_l: f32,
    pan_r: f32,
    envelope: Envelope,
    clock: u64,
}

impl Voice {
    pub fn new(event: NoteEvent, sample_rate: f32) -> Voice {
        let source = match event.source {
            SourceSpec::Oscillator { shape, frequency } => SourceState::Osc {
                shape,
                phase: 0.0,
                step: frequency.max(0.0) / sample_rate,
            },
            SourceSpec::Fm { frequency } => SourceState::Fm {
                frequency,
                carrier_phase: 0.0,
                mod_phase: 0.0,
                sample_rate,
            },
            SourceSpec::Additive { frequency } => {
                let base = frequency.max(0.0) / sample_rate;
                SourceState::Additive {
                    phases: [0.0; 4],
                    steps: [base, base * 2.0, base * 3.0, base * 4.0],
                }
            }
            SourceSpec::Noise { samples } => SourceState::Noise { samples, pos: 0 },
            SourceSpec::Sample {
                data,
                start_seconds,
                playback_rate,
                crop_seconds,
            } => {
                let file_rate = data.sample_rate as f64;
                let start = (start_seconds.max(0.0) * file_rate).min(data.data.len() as f64);
                let end = (start + crop_seconds.max(0.0) * file_rate).min(data.data.len() as f64);
                SourceState::Sample {
                    data,
                    pos: start,
                    // Playback rate is relative to the file's own rate.
                    step: playback_rate.max(0.0) * file_rate / sample_rate as f64,
                    end,
                }
            }
            SourceSpec::Silent => SourceState::Silent,
        };

        // Equal-power pan law.
        let angle = (event.pan.clamp(-1.0, 1.0) as f64 + 1.0) * FRAC_PI_4;
        let pan_l = angle.cos() as f32;
        let pan_r = angle.sin() as f32;

        Voice {
            source,
            filter: build_filter(event.filter, sample_rate),
            pan_l,
            pan_r,
            envelope: event.envelope,
            clock: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.envelope.is_finished(self.clock)
    }

    /// Renders one stereo frame: source, filter, pan, envelope.
    pub fn next_frame(&mut self) -> (f32, f32) {
        if !self.is_active() {
            return (0.0, 0.0);
        }
        let raw = self.next_source_sample();
        let filtered = match &mut self.filter {
            Some(f) => f.run(raw),
            None => raw,
        };
        let gain = self.envelope.gain_at(self.clock);
        self.clock += 1;
        (filtered * self.pan_l * gain, filtered * self.pan_r * gain)
    }

    fn next_source_sample(&mut self) -> f32 {
        match &mut self.source {
            SourceState::Osc { shape, phase, step } => {
                let out = osc_sample(*shape, *phase);
                *phase = (*phase + *step).fract();
                out
            }
            SourceState::Fm {
                frequency,
                carrier_phase,
                mod_phase,
                sample_rate,
            } => {
                *mod_phase = (*mod_phase + *frequency * 2.5 / *sample_rate).fract();
                let modulation = (*mod_phase * TAU).sin();
                let instant = *frequency + *frequency * 0.8 * modulation;
                *carrier_phase = (*carrier_phase + instant / *sample_rate).rem_euclid(1.0);
                (*carrier_phase * TAU).sin()
            }
            SourceState::Additive { phases, steps } => {
                // 0.6 on the fundamental, 0.3/h on partials 2..4.
                const GAINS: [f32; 4] = [0.6, 0.15, 0.1, 0.075];
                let mut out = 0.0;
                for i in 0..4 {
                    out += GAINS[i] * (phases[i] * TAU).sin();
                    phases[i] = (phases[i] + steps[i]).fract();
                }
                out
            }
            SourceState::Noise { samples, pos } => {
                let out = samples.get(*pos).copied().unwrap_or(0.0);
                *pos += 1;
                out
            }
            SourceState::Sample { data, pos, step, end } => {
                if *pos >= *end {
                    return 0.0;
                }
                let i = *pos as usize;
                let frac = (*pos - i as f64) as f32;
                let a = data.data.get(i).copied().unwrap_or(0.0);
                let b = data.data.get(i + 1).copied().unwrap_or(a);
                *pos += *step;
                a + frac * (b - a)
            }
            SourceState::Silent => 0.0,
        }
    }
}

fn osc_sample(shape: OscShape, phase: f32) -> f32 {
    match shape {
        OscShape::Sine => (phase * TAU).sin(),
        OscShape::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        OscShape::Sawtooth => 2.0 * phase - 1.0,
        OscShape::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
    }
}

fn build_filter(spec: FilterSpec, sample_rate: f32) -> Option<DirectForm2Transposed<f32>> {
    let kind = match spec.kind {
        FilterKind::Lowpass => Type::LowPass,
        FilterKind::Highpass => Type::HighPass,
        FilterKind::Bandpass => Type::BandPass,
        FilterKind::Notch => Type::Notch,
    };
    let cutoff = spec.cutoff_hz.clamp(20.0, sample_rate * 0.45);
    let q = spec.q.clamp(0.05, 30.0);
    Coefficients::<f32>::from_params(kind, sample_rate.hz(), cutoff.hz(), q)
        .ok()
        .map(DirectForm2Transposed::<f32>::new)
}

/// Pre-generates a noise buffer of `length` samples for the noise
/// waveforms. Pink noise uses Paul Kellett's 7-coefficient filter; brown
/// noise leaky-integrates white noise and scales by 3.5 to restore
/// loudness.
pub fn noise_buffer<R: Rng>(waveform: Waveform, length: usize, rng: &mut R) -> Vec<f32> {
    let mut out = Vec::with_capacity(length);
    match waveform {
        Waveform::PinkNoise => {
            let (mut b0, mut b1, mut b2, mut b3, mut b4, mut b5, mut b6) =
                (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);
            for _ in 0..length {
                let white: f32 = rng.gen_range(-1.0..1.0);
                b0 = 0.99886 * b0 + white * 0.0555179;
                b1 = 0.99332 * b1 + white * 0.0750759;
                b2 = 0.96900 * b2 + white * 0.1538520;
                b3 = 0.86650 * b3 + white * 0.3104856;
                b4 = 0.55000 * b4 + white * 0.5329522;
                b5 = -0.7616 * b5 - white * 0.0168980;
                let pink = (b0 + b1 + b2 + b3 + b4 + b5 + b6 + white * 0.5362) * 0.11;
                b6 = white * 0.115926;
                out.push(pink);
            }
        }
        Waveform::BrownNoise => {
            let mut last = 0.0f32;
            for _ in 0..length {
                let white: f32 = rng.gen_range(-1.0..1.0);
                last = (last + 0.02 * white) / 1.02;
                out.push(last * 3.5);
            }
        }
        _ => {
            for _ in 0..length {
                out.push(rng.gen_range(-1.0..1.0));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SR: f32 = 44_100.0;

    fn event(source: SourceSpec) -> NoteEvent {
        NoteEvent {
            source,
            filter: FilterSpec {
                kind: FilterKind::Lowpass,
                cutoff_hz: 8000.0,
                q: 0.707,
            },
            pan: 0.0,
            envelope: Envelope::new(5.0, 50.0, 200.0, 0.8, SR),
        }
    }

    fn render(voice: &mut Voice, frames: usize) -> Vec<(f32, f32)> {
        (0..frames).map(|_| voice.next_frame()).collect()
    }

    #[test]
    fn oscillator_output_is_finite_and_bounded() {
        for shape in [
            OscShape::Sine,
            OscShape::Square,
            OscShape::Sawtooth,
            OscShape::Triangle,
        ] {
            let mut voice = Voice::new(
                event(SourceSpec::Oscillator {
                    shape,
                    frequency: 440.0,
                }),
                SR,
            );
            for (l, r) in render(&mut voice, 2000) {
                assert!(l.is_finite() && r.is_finite());
                assert!(l.abs() <= 1.5 && r.abs() <= 1.5);
            }
        }
    }

    #[test]
    fn fm_and_additive_are_finite() {
        for source in [
            SourceSpec::Fm { frequency: 220.0 },
            SourceSpec::Additive { frequency: 220.0 },
        ] {
            let mut voice = Voice::new(event(source), SR);
            for (l, r) in render(&mut voice, 4000) {
                assert!(l.is_finite() && r.is_finite());
            }
        }
    }

    #[test]
    fn voice_dies_at_envelope_end() {
        let mut voice = Voice::new(
            event(SourceSpec::Oscillator {
                shape: OscShape::Sine,
                frequency: 440.0,
            }),
            SR,
        );
        let duration = (0.2 * SR as f64).ceil() as usize;
        render(&mut voice, duration + 1);
        assert!(!voice.is_active());
        assert_eq!(voice.next_frame(), (0.0, 0.0));
    }

    #[test]
    fn hard_pan_silences_the_other_channel() {
        let mut left = Voice::new(
            NoteEvent {
                pan: -1.0,
                ..event(SourceSpec::Oscillator {
                    shape: OscShape::Sine,
                    frequency: 440.0,
                })
            },
            SR,
        );
        let frames = render(&mut left, 500);
        let right_energy: f32 = frames.iter().map(|(_, r)| r * r).sum();
        let left_energy: f32 = frames.iter().map(|(l, _)| l * l).sum();
        assert!(right_energy < 1e-6);
        assert!(left_energy > 0.0);
    }

    #[test]
    fn silent_source_emits_nothing() {
        let mut voice = Voice::new(event(SourceSpec::Silent), SR);
        for (l, r) in render(&mut voice, 1000) {
            assert_eq!((l, r), (0.0, 0.0));
        }
        assert!(voice.is_active());
    }

    #[test]
    fn sample_voice_respects_start_and_crop() {
        let data = Arc::new(SampleData {
            data: (0..44_100).map(|i| (i as f32 / 44_100.0).sin()).collect(),
            sample_rate: 44_100,
            channels: 1,
        });
        let mut voice = Voice::new(
            NoteEvent {
                filter: FilterSpec {
                    kind: FilterKind::Lowpass,
                    cutoff_hz: 18_000.0,
                    q: 0.707,
                },
                pan: 0.0,
                envelope: Envelope::new(3.0, 3.0, 1000.0, 1.0, SR),
                source: SourceSpec::Sample {
                    data: data.clone(),
                    start_seconds: 0.5,
                    playback_rate: 1.0,
                    crop_seconds: 0.1,
                },
            },
            SR,
        );
        // Crop of 0.1 s at unity rate: signal for ~4410 frames, silence after.
        let frames = render(&mut voice, 6000);
        let early: f32 = frames[..4000].iter().map(|(l, _)| l.abs()).sum();
        let late: f32 = frames[4500..].iter().map(|(l, _)| l.abs()).sum();
        assert!(early > 0.0);
        assert!(late < 1e-3);
    }

    #[test]
    fn playback_rate_folds_in_the_file_rate() {
        let data = Arc::new(SampleData {
            data: vec![1.0; 22_050],
            sample_rate: 22_050,
            channels: 1,
        });
        let voice = Voice::new(
            NoteEvent {
                source: SourceSpec::Sample {
                    data,
                    start_seconds: 0.0,
                    playback_rate: 1.0,
                    crop_seconds: 1.0,
                },
                ..event(SourceSpec::Silent)
            },
            SR,
        );
        match voice.source {
            SourceState::Sample { step, .. } => assert!((step - 0.5).abs() < 1e-9),
            _ => panic!("expected sample source"),
        }
    }

    #[test]
    fn noise_buffers_have_requested_length_and_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for w in [Waveform::WhiteNoise, Waveform::PinkNoise, Waveform::BrownNoise] {
            let buf = noise_buffer(w, 4410, &mut rng);
            assert_eq!(buf.len(), 4410);
            assert!(buf.iter().all(|s| s.is_finite() && s.abs() <= 4.0));
        }
    }
}
