// src/audio_engine/effects.rs

//! The persistent global effects bus.
//!
//! Built once per renderer and shared by every note: the enveloped voice
//! mix feeds the reverb stage (convolver plus dry tap), whose output feeds
//! the delay stage (feedback loop plus wet/dry), so delay repeats inherit
//! some reverb tail. Parameter setpoints arrive once per note; the delay
//! time distinguishes a step from a 50 ms linear ramp, which is what makes
//! large jumps audible as a tape-style pitch bend.

use std::sync::Arc;

use crate::audio_engine::convolver::{Convolver, ReverbKernel};

/// Ramp length used when a delay-time change exceeds the step threshold.
pub const DELAY_RAMP_MS: f32 = 50.0;

/// Delay-time clamp, in seconds.
pub const DELAY_TIME_MIN_S: f32 = 0.001;
pub const DELAY_TIME_MAX_S: f32 = 2.0;

/// A fractional delay line over a circular buffer with linear-interpolated
/// reads.
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(max_samples: usize) -> DelayLine {
        DelayLine {
            buffer: vec![0.0; max_samples.max(1)],
            write_pos: 0,
        }
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    #[inline]
    pub fn read(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len() as f32;
        let clamped = delay_samples.clamp(1.0, len - 1.0);
        let read_pos = (self.write_pos as f32 - clamped + len) % len;
        let index1 = read_pos.floor() as usize;
        let index2 = (index1 + 1) % self.buffer.len();
        let fraction = read_pos.fract();
        let sample1 = self.buffer[index1];
        let sample2 = self.buffer[index2];
        sample1 + fraction * (sample2 - sample1)
    }
}

/// A parameter that either steps immediately or glides linearly over a
/// fixed number of samples.
#[derive(Debug, Clone, Copy)]
pub struct RampedParam {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl RampedParam {
    pub fn new(value: f32) -> RampedParam {
        RampedParam {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Jump to the value on the next sample.
    pub fn set_step(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.remaining = 0;
    }

    /// Glide linearly to the value over `samples`.
    pub fn set_ramp(&mut self, value: f32, samples: u32) {
        if samples == 0 {
            self.set_step(value);
            return;
        }
        self.target = value;
        self.step = (value - self.current) / samples as f32;
        self.remaining = samples;
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    #[inline]
    pub fn advance(&mut self) -> f32 {
        if self.remaining > 0 {
            self.current += self.step;
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            }
        }
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }
}

/// The global reverb-into-delay bus.
pub struct EffectsChain {
    sample_rate: f32,
    convolver: Convolver,
    reverb_wet: f32,
    reverb_dry: f32,
    delay_l: DelayLine,
    delay_r: DelayLine,
    delay_time_s: RampedParam,
    delay_feedback: f32,
    delay_wet: f32,
    delay_dry: f32,
}

impl EffectsChain {
    pub fn new(sample_rate: f32) -> EffectsChain {
        let max_delay = (DELAY_TIME_MAX_S * sample_rate).ceil() as usize + 2;
        EffectsChain {
            sample_rate,
            convolver: Convolver::new(),
            reverb_wet: 0.3,
            reverb_dry: 0.7,
            delay_l: DelayLine::new(max_delay),
            delay_r: DelayLine::new(max_delay),
            delay_time_s: RampedParam::new(0.25),
            delay_feedback: 0.3,
            delay_wet: 0.25,
            delay_dry: 0.75,
        }
    }

    /// Applies a delay-time setpoint. `ramp` selects the 50 ms glide; the
    /// caller decides based on how far the new value is from the previous
    /// one.
    pub fn set_delay_time(&mut self, seconds: f32, ramp: bool) {
        let clamped = seconds.clamp(DELAY_TIME_MIN_S, DELAY_TIME_MAX_S);
        if ramp {
            let samples = (DELAY_RAMP_MS / 1000.0 * self.sample_rate) as u32;
            self.delay_time_s.set_ramp(clamped, samples);
        } else {
            self.delay_time_s.set_step(clamped);
        }
    }

    pub fn set_delay_feedback(&mut self, feedback: f32) {
        self.delay_feedback = feedback.clamp(0.0, 0.9);
    }

    /// Wet and dry always sum to one.
    pub fn set_delay_mix(&mut self, mix: f32) {
        let wet = mix.clamp(0.0, 1.0);
        self.delay_wet = wet;
        self.delay_dry = 1.0 - wet;
    }

    pub fn set_reverb_mix(&mut self, mix: f32) {
        let wet = mix.clamp(0.0, 1.0);
        self.reverb_wet = wet;
        self.reverb_dry = 1.0 - wet;
    }

    pub fn set_reverb_kernel(&mut self, kernel: Arc<ReverbKernel>) {
        self.convolver.set_kernel(kernel);
    }

    pub fn reverb_decay(&self) -> Option<f32> {
        self.convolver.current_decay()
    }

    pub fn delay_time(&self) -> f32 {
        self.delay_time_s.value()
    }

    pub fn delay_is_ramping(&self) -> bool {
        self.delay_time_s.is_ramping()
    }

    /// Processes one stereo frame of the summed voice mix.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let (conv_l, conv_r) = self.convolver.process(left, right);
        let bus_l = self.reverb_wet * conv_l + self.reverb_dry * left;
        let bus_r = self.reverb_wet * conv_r + self.reverb_dry * right;

        let delay_samples = self.delay_time_s.advance() * self.sample_rate;
        let echo_l = self.delay_l.read(delay_samples);
        let echo_r = self.delay_r.read(delay_samples);
        self.delay_l
            .write((bus_l + echo_l * self.delay_feedback).clamp(-4.0, 4.0));
        self.delay_r
            .write((bus_r + echo_r * self.delay_feedback).clamp(-4.0, 4.0));

        (
            self.delay_wet * echo_l + self.delay_dry * bus_l,
            self.delay_wet * echo_r + self.delay_dry * bus_r,
        )
    }
}
