// src/settings.rs

//! Global engine controls and their shared atomic storage.
//!
//! The playback driver runs on its own thread and reads every control at
//! note time, so the whole control surface is a block of atomics. Floats use
//! the `PARAM_SCALER` fixed-point convention; enum selectors are stored as
//! their `u32` discriminant.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use crate::quantize::PitchScale;

// Scaler for storing float values in atomics.
pub const PARAM_SCALER: f32 = 1_000_000.0;

/// Which parameter set and source construction the engine uses.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Synthesizer = 0,
    Sampler = 1,
}

impl EngineMode {
    pub const ALL: [EngineMode; 2] = [EngineMode::Synthesizer, EngineMode::Sampler];
}

impl From<u32> for EngineMode {
    fn from(val: u32) -> Self {
        match val {
            1 => EngineMode::Sampler,
            _ => EngineMode::Synthesizer,
        }
    }
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineMode::Synthesizer => write!(f, "synthesizer"),
            EngineMode::Sampler => write!(f, "sampler"),
        }
    }
}

impl FromStr for EngineMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synthesizer" | "synth" => Ok(EngineMode::Synthesizer),
            "sampler" => Ok(EngineMode::Sampler),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Source shape used by synthesizer-mode notes.
///
/// `Pwm` currently renders as a plain square; duty-cycle modulation is a
/// reserved extension.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Waveform {
    Sine = 0,
    Square = 1,
    Sawtooth = 2,
    Triangle = 3,
    WhiteNoise = 4,
    PinkNoise = 5,
    BrownNoise = 6,
    Fm = 7,
    Additive = 8,
    Pwm = 9,
}

impl Waveform {
    pub const ALL: [Waveform; 10] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
        Waveform::WhiteNoise,
        Waveform::PinkNoise,
        Waveform::BrownNoise,
        Waveform::Fm,
        Waveform::Additive,
        Waveform::Pwm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
            Waveform::WhiteNoise => "white-noise",
            Waveform::PinkNoise => "pink-noise",
            Waveform::BrownNoise => "brown-noise",
            Waveform::Fm => "fm",
            Waveform::Additive => "additive",
            Waveform::Pwm => "pwm",
        }
    }
}

impl From<u32> for Waveform {
    fn from(val: u32) -> Self {
        Waveform::ALL
            .get(val as usize)
            .copied()
            .unwrap_or(Waveform::Sine)
    }
}

impl std::fmt::Display for Waveform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Waveform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Waveform::ALL
            .iter()
            .find(|w| w.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown waveform: {}", s))
    }
}

/// Per-note filter response.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Lowpass = 0,
    Highpass = 1,
    Bandpass = 2,
    Notch = 3,
}

impl FilterKind {
    pub const ALL: [FilterKind; 4] = [
        FilterKind::Lowpass,
        FilterKind::Highpass,
        FilterKind::Bandpass,
        FilterKind::Notch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Lowpass => "lowpass",
            FilterKind::Highpass => "highpass",
            FilterKind::Bandpass => "bandpass",
            FilterKind::Notch => "notch",
        }
    }
}

impl From<u32> for FilterKind {
    fn from(val: u32) -> Self {
        FilterKind::ALL
            .get(val as usize)
            .copied()
            .unwrap_or(FilterKind::Lowpass)
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKind::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown filter type: {}", s))
    }
}

/// The shared control surface, read by the driver thread at each tick.
#[derive(Debug)]
pub struct Controls {
    volume: AtomicU32,
    transpose: AtomicI32,
    speed: AtomicU32,
    waveform: AtomicU32,
    filter: AtomicU32,
    mode: AtomicU32,
    pitch_quantize: AtomicBool,
    pitch_scale: AtomicU32,
    rhythm_quantize: AtomicBool,
    random_chop: AtomicBool,
    full_note_duration: AtomicBool,
}

impl Default for Controls {
    fn default() -> Self {
        Self::new()
    }
}

impl Controls {
    pub fn new() -> Self {
        Self {
            volume: AtomicU32::new((0.7 * PARAM_SCALER) as u32),
            transpose: AtomicI32::new(0),
            speed: AtomicU32::new((1.0 * PARAM_SCALER) as u32),
            waveform: AtomicU32::new(Waveform::Sine as u32),
            filter: AtomicU32::new(FilterKind::Lowpass as u32),
            mode: AtomicU32::new(EngineMode::Synthesizer as u32),
            pitch_quantize: AtomicBool::new(false),
            pitch_scale: AtomicU32::new(PitchScale::Pentatonic as u32),
            rhythm_quantize: AtomicBool::new(false),
            random_chop: AtomicBool::new(false),
            full_note_duration: AtomicBool::new(false),
        }
    }

    pub fn set_volume(&self, volume: f32) {
        let v = volume.clamp(0.0, 1.0);
        self.volume.store((v * PARAM_SCALER) as u32, Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        self.volume.load(Ordering::Relaxed) as f32 / PARAM_SCALER
    }

    pub fn set_transpose(&self, semitones: i32) {
        self.transpose.store(semitones.clamp(-48, 48), Ordering::Relaxed);
    }

    pub fn transpose(&self) -> i32 {
        self.transpose.load(Ordering::Relaxed)
    }

    pub fn set_speed(&self, multiplier: f32) {
        let s = multiplier.clamp(0.05, 16.0);
        self.speed.store((s * PARAM_SCALER) as u32, Ordering::Relaxed);
    }

    pub fn speed(&self) -> f32 {
        self.speed.load(Ordering::Relaxed) as f32 / PARAM_SCALER
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.waveform.store(waveform as u32, Ordering::Relaxed);
    }

    pub fn waveform(&self) -> Waveform {
        Waveform::from(self.waveform.load(Ordering::Relaxed))
    }

    pub fn set_filter_kind(&self, kind: FilterKind) {
        self.filter.store(kind as u32, Ordering::Relaxed);
    }

    pub fn filter_kind(&self) -> FilterKind {
        FilterKind::from(self.filter.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: EngineMode) {
        self.mode.store(mode as u32, Ordering::Relaxed);
    }

    pub fn mode(&self) -> EngineMode {
        EngineMode::from(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_pitch_quantize(&self, enabled: bool, scale: PitchScale) {
        self.pitch_scale.store(scale as u32, Ordering::Relaxed);
        self.pitch_quantize.store(enabled, Ordering::Relaxed);
    }

    pub fn pitch_quantize(&self) -> Option<PitchScale> {
        if self.pitch_quantize.load(Ordering::Relaxed) {
            Some(PitchScale::from(self.pitch_scale.load(Ordering::Relaxed)))
        } else {
            None
        }
    }

    pub fn set_rhythm_quantize(&self, enabled: bool) {
        self.rhythm_quantize.store(enabled, Ordering::Relaxed);
    }

    pub fn rhythm_quantize(&self) -> bool {
        self.rhythm_quantize.load(Ordering::Relaxed)
    }

    pub fn set_random_chop(&self, enabled: bool) {
        self.random_chop.store(enabled, Ordering::Relaxed);
    }

    pub fn random_chop(&self) -> bool {
        self.random_chop.load(Ordering::Relaxed)
    }

    pub fn set_full_note_duration(&self, enabled: bool) {
        self.full_note_duration.store(enabled, Ordering::Relaxed);
    }

    pub fn full_note_duration(&self) -> bool {
        self.full_note_duration.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_round_trip_through_atomics() {
        let c = Controls::new();
        c.set_volume(0.25);
        assert!((c.volume() - 0.25).abs() < 1e-5);
        c.set_transpose(-7);
        assert_eq!(c.transpose(), -7);
        c.set_speed(2.0);
        assert!((c.speed() - 2.0).abs() < 1e-5);
        c.set_waveform(Waveform::Fm);
        assert_eq!(c.waveform(), Waveform::Fm);
        c.set_mode(EngineMode::Sampler);
        assert_eq!(c.mode(), EngineMode::Sampler);
    }

    #[test]
    fn volume_is_clamped() {
        let c = Controls::new();
        c.set_volume(3.0);
        assert_eq!(c.volume(), 1.0);
        c.set_volume(-1.0);
        assert_eq!(c.volume(), 0.0);
    }

    #[test]
    fn pitch_quantize_toggle_carries_scale() {
        let c = Controls::new();
        assert_eq!(c.pitch_quantize(), None);
        c.set_pitch_quantize(true, PitchScale::Dorian);
        assert_eq!(c.pitch_quantize(), Some(PitchScale::Dorian));
        c.set_pitch_quantize(false, PitchScale::Dorian);
        assert_eq!(c.pitch_quantize(), None);
    }

    #[test]
    fn waveform_names_match_wire_strings() {
        assert_eq!("pink-noise".parse::<Waveform>(), Ok(Waveform::PinkNoise));
        assert_eq!(Waveform::WhiteNoise.to_string(), "white-noise");
        assert!("zigzag".parse::<Waveform>().is_err());
    }
}
