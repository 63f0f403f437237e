// src/quantize.rs

//! Optional pitch and rhythm snapping.
//!
//! The pitch quantizer pulls synthesized frequencies onto a musical scale;
//! the rhythm quantizer pulls inter-note spacings onto a 120-bpm grid. Both
//! are opt-in user toggles and default to off.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Scales the pitch quantizer can snap to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PitchScale {
    Pentatonic = 0,
    Major = 1,
    Minor = 2,
    Dorian = 3,
    Mixolydian = 4,
    Chromatic = 5,
}

impl PitchScale {
    pub const ALL: [PitchScale; 6] = [
        PitchScale::Pentatonic,
        PitchScale::Major,
        PitchScale::Minor,
        PitchScale::Dorian,
        PitchScale::Mixolydian,
        PitchScale::Chromatic,
    ];

    /// Interval pattern in semitones from the root.
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            PitchScale::Pentatonic => &[0, 2, 4, 7, 9],
            PitchScale::Major => &[0, 2, 4, 5, 7, 9, 11],
            PitchScale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            PitchScale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            PitchScale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            PitchScale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PitchScale::Pentatonic => "pentatonic",
            PitchScale::Major => "major",
            PitchScale::Minor => "minor",
            PitchScale::Dorian => "dorian",
            PitchScale::Mixolydian => "mixolydian",
            PitchScale::Chromatic => "chromatic",
        }
    }
}

impl From<u32> for PitchScale {
    fn from(val: u32) -> Self {
        PitchScale::ALL
            .get(val as usize)
            .copied()
            .unwrap_or(PitchScale::Pentatonic)
    }
}

impl std::fmt::Display for PitchScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PitchScale {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PitchScale::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown scale: {}", s))
    }
}

/// Spacing grid in milliseconds: eighths through halves at 120 bpm.
pub const RHYTHM_GRID_MS: [f64; 8] = [125.0, 250.0, 375.0, 500.0, 750.0, 1000.0, 1500.0, 2000.0];

static LOG2_440: Lazy<f64> = Lazy::new(|| 440.0f64.log2());

/// Snaps a frequency to the nearest degree of the given scale.
///
/// The frequency is converted to a MIDI note number, split into octave and
/// pitch class, and the pitch class moves to the nearest scale degree.
pub fn quantize_pitch(freq: f64, scale: PitchScale) -> f64 {
    if !(freq.is_finite() && freq > 0.0) {
        return freq;
    }
    let midi = 69.0 + 12.0 * (freq.log2() - *LOG2_440);
    let octave = (midi / 12.0).floor();
    let pitch_class = midi - octave * 12.0;

    let snapped = scale
        .intervals()
        .iter()
        .map(|&d| d as f64)
        .min_by(|a, b| {
            let da = (a - pitch_class).abs();
            let db = (b - pitch_class).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(pitch_class);

    440.0 * 2f64.powf((octave * 12.0 + snapped - 69.0) / 12.0)
}

/// Snaps a spacing in milliseconds to the nearest grid slot.
pub fn quantize_spacing(ms: f64) -> f64 {
    RHYTHM_GRID_MS
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = (a - ms).abs();
            let db = (b - ms).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(ms)
}
