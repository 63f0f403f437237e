// src/audio_engine/command.rs

//! Messages from the control side to the audio-thread renderer.
//!
//! The driver posts time-ordered setpoints; the renderer drains them at
//! buffer boundaries. Heavy payloads (noise buffers, samples, reverb
//! kernels) are built off the audio thread and travel behind `Arc`s.

use std::sync::Arc;

use crate::audio_engine::convolver::ReverbKernel;
use crate::audio_engine::voice::NoteEvent;

#[derive(Clone)]
pub enum AudioCommand {
    /// Start a note: source, filter, pan and envelope in one unit.
    Note(Box<NoteEvent>),
    /// Delay-time setpoint; `ramp` selects the 50 ms glide.
    DelayTime { seconds: f32, ramp: bool },
    DelayFeedback(f32),
    DelayMix(f32),
    ReverbMix(f32),
    /// Swap the reverb impulse for a freshly synthesized one.
    ReverbKernel(Arc<ReverbKernel>),
}

impl std::fmt::Debug for AudioCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioCommand::Note(_) => write!(f, "Note"),
            AudioCommand::DelayTime { seconds, ramp } => {
                write!(f, "DelayTime({} s, ramp: {})", seconds, ramp)
            }
            AudioCommand::DelayFeedback(v) => write!(f, "DelayFeedback({})", v),
            AudioCommand::DelayMix(v) => write!(f, "DelayMix({})", v),
            AudioCommand::ReverbMix(v) => write!(f, "ReverbMix({})", v),
            AudioCommand::ReverbKernel(k) => {
                write!(f, "ReverbKernel({} s)", k.decay_seconds())
            }
        }
    }
}
