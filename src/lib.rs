// src/lib.rs

//! cadenza: a real-time data sonification engine.
//!
//! Feed it an array of JSON-shaped records and it plays them: numeric
//! fields are discovered, ranked by how interesting their distributions
//! are, mapped onto synthesis parameters (pitch, spacing, filter, pan,
//! delay, reverb, envelope) and rendered as a continuous stream of notes
//! through a persistent effects chain. A synthesizer mode builds
//! oscillator/noise/FM sources per note; a sampler mode plays slices of a
//! loaded sample instead.
//!
//! ```no_run
//! use cadenza::{Sonifier, Waveform};
//!
//! let mut engine = Sonifier::new();
//! engine.set_records(vec![
//!     serde_json::json!({"properties": {"mag": 4.5}}),
//!     serde_json::json!({"properties": {"mag": 3.2}}),
//! ]);
//! engine.set_waveform(Waveform::Fm);
//! engine.play().unwrap();
//! ```

pub mod analysis;
pub mod audio_engine;
mod audio_io;
mod driver;
pub mod error;
pub mod evaluate;
pub mod mapping;
pub mod observer;
pub mod quantize;
pub mod record;
pub mod sample;
pub mod settings;
mod sonifier;

pub use error::{CadenzaError, Result};
pub use evaluate::{evaluate, AudioParams, DataRanges};
pub use mapping::{Curve, Mapping, MappingPatch, MappingSet, ParamId};
pub use observer::{Notice, TickObserver, TickSnapshot};
pub use quantize::PitchScale;
pub use record::{discover, PathDescriptor, Record};
pub use sample::SampleInfo;
pub use settings::{EngineMode, FilterKind, Waveform};
pub use sonifier::{Analyser, Sonifier};
