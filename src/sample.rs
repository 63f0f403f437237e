// src/sample.rs

//! Sample decoding and ownership for sampler mode.

use std::io::Cursor;
use std::sync::Arc;

use rodio::source::Source;
use rodio::Decoder;
use tracing::info;

use crate::error::{CadenzaError, Result};

/// What the host learns about a freshly decoded sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleInfo {
    /// Duration in seconds.
    pub duration: f64,
    pub sample_rate: u32,
    /// Channel count of the original material.
    pub channels: u16,
}

/// A decoded sample, owned by the engine from load until clear or the next
/// successful load. Audio data is a mono mix; the original channel count is
/// kept for reporting.
#[derive(Debug, Clone)]
pub struct SampleData {
    pub data: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SampleData {
    /// Duration in seconds at the sample's native rate.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.data.len() as f64 / self.sample_rate as f64
    }

    pub fn info(&self) -> SampleInfo {
        SampleInfo {
            duration: self.duration(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// Decodes an encoded audio byte buffer (wav/flac/ogg/mp3 per the symphonia
/// backend) into mono f32 PCM at its original rate.
pub fn decode_sample(bytes: Vec<u8>) -> Result<Arc<SampleData>> {
    let source =
        Decoder::new(Cursor::new(bytes)).map_err(|e| CadenzaError::Decode(e.to_string()))?;

    let sample_rate = source.sample_rate();
    let channels = source.channels();
    // Decoders commonly yield i16; map and convert to f32.
    let all_samples: Vec<f32> = source.map(|s| s as f32 / i16::MAX as f32).collect();

    if all_samples.is_empty() {
        return Err(CadenzaError::Decode("decoded stream was empty".into()));
    }

    let data = if channels > 1 {
        all_samples
            .chunks_exact(channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        all_samples
    };

    let sample = SampleData {
        data,
        sample_rate,
        channels,
    };
    info!(
        duration_s = sample.duration(),
        sample_rate, channels, "sample decoded"
    );
    Ok(Arc::new(sample))
}
