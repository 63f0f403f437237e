// src/audio_io.rs

//! Output-stream plumbing: builds the cpal stream and moves the renderer
//! into its callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::{HeapConsumer, HeapProducer};
use tracing::{error, info};

use crate::audio_engine::command::AudioCommand;
use crate::audio_engine::AudioEngine;
use crate::error::{CadenzaError, Result};

/// Opens the default output device, constructs the renderer at the device
/// rate and starts the stream. Returns the stream handle (audio stops when
/// it drops) and the active sample rate.
pub(crate) fn start_output_stream(
    commands: HeapConsumer<AudioCommand>,
    tap: HeapProducer<f32>,
) -> Result<(Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(CadenzaError::NoOutputDevice)?;
    let default_config = device
        .default_output_config()
        .map_err(|e| CadenzaError::Stream(e.to_string()))?;

    let sample_format = default_config.sample_format();
    let config: StreamConfig = default_config.into();
    let sample_rate = config.sample_rate.0;
    let engine = AudioEngine::new(sample_rate as f32, commands, tap);

    let stream = match sample_format {
        SampleFormat::F32 => build_output_stream::<f32>(&device, &config, engine)?,
        SampleFormat::I16 => build_output_stream::<i16>(&device, &config, engine)?,
        SampleFormat::U16 => build_output_stream::<u16>(&device, &config, engine)?,
        format => {
            return Err(CadenzaError::Stream(format!(
                "unsupported sample format {}",
                format
            )))
        }
    };
    stream
        .play()
        .map_err(|e| CadenzaError::Stream(e.to_string()))?;

    let device_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(
        device = %device_name,
        sample_rate,
        channels = config.channels,
        "output stream started"
    );
    Ok((stream, sample_rate))
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: AudioEngine,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = |err| error!("output stream error: {}", err);
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                engine.process_buffer(&mut scratch, channels);
                for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(*sample);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| CadenzaError::Stream(e.to_string()))
}
