//! CPAL audio backend
//!
//! Opens the platform's default output device and drives the engine's
//! pull callback from the device stream. The engine mixes interleaved
//! stereo; when the device wants a different channel count, the callback
//! mixes into a staging buffer and fans the stereo pair out, zeroing any
//! extra channels.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use crate::engine::EngineCore;
use crate::error::{EngineError, EngineResult};
use crate::types::Sample;

/// Keeps the output stream alive; drop to stop audio.
pub(crate) struct CpalBackend {
    _stream: Stream,
    channels: u32,
}

impl CpalBackend {
    pub fn channels(&self) -> u32 {
        self.channels
    }
}

pub(crate) fn init(
    core: Arc<EngineCore>,
    flags: u32,
    sample_rate: u32,
    buffer_size: u32,
) -> EngineResult<CpalBackend> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        log::error!("no default audio output device");
        EngineError::Unknown
    })?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    log::info!("using audio device: {}", device_name);

    let supported = pick_output_config(&device, sample_rate)?;
    let channels = supported.channels() as usize;
    let actual_rate = supported.sample_rate().0;
    if actual_rate != sample_rate {
        log::warn!(
            "device does not support {} Hz, using {} Hz",
            sample_rate,
            actual_rate
        );
    }

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(buffer_size),
    };

    // Post-init before the stream exists; the first callback must see a
    // fully initialized engine.
    core.postinit(actual_rate, buffer_size, flags);

    let stream = match build_output_stream(&device, &stream_config, Arc::clone(&core), buffer_size)
    {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!(
                "fixed buffer size {} rejected ({}), retrying with the device default",
                buffer_size,
                e
            );
            let mut fallback = stream_config.clone();
            fallback.buffer_size = cpal::BufferSize::Default;
            build_output_stream(&device, &fallback, Arc::clone(&core), buffer_size).map_err(
                |e| {
                    log::error!("failed to build output stream: {}", e);
                    EngineError::Unknown
                },
            )?
        }
    };

    stream.play().map_err(|e| {
        log::error!("failed to start output stream: {}", e);
        EngineError::Unknown
    })?;

    log::info!(
        "audio stream started: {} Hz, {} frames, {} channels",
        actual_rate,
        buffer_size,
        channels
    );

    Ok(CpalBackend {
        _stream: stream,
        channels: channels as u32,
    })
}

/// Best f32 output configuration: stereo-capable and covering the
/// requested rate if possible, otherwise the closest the device offers.
fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> EngineResult<cpal::SupportedStreamConfig> {
    let configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| {
            log::error!("failed to query output configs: {}", e);
            EngineError::Unknown
        })?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    let best = configs
        .iter()
        .filter(|c| c.channels() >= 2)
        .find(|c| target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0)
        .or_else(|| configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| configs.first())
        .ok_or_else(|| {
            log::error!("device offers no f32 output configuration");
            EngineError::Unknown
        })?;

    let rate = if target_rate >= best.min_sample_rate().0 && target_rate <= best.max_sample_rate().0
    {
        cpal::SampleRate(target_rate)
    } else {
        best.max_sample_rate()
    };

    Ok(best.clone().with_sample_rate(rate))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    core: Arc<EngineCore>,
    buffer_size: u32,
) -> Result<Stream, cpal::BuildStreamError> {
    let channels = config.channels as usize;
    // Staging for non-stereo devices, sized once here so the callback
    // only regrows it if the device delivers more than negotiated.
    let mut staging: Vec<Sample> = vec![0.0; buffer_size as usize * 2];

    device.build_output_stream(
        config,
        move |data: &mut [Sample], _info: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            if channels == 2 {
                core.mix(data, frames);
                return;
            }

            if staging.len() < frames * 2 {
                staging.resize(frames * 2, 0.0);
            }
            core.mix(&mut staging[..frames * 2], frames);
            for (frame, pair) in data.chunks_mut(channels).zip(staging.chunks(2)) {
                frame[0] = pair[0];
                if channels > 1 {
                    frame[1] = pair[1];
                }
                for extra in frame.iter_mut().skip(2) {
                    *extra = 0.0;
                }
            }
        },
        move |err| {
            log::error!("audio stream error: {}", err);
        },
        None,
    )
}
