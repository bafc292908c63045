//! Live capture through the default (or a named) cpal input device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};

use super::{InputEvents, InputFormat, SampleSource};
use crate::buffer::SampleWriter;
use crate::error::{EngineError, Result};

/// Samples converted per step when the device does not deliver `f32`
const CONVERT_BLOCK: usize = 4096;

/// Audio capture system feeding the bounded buffer
pub struct CaptureSystem {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,

    /// Input stream (kept alive while capturing)
    stream: Option<cpal::Stream>,
}

impl CaptureSystem {
    /// Open an input device by (partial) name, or the default device
    pub fn open(device_name: Option<&str>, period_frames: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(wanted) => host
                .input_devices()
                .map_err(|e| EngineError::Audio(format!("Failed to list input devices: {}", e)))?
                .find(|d| d.name().map(|n| n.contains(wanted)).unwrap_or(false))
                .ok_or_else(|| EngineError::Audio(format!("No input device matching '{}'", wanted)))?,
            None => host
                .default_input_device()
                .ok_or_else(|| EngineError::Audio("No audio input device found".to_string()))?,
        };

        let supported = device
            .default_input_config()
            .map_err(|e| EngineError::Audio(format!("Failed to get input config: {}", e)))?;
        let sample_format = supported.sample_format();
        let mut config: cpal::StreamConfig = supported.into();
        if period_frames > 0 {
            config.buffer_size = cpal::BufferSize::Fixed(period_frames as u32);
        }

        info!(
            "Audio: {} @ {}Hz, {} ch, {:?}",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
        })
    }

    fn build_stream<T>(&self, mut writer: SampleWriter, events: InputEvents) -> Result<cpal::Stream>
    where
        T: cpal::Sample + cpal::SizedSample + Send + 'static,
        f32: cpal::FromSample<T>,
    {
        let mut converted = vec![0.0f32; convert_block_len(self.config.channels as usize)];
        self.device
            .build_input_stream(
                &self.config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    forward_period(data, &mut converted, &mut writer);
                },
                move |err| {
                    warn!("Audio stream error: {}", err);
                    events.input_lost(err.to_string());
                },
                None,
            )
            .map_err(|e| EngineError::Audio(format!("Failed to build input stream: {}", e)))
    }
}

/// Largest whole-frame block not above CONVERT_BLOCK samples
fn convert_block_len(channels: usize) -> usize {
    let channels = channels.max(1);
    (CONVERT_BLOCK / channels).max(1) * channels
}

/// Convert one callback's samples to `f32` and write them in blocks of
/// `converted.len()` samples, which must hold whole frames
fn forward_period<T>(data: &[T], converted: &mut [f32], writer: &mut SampleWriter)
where
    T: cpal::Sample,
    f32: cpal::FromSample<T>,
{
    for block in data.chunks(converted.len()) {
        let out = &mut converted[..block.len()];
        for (dst, &src) in out.iter_mut().zip(block) {
            *dst = cpal::Sample::from_sample(src);
        }
        writer.write_samples(out);
    }
}

impl SampleSource for CaptureSystem {
    fn format(&self) -> InputFormat {
        InputFormat {
            sample_rate_hz: self.config.sample_rate.0,
            channels: self.config.channels as usize,
        }
    }

    fn start(&mut self, writer: SampleWriter, events: InputEvents) -> Result<()> {
        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(writer, events)?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(writer, events)?,
            cpal::SampleFormat::I32 => self.build_stream::<i32>(writer, events)?,
            cpal::SampleFormat::U16 => self.build_stream::<u16>(writer, events)?,
            other => {
                return Err(EngineError::Audio(format!(
                    "Unsupported sample format {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| EngineError::Audio(format!("Failed to start input stream: {}", e)))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause input stream: {}", e);
            }
        }
    }
}
