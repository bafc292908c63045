//! WAV file replay, paced in real time one period at a time.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use super::{InputEvents, InputFormat, SampleSource};
use crate::buffer::SampleWriter;
use crate::error::{EngineError, Result};

/// Replays decoded WAV samples as if they came from a device
pub struct WavSource {
    samples: Arc<Vec<f32>>,
    format: InputFormat,
    period_frames: usize,
    looping: bool,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WavSource {
    /// Decode a whole file; integer formats are scaled to ±1.0
    pub fn open(path: impl AsRef<Path>, period_frames: usize, looping: bool) -> Result<Self> {
        let mut reader = hound::WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        if spec.channels == 0 || period_frames == 0 {
            return Err(EngineError::InvalidConfig(
                "WAV source needs at least one channel and a non-empty period".to_string(),
            ));
        }

        info!(
            "WAV: {} @ {}Hz, {} ch, {} frames",
            path.as_ref().display(),
            spec.sample_rate,
            spec.channels,
            samples.len() / spec.channels as usize
        );

        Ok(Self {
            samples: Arc::new(samples),
            format: InputFormat {
                sample_rate_hz: spec.sample_rate,
                channels: spec.channels as usize,
            },
            period_frames,
            looping,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        })
    }

    /// Length of the decoded file
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / self.format.channels;
        Duration::from_secs_f64(frames as f64 / self.format.sample_rate_hz as f64)
    }
}

impl SampleSource for WavSource {
    fn format(&self) -> InputFormat {
        self.format
    }

    fn start(&mut self, mut writer: SampleWriter, events: InputEvents) -> Result<()> {
        let samples = Arc::clone(&self.samples);
        let stop = Arc::clone(&self.stop);
        let period_len = self.period_frames * self.format.channels;
        let period = Duration::from_secs_f64(
            self.period_frames as f64 / self.format.sample_rate_hz as f64,
        );
        let looping = self.looping;

        let thread = thread::Builder::new()
            .name("wav-source".to_string())
            .spawn(move || {
                let mut deadline = Instant::now();
                loop {
                    for period_samples in samples.chunks(period_len) {
                        if stop.load(Ordering::Relaxed) {
                            return;
                        }
                        writer.write_samples(period_samples);

                        deadline += period;
                        if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                            thread::sleep(wait);
                        }
                    }
                    if !looping || samples.is_empty() {
                        break;
                    }
                    debug!("WAV source looping");
                }
                info!("WAV source finished");
                events.end_of_input();
            })
            .map_err(|e| EngineError::Audio(format!("cannot spawn WAV source thread: {}", e)))?;

        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_file(name: &str, format: hound::SampleFormat, bits: u16) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("specan-{}-{}.wav", name, std::process::id()));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: bits,
            sample_format: format,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..800 {
            match format {
                hound::SampleFormat::Float => {
                    writer.write_sample(0.5f32).unwrap();
                    writer.write_sample(-0.25f32).unwrap();
                }
                hound::SampleFormat::Int => {
                    writer.write_sample(i16::MIN as i32 / 2).unwrap();
                    writer.write_sample(i % 2).unwrap();
                }
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_open_float_file() {
        let path = write_test_file("float", hound::SampleFormat::Float, 32);
        let source = WavSource::open(&path, 100, false).unwrap();
        assert_eq!(
            source.format(),
            InputFormat {
                sample_rate_hz: 8_000,
                channels: 2
            }
        );
        assert_eq!(source.duration(), Duration::from_millis(100));
        assert_eq!(&source.samples[..2], &[0.5, -0.25]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_int_samples_are_scaled() {
        let path = write_test_file("int", hound::SampleFormat::Int, 16);
        let source = WavSource::open(&path, 100, false).unwrap();
        assert_eq!(source.samples[0], -0.5);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(matches!(
            WavSource::open("/nonexistent/specan.wav", 100, false),
            Err(EngineError::Wav(_))
        ));
    }
}
