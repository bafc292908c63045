//! Engine configuration, supplied once per session.

use super::analysis::{analysis_constants::*, PowerUnits};
use super::channel::{MeasurementMode, WindowKind};
use crate::error::{EngineError, Result};

/// Session configuration consumed by the spectral engine.
///
/// Owned and parsed elsewhere (see `cli::Args`); the engine only reads it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Audio sample rate (Hz), fixed for the session
    pub sample_rate_hz: u32,

    /// Number of interleaved input channels
    pub channels: usize,

    /// Frames delivered per input period (advisory, used for buffer sizing checks)
    pub period_frames: usize,

    /// Largest FFT size exponent to build plans for (13..=25)
    pub max_fft_exponent: u32,

    /// Largest roll factor (1..=256)
    pub max_roll: u32,

    /// Parallel transform workers (1..=4)
    pub jobs: usize,

    /// Display columns the spectrum is reduced to
    pub display_columns: usize,

    /// Initial lower edge of the plot (Hz)
    pub start_hz: i64,

    /// Initial upper edge of the plot (Hz)
    pub stop_hz: i64,

    /// Smallest span the user may select (Hz)
    pub min_span_hz: i64,

    /// Default phosphor depth (0 = off, up to 16)
    pub phosphor: u32,

    /// Memory slots available for explicit "memory add" (0..=15)
    pub memory_slots: usize,

    /// Window applied to every channel after a cold reset
    pub default_window: WindowKind,

    /// Measurement mode applied to every channel after a cold reset
    pub default_measurement: MeasurementMode,

    /// Initial video bandwidth exponent (-1 = max hold, 0 = full, n = 1/2^n)
    pub vbw_exponent: i32,

    /// Show exactly-zero bins as -327.67 dB instead of "no data"
    pub show_zero: bool,

    /// Initial Y scale units
    pub power_units: PowerUnits,

    /// Bounded buffer size multiplier over the largest transform
    pub buffer_factor: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 48_000,
            channels: 1,
            period_frames: 1024,
            max_fft_exponent: DEFAULT_FFT_EXPONENT,
            max_roll: 16,
            jobs: 1,
            display_columns: 500, // 10 grids of 50 px
            start_hz: 0,
            stop_hz: 20_000,
            min_span_hz: 10,
            phosphor: 0,
            memory_slots: MAX_GENERATIONS - 1,
            default_window: WindowKind::Hft144d,
            default_measurement: MeasurementMode::Peak,
            vbw_exponent: 0,
            show_zero: false,
            power_units: PowerUnits::Volts,
            buffer_factor: 2,
        }
    }
}

impl EngineConfig {
    /// Validate configuration (bounds, non-zero rates, etc.)
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if self.sample_rate_hz == 0 {
            return invalid("sample rate must be > 0".to_string());
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return invalid(format!(
                "channels must be 1..={}, got {}",
                MAX_CHANNELS, self.channels
            ));
        }
        if !(MIN_FFT_EXPONENT..=MAX_FFT_EXPONENT).contains(&self.max_fft_exponent) {
            return Err(EngineError::FftExponentOutOfRange {
                exponent: self.max_fft_exponent,
                min: MIN_FFT_EXPONENT,
                max: MAX_FFT_EXPONENT,
            });
        }
        if self.max_roll == 0 || self.max_roll > MAX_ROLL_LIMIT {
            return invalid(format!(
                "max roll must be 1..={}, got {}",
                MAX_ROLL_LIMIT, self.max_roll
            ));
        }
        if self.jobs == 0 || self.jobs > MAX_JOBS {
            return invalid(format!("jobs must be 1..={}, got {}", MAX_JOBS, self.jobs));
        }
        if self.display_columns == 0 || self.display_columns > MAX_COLUMNS {
            return invalid(format!(
                "display columns must be 1..={}, got {}",
                MAX_COLUMNS, self.display_columns
            ));
        }
        if self.stop_hz <= self.start_hz {
            return Err(EngineError::ZeroSpan);
        }
        if self.min_span_hz <= 0 {
            return invalid("minimum span must be > 0 Hz".to_string());
        }
        if self.phosphor > MAX_PHOSPHOR {
            return invalid(format!(
                "phosphor must be 0..={}, got {}",
                MAX_PHOSPHOR, self.phosphor
            ));
        }
        if self.memory_slots >= MAX_GENERATIONS {
            return invalid(format!(
                "memory slots must be 0..={}, got {}",
                MAX_GENERATIONS - 1,
                self.memory_slots
            ));
        }
        if !(VBW_EXPONENT_MIN..=VBW_EXPONENT_MAX).contains(&self.vbw_exponent) {
            return invalid(format!(
                "VBW exponent must be {}..={}, got {}",
                VBW_EXPONENT_MIN, VBW_EXPONENT_MAX, self.vbw_exponent
            ));
        }
        if self.buffer_factor == 0 {
            return invalid("buffer factor must be > 0".to_string());
        }
        Ok(())
    }

    /// Largest FFT size in samples
    pub fn max_fft_size(&self) -> usize {
        1 << self.max_fft_exponent
    }

    /// Bounded buffer capacity (bytes):
    /// max FFT size × channels × sample width × safety factor
    pub fn buffer_bytes(&self) -> usize {
        self.max_fft_size() * self.channels * SAMPLE_BYTES * self.buffer_factor
    }

    /// Bytes delivered by the input collaborator per period
    pub fn period_bytes(&self) -> usize {
        self.period_frames * self.channels * SAMPLE_BYTES
    }

    /// Frequency limits for center and span changes
    pub fn span_limits(&self) -> SpanLimits {
        SpanLimits {
            min_hz: 0,
            max_hz: self.sample_rate_hz as i64 / 2,
            min_span_hz: self.min_span_hz,
            max_span_hz: self.sample_rate_hz as i64,
        }
    }

    /// Initial span (Hz)
    pub fn initial_span_hz(&self) -> i64 {
        self.stop_hz - self.start_hz
    }
}

/// Bounds applied when the user moves the center or changes the span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanLimits {
    /// Lowest center frequency (Hz)
    pub min_hz: i64,

    /// Highest center frequency (Hz, Nyquist)
    pub max_hz: i64,

    /// Narrowest span (Hz)
    pub min_span_hz: i64,

    /// Widest span (Hz, the sample rate)
    pub max_span_hz: i64,
}

impl SpanLimits {
    pub fn clamp_center(&self, hz: i64) -> i64 {
        hz.clamp(self.min_hz, self.max_hz)
    }

    pub fn clamp_span(&self, hz: i64) -> i64 {
        hz.clamp(self.min_span_hz, self.max_span_hz)
    }
}
