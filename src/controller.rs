//! Adaptive parameter controller.
//!
//! Derives FFT size, resolution bandwidth, roll factor and point stepping from
//! the display span, sample rate and frame-rate targets. Re-run whenever any
//! of those inputs change.

use log::debug;

use crate::error::{EngineError, Result};
use crate::params::analysis_constants::*;

/// Inputs to one parameter derivation
#[derive(Debug, Clone, Copy)]
pub struct DeriveRequest {
    /// Sample rate (Hz)
    pub sample_rate_hz: u32,

    /// Display columns
    pub columns: usize,

    /// Lower edge of the plot (Hz)
    pub start_hz: i64,

    /// Width of the plot (Hz), must be non-zero
    pub span_hz: i64,

    /// Requested RBW exponent, clamped into the derived envelope
    pub rbw_exponent: i32,

    /// Upper bound for the FFT size exponent
    pub max_fft_exponent: u32,

    /// Upper bound for the roll factor
    pub max_roll: u32,

    /// Current relative point step, kept when still valid
    pub step_relative: f32,

    /// While stopped the FFT size is frozen at `previous_exponent`
    pub stopped: bool,

    /// Exponent in use before this derivation, if any
    pub previous_exponent: Option<u32>,
}

/// Derived analysis parameters, published with every frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralParameters {
    /// FFT size exponent, within MIN_FFT_EXPONENT..=max
    pub fft_exponent: u32,

    /// FFT size (samples)
    pub fft_size: usize,

    /// RBW exponent and its envelope
    pub rbw_exponent: i32,
    pub rbw_exponent_min: i32,
    pub rbw_exponent_max: i32,

    /// Resolution factor, 2^rbw_exponent
    pub resolution_bandwidth: f32,

    /// Samples per channel per transform window (seconds)
    pub fft_plot_time_s: f32,

    /// Transforms per second without overlap
    pub ffts_per_second: f32,

    /// Displayed frames per second after rolling
    pub frames_per_second: f32,

    /// Transforms are computed every fft_size / roll samples
    pub roll_factor: u32,

    /// Frames per chunk (fft_size / roll_factor)
    pub chunk_frames: usize,

    /// Display columns per FFT bin
    pub step_absolute: f32,

    /// Display columns between plotted points in squeeze mode
    pub step_relative: f32,

    /// FFT bins covering the span
    pub plot_samples: usize,

    /// More bins than columns: bins collapse into points
    pub squeeze: bool,

    /// First FFT bin of the span
    pub first_sample_offset: i64,

    /// Distance between the first bin and the span start (Hz)
    pub delta_hz: f32,

    /// Display shift of the first point (columns)
    pub x_shift: i32,

    /// Derivation chose a different FFT size than before
    pub size_changed: bool,
}

impl SpectralParameters {
    /// Derive parameters; a zero span is a configuration error
    pub fn derive(req: &DeriveRequest) -> Result<Self> {
        if req.span_hz <= 0 {
            return Err(EngineError::ZeroSpan);
        }
        if req.max_fft_exponent < MIN_FFT_EXPONENT || req.max_fft_exponent > MAX_FFT_EXPONENT {
            return Err(EngineError::FftExponentOutOfRange {
                exponent: req.max_fft_exponent,
                min: MIN_FFT_EXPONENT,
                max: MAX_FFT_EXPONENT,
            });
        }

        let sample_rate = req.sample_rate_hz as f32;
        let columns = req.columns as f32;
        let span = req.span_hz as f32;

        let rbw_exponent_min =
            ((span / (columns * 2.0 * MAX_FPS)).log2() as i32).max(RBW_EXPONENT_FLOOR);
        let rbw_exponent_max = (rbw_exponent_min + RBW_EXPONENT_RANGE).min(RBW_EXPONENT_CEIL);
        let rbw_exponent = req
            .rbw_exponent
            .clamp(rbw_exponent_min, rbw_exponent_max.max(rbw_exponent_min));
        let resolution_bandwidth = 2f32.powi(rbw_exponent);

        debug!(
            "(1) span {} Hz, rbw {}, rbw exponent {} in {}..={}",
            req.span_hz, resolution_bandwidth, rbw_exponent, rbw_exponent_min, rbw_exponent_max
        );

        let fft_exponent = match (req.stopped, req.previous_exponent) {
            (true, Some(previous)) => previous as i64,
            _ => {
                let wanted = (sample_rate as f64 * columns as f64 * 2.0 * resolution_bandwidth as f64
                    / span as f64
                    - 1.0)
                    .log2()
                    .ceil();
                // NaN (tiny ratio) saturates to 0 and is clamped below
                wanted as i64
            }
        };
        let fft_exponent = fft_exponent
            .clamp(MIN_FFT_EXPONENT as i64, req.max_fft_exponent as i64)
            as u32;

        let fft_size = 1usize << fft_exponent;
        let fft_plot_time_s = fft_size as f32 / sample_rate;
        let step_absolute = sample_rate * columns / span / fft_size as f32;

        let ffts_per_second = 1.0 / fft_plot_time_s;
        let mut frames_per_second = ffts_per_second;
        let mut roll_factor = 1u32;
        while frames_per_second < MAX_FPS / 5.0 && roll_factor * 2 <= req.max_roll {
            frames_per_second *= 2.0;
            roll_factor *= 2;
        }
        let chunk_frames = fft_size / roll_factor as usize;

        let mut step_relative = req.step_relative.clamp(MIN_STEP, MAX_STEP);
        while step_relative < MIN_STEP.max(step_absolute) && step_relative < MAX_STEP {
            step_relative *= 2.0;
        }

        let plot_samples = (fft_size as f32 * span / sample_rate) as usize;
        let squeeze = plot_samples >= req.columns;

        let sample_num_f = req.start_hz as f32 * fft_size as f32 / sample_rate;
        let first_sample_offset = sample_num_f as i64;
        let delta_hz = (first_sample_offset as f32 - sample_num_f) / fft_size as f32 * sample_rate;
        let x_shift = (delta_hz * columns / span).ceil() as i32;

        let size_changed = req.previous_exponent != Some(fft_exponent);

        debug!(
            "(2) sample rate {}, span {} Hz, transform size {}",
            req.sample_rate_hz, req.span_hz, fft_size
        );
        debug!(
            "(3) step abs {}, step rel {}, roll {}, chunk {} frames",
            step_absolute, step_relative, roll_factor, chunk_frames
        );
        debug!(
            "(4) first bin {}, delta {} Hz, x shift {}",
            first_sample_offset, delta_hz, x_shift
        );

        Ok(Self {
            fft_exponent,
            fft_size,
            rbw_exponent,
            rbw_exponent_min,
            rbw_exponent_max,
            resolution_bandwidth,
            fft_plot_time_s,
            ffts_per_second,
            frames_per_second,
            roll_factor,
            chunk_frames,
            step_absolute,
            step_relative,
            plot_samples,
            squeeze,
            first_sample_offset,
            delta_hz,
            x_shift,
            size_changed,
        })
    }

    /// FFT bins per display column ratio used to map bins onto points
    pub fn bin_to_point_ratio(&self) -> f64 {
        self.step_absolute as f64 / self.step_relative as f64
    }

    /// Next smaller relative step, wrapping back to MAX_STEP
    pub fn next_step_relative(&self) -> f32 {
        let halved = self.step_relative / 2.0;
        if halved < MIN_STEP.max(self.step_absolute) {
            MAX_STEP
        } else {
            halved
        }
    }

    /// Legend text for the resolution bandwidth (Hz per sample)
    pub fn rbw_label(&self) -> String {
        let hz = 2.0 / self.fft_plot_time_s;
        if self.resolution_bandwidth > 1.0 {
            format!("RBW: {:.4} Hz/S (1/{}x)", hz, self.resolution_bandwidth)
        } else {
            format!("RBW: {:.4} Hz/S ({}x)", hz, 1.0 / self.resolution_bandwidth)
        }
    }
}
