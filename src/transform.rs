//! Transform plans and the per-channel transform executor.
//!
//! One real-to-complex plan is built per supported size at startup. Each
//! channel owns scratch buffers sized for the largest plan, so channels can
//! run on separate workers without sharing mutable state.

use std::sync::Arc;

use log::trace;
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::buffer::SampleReader;
use crate::error::{EngineError, Result};
use crate::params::analysis_constants::MIN_FFT_EXPONENT;
use crate::window::WindowTable;

/// Shared handle to one precomputed transform
pub type TransformPlan = Arc<dyn RealToComplex<f64>>;

/// One plan per FFT size exponent, indexed by `exponent - MIN_FFT_EXPONENT`
pub struct TransformPlans {
    max_exponent: u32,
    plans: Vec<TransformPlan>,
}

impl TransformPlans {
    /// Build plans for 2^MIN_FFT_EXPONENT..=2^max_exponent (expensive, done once)
    pub fn new(max_exponent: u32) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let plans = (MIN_FFT_EXPONENT..=max_exponent)
            .map(|exponent| planner.plan_fft_forward(1 << exponent))
            .collect();

        Self {
            max_exponent,
            plans,
        }
    }

    /// Plan for a transform of 2^exponent samples
    pub fn plan(&self, exponent: u32) -> Result<&TransformPlan> {
        if exponent < MIN_FFT_EXPONENT || exponent > self.max_exponent {
            return Err(EngineError::UnsupportedPlan {
                exponent,
                min: MIN_FFT_EXPONENT,
                max: self.max_exponent,
            });
        }
        Ok(&self.plans[(exponent - MIN_FFT_EXPONENT) as usize])
    }

    pub fn max_exponent(&self) -> u32 {
        self.max_exponent
    }

    /// Scratch length large enough for every plan
    pub fn max_scratch_len(&self) -> usize {
        self.plans
            .iter()
            .map(|p| p.get_scratch_len())
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Processing-side store of the most recent interleaved samples.
///
/// Chunks read from the bounded buffer are appended here; a transform always
/// reads the newest `fft_size` frames, so consecutive transforms overlap when
/// the roll factor is above one.
pub struct SampleHistory {
    samples: Vec<f32>,
    channels: usize,
    write_pos: usize,
}

impl SampleHistory {
    pub fn new(frames: usize, channels: usize) -> Self {
        Self {
            samples: vec![0.0; frames * channels],
            channels,
            write_pos: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Append up to `frames` frames from the reader; returns frames appended
    pub fn fill_from(&mut self, reader: &mut SampleReader, frames: usize) -> usize {
        self.fill_with(frames, |dest| reader.read_samples(dest))
    }

    /// Append interleaved samples directly (whole frames only)
    pub fn push(&mut self, interleaved: &[f32]) -> usize {
        let mut offset = 0;
        self.fill_with(interleaved.len() / self.channels, |dest| {
            let n = dest.len().min(interleaved.len() - offset);
            dest[..n].copy_from_slice(&interleaved[offset..offset + n]);
            offset += n;
            n
        })
    }

    fn fill_with(&mut self, frames: usize, mut source: impl FnMut(&mut [f32]) -> usize) -> usize {
        let len = self.samples.len();
        let mut remaining = frames * self.channels;
        let mut total = 0;

        while remaining > 0 {
            let end = len.min(self.write_pos + remaining);
            let n = source(&mut self.samples[self.write_pos..end]);
            if n == 0 {
                break;
            }
            self.write_pos = (self.write_pos + n) % len;
            remaining -= n;
            total += n;
        }

        total / self.channels
    }

    /// The newest `frames` samples of one channel, oldest first
    pub fn channel(&self, channel: usize, frames: usize) -> impl Iterator<Item = f32> + '_ {
        let len = self.samples.len();
        let channels = self.channels;
        let start = (self.write_pos + len - (frames * channels) % len) % len;
        (0..frames).map(move |i| self.samples[(start + i * channels + channel) % len])
    }

    pub fn clear(&mut self) {
        self.samples.fill(0.0);
        self.write_pos = 0;
    }
}

/// Raw-sample extremes seen by one channel during one cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AmplitudeStats {
    pub min: f64,
    pub max: f64,

    /// Smallest non-zero magnitude, if any sample was non-zero
    pub min_abs_nonzero: Option<f64>,
}

impl AmplitudeStats {
    /// Fold one sample into the running extremes
    pub fn track(&mut self, sample: f64) {
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        if sample != 0.0 {
            let magnitude = sample.abs();
            self.min_abs_nonzero = Some(match self.min_abs_nonzero {
                Some(m) => m.min(magnitude),
                None => magnitude,
            });
        }
    }

    /// Advisory classification for the renderer
    pub fn flags(&self) -> AmplitudeFlags {
        AmplitudeFlags {
            overload: self.min < -1.0 || self.max > 1.0,
            // Exact unity is rare; it shows samples were not rescaled on the way
            at_max: self.min == -1.0 || self.max == 1.0,
            zero: self.min == 0.0 && self.max == 0.0,
        }
    }

    /// Bits of resolution implied by the smallest non-zero sample
    /// (the sign bit counts, hence the -1)
    pub fn resolution_bits(&self) -> Option<f64> {
        self.min_abs_nonzero.map(|m| m.log2() - 1.0)
    }
}

/// Advisory amplitude state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmplitudeFlags {
    /// A sample exceeded unit amplitude
    pub overload: bool,

    /// An extreme touched unit amplitude exactly
    pub at_max: bool,

    /// Every sample of the cycle was exactly zero
    pub zero: bool,
}

/// Scratch buffers and last spectrum of one channel
pub struct ChannelTransform {
    input: Vec<f64>,
    output: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    bins: usize,
    stats: AmplitudeStats,
}

impl ChannelTransform {
    /// Allocate buffers for transforms up to `max_size` samples
    pub fn new(max_size: usize, scratch_len: usize) -> Self {
        Self {
            input: vec![0.0; max_size],
            output: vec![Complex::new(0.0, 0.0); max_size / 2 + 1],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            bins: 0,
            stats: AmplitudeStats::default(),
        }
    }

    /// Deinterleave, window and (optionally) transform the newest
    /// `plan.len()` frames of `channel`.
    ///
    /// Amplitude extremes are tracked even when `execute` is false, so a
    /// stopped analyzer still reports overload and silence.
    pub fn run(
        &mut self,
        history: &SampleHistory,
        channel: usize,
        plan: &TransformPlan,
        window: &WindowTable,
        execute: bool,
    ) -> Result<AmplitudeStats> {
        let size = plan.len();
        let mut stats = AmplitudeStats::default();

        let input = &mut self.input[..size];
        for (slot, sample) in input.iter_mut().zip(history.channel(channel, size)) {
            let sample = sample as f64;
            stats.track(sample);
            *slot = sample;
        }
        window.apply(input);
        self.stats = stats;

        if execute {
            trace!("ch {}: transform of {} samples", channel, size);
            let bins = size / 2 + 1;
            let scratch_len = plan.get_scratch_len();
            plan.process_with_scratch(
                input,
                &mut self.output[..bins],
                &mut self.scratch[..scratch_len],
            )
            .map_err(|e| EngineError::Transform(e.to_string()))?;
            self.bins = bins;
        }

        Ok(stats)
    }

    /// The `N/2 + 1` complex bins of the last executed transform
    pub fn spectrum(&self) -> &[Complex<f64>] {
        &self.output[..self.bins]
    }

    pub fn stats(&self) -> AmplitudeStats {
        self.stats
    }
}
