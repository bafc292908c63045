//! Spectral engine aggregate.
//!
//! Owns every piece of processing state: transform plans, window tables,
//! per-channel settings and scratch, the sample history, the retention ring
//! and the derived parameters. Only the processing thread touches it; user
//! operations arrive as method calls between cycles.

use std::sync::Arc;

use log::{debug, info, trace};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::buffer::SampleReader;
use crate::controller::{DeriveRequest, SpectralParameters};
use crate::error::{EngineError, Result};
use crate::params::analysis_constants::*;
use crate::params::{EngineConfig, MeasurementMode, PowerUnits, SpanLimits, VideoFilter, WindowKind};
use crate::reducer::{reduce, DbScale, ReduceSettings, UsedPoints};
use crate::retention::{Generation, RetentionBuffer};
use crate::transform::{AmplitudeFlags, AmplitudeStats, ChannelTransform, SampleHistory, TransformPlans};
use crate::window::{WindowBank, WindowTable};

/// Direction of a stepped setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Down,
    Up,
}

impl Direction {
    fn delta(self) -> i32 {
        match self {
            Self::Down => -1,
            Self::Up => 1,
        }
    }
}

/// Target of a per-channel operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelector {
    One(usize),

    /// Apply to channel 0, then copy its settings to every channel
    All,
}

/// Window and measurement mode of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSettings {
    pub window: WindowKind,
    pub measurement: MeasurementMode,
}

impl ChannelSettings {
    /// Next measurement mode; the window advances when the mode wraps
    fn cycled(self) -> Self {
        let measurement = self.measurement.next();
        let window = if measurement == MeasurementMode::default() {
            self.window.next()
        } else {
            self.window
        };
        Self {
            window,
            measurement,
        }
    }
}

/// Per-channel state published with a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReport {
    pub settings: ChannelSettings,
    pub stats: AmplitudeStats,
    pub flags: AmplitudeFlags,

    /// Points written in the newest generation
    pub used: UsedPoints,
}

/// Everything a renderer needs to draw one completed cycle
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    pub params: SpectralParameters,

    /// Valid generations, newest first
    pub generations: Vec<Arc<Generation>>,

    pub channels: Vec<ChannelReport>,

    /// Plot center and span (Hz)
    pub center_hz: i64,
    pub span_hz: i64,

    /// Display columns the span is spread over
    pub columns: usize,

    pub video: VideoFilter,
    pub power_units: PowerUnits,
    pub phosphor: u32,

    /// Chunks of the current transform already consumed (0..roll)
    pub roll_phase: u32,

    /// Bytes dropped by the input side so far
    pub overruns: u64,

    /// The cycle found more than one chunk waiting
    pub low_cpu: bool,

    pub stopped: bool,
}

impl SpectrumFrame {
    /// Loudest point of `channel` in the newest generation
    pub fn peak(&self, channel: usize) -> Option<(usize, i16)> {
        let newest = self.generations.first()?;
        newest
            .channel(channel)
            .enumerate()
            .filter_map(|(point, level)| level.map(|db| (point, db)))
            .max_by_key(|&(_, db)| db)
    }

    /// Frequency of a point (Hz)
    pub fn point_hz(&self, point: usize) -> f64 {
        let step = if self.params.squeeze {
            self.params.step_relative
        } else {
            self.params.step_absolute
        };
        let column = point as f64 * step as f64 + self.params.x_shift as f64;
        let start = (self.center_hz - self.span_hz / 2) as f64;
        start + column * self.span_hz as f64 / self.columns as f64
    }
}

/// Result of one processing cycle
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// Chunks consumed from the input buffer
    pub chunks: usize,

    /// The history did not yet hold a full transform of real input, so
    /// the cycle must not be drawn
    pub discard: bool,

    pub frame: Option<Arc<SpectrumFrame>>,
}

/// The real-time spectral analysis engine
pub struct SpectralEngine {
    config: EngineConfig,
    limits: SpanLimits,
    plans: TransformPlans,
    windows: WindowBank,
    pool: ThreadPool,

    settings: Vec<ChannelSettings>,
    transforms: Vec<ChannelTransform>,
    stats: Vec<AmplitudeStats>,
    used: Vec<UsedPoints>,
    history: SampleHistory,

    /// Real frames in the history, saturating at its length
    filled_frames: usize,
    retention: RetentionBuffer,

    params: SpectralParameters,
    center_hz: i64,
    span_hz: i64,
    rbw_exponent: i32,
    vbw_exponent: i32,
    step_relative: f32,
    phosphor: u32,
    power_units: PowerUnits,
    memory_add_scheduled: bool,
    stopped: bool,
    vbw_continue: bool,
    roll_phase: u32,
}

impl SpectralEngine {
    /// Validate `config` and build every plan and window table (expensive)
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let plans = TransformPlans::new(config.max_fft_exponent);
        let windows = WindowBank::new(config.max_fft_exponent);
        info!(
            "Built {} transform plans and {} window tables (2^{}..=2^{})",
            plans.len(),
            windows.len(),
            MIN_FFT_EXPONENT,
            config.max_fft_exponent
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs)
            .thread_name(|i| format!("spectral-transform-{}", i))
            .build()
            .map_err(|e| EngineError::Transform(format!("cannot build transform pool: {}", e)))?;

        let max_size = config.max_fft_size();
        let scratch_len = plans.max_scratch_len();
        let channels = config.channels;
        let points = config.display_columns * (MAX_STEP / MIN_STEP) as usize + 2;

        let defaults = ChannelSettings {
            window: config.default_window,
            measurement: config.default_measurement,
        };
        let center_hz = (config.start_hz + config.stop_hz) / 2;
        let span_hz = config.initial_span_hz();
        let params = SpectralParameters::derive(&DeriveRequest {
            sample_rate_hz: config.sample_rate_hz,
            columns: config.display_columns,
            start_hz: center_hz - span_hz / 2,
            span_hz,
            rbw_exponent: 0,
            max_fft_exponent: config.max_fft_exponent,
            max_roll: config.max_roll,
            step_relative: MAX_STEP,
            stopped: false,
            previous_exponent: None,
        })?;

        Ok(Self {
            limits: config.span_limits(),
            settings: vec![defaults; channels],
            transforms: (0..channels)
                .map(|_| ChannelTransform::new(max_size, scratch_len))
                .collect(),
            stats: vec![AmplitudeStats::default(); channels],
            used: vec![UsedPoints::default(); channels],
            history: SampleHistory::new(max_size, channels),
            filled_frames: 0,
            retention: RetentionBuffer::new(points, channels),
            center_hz,
            span_hz,
            rbw_exponent: params.rbw_exponent,
            vbw_exponent: config.vbw_exponent,
            step_relative: params.step_relative,
            phosphor: config.phosphor,
            power_units: config.power_units,
            memory_add_scheduled: false,
            stopped: false,
            vbw_continue: false,
            roll_phase: 0,
            params,
            plans,
            windows,
            pool,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn params(&self) -> &SpectralParameters {
        &self.params
    }

    pub fn center_hz(&self) -> i64 {
        self.center_hz
    }

    pub fn span_hz(&self) -> i64 {
        self.span_hz
    }

    pub fn phosphor(&self) -> u32 {
        self.phosphor
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn power_units(&self) -> PowerUnits {
        self.power_units
    }

    pub fn video_filter(&self) -> VideoFilter {
        VideoFilter::from_exponent(self.vbw_exponent)
    }

    /// The history does not yet hold a full transform of real input, so
    /// the next cycle would be dropped instead of drawn
    pub fn discard_pending(&self) -> bool {
        self.filled_frames < self.params.fft_size
    }

    pub fn valid_generations(&self) -> usize {
        self.retention.valid()
    }

    pub fn channel_settings(&self, channel: usize) -> Result<ChannelSettings> {
        self.check_channel(channel)?;
        Ok(self.settings[channel])
    }

    /// Bytes of one chunk (fft_size / roll frames, all channels)
    pub fn chunk_bytes(&self) -> usize {
        self.params.chunk_frames * self.config.channels * SAMPLE_BYTES
    }

    fn check_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.config.channels {
            return Err(EngineError::ChannelOutOfRange {
                channel,
                channels: self.config.channels,
            });
        }
        Ok(())
    }

    /// Re-derive parameters; a new FFT size (or `force_clear`) invalidates
    /// retained generations and restarts the roll
    fn recompute(&mut self, force_clear: bool) -> Result<()> {
        let params = SpectralParameters::derive(&DeriveRequest {
            sample_rate_hz: self.config.sample_rate_hz,
            columns: self.config.display_columns,
            start_hz: self.center_hz - self.span_hz / 2,
            span_hz: self.span_hz,
            rbw_exponent: self.rbw_exponent,
            max_fft_exponent: self.config.max_fft_exponent,
            max_roll: self.config.max_roll,
            step_relative: self.step_relative,
            stopped: self.stopped,
            previous_exponent: Some(self.params.fft_exponent),
        })?;

        self.rbw_exponent = params.rbw_exponent;
        self.step_relative = params.step_relative;
        if params.size_changed || force_clear {
            debug!(
                "Clearing retention (size changed: {}, forced: {})",
                params.size_changed, force_clear
            );
            self.roll_phase = 0;
            self.clear_screen();
        }
        self.params = params;
        Ok(())
    }

    /// Forget every retained generation and the video-filter history
    fn clear_screen(&mut self) {
        self.retention.reset();
        self.vbw_continue = false;
    }

    /// Move the plot center, keeping the span
    pub fn set_center(&mut self, hz: i64) -> Result<()> {
        self.center_hz = self.limits.clamp_center(hz);
        info!("Center: {} Hz", self.center_hz);
        self.recompute(true)
    }

    /// Change the span around the current center; 0 Hz is rejected
    pub fn set_span(&mut self, hz: i64) -> Result<()> {
        if hz == 0 {
            return Err(EngineError::ZeroSpan);
        }
        self.span_hz = self.limits.clamp_span(hz);
        info!("Span: {} Hz", self.span_hz);
        self.recompute(true)
    }

    /// Move the RBW exponent by one step within its envelope
    pub fn step_rbw(&mut self, direction: Direction) -> Result<()> {
        self.rbw_exponent = (self.rbw_exponent + direction.delta())
            .clamp(self.params.rbw_exponent_min, self.params.rbw_exponent_max);
        self.recompute(false)?;
        info!("{}", self.params.rbw_label());
        Ok(())
    }

    /// Move the VBW exponent by one step (-1 = max hold)
    pub fn step_vbw(&mut self, direction: Direction) {
        self.vbw_exponent =
            (self.vbw_exponent + direction.delta()).clamp(VBW_EXPONENT_MIN, VBW_EXPONENT_MAX);
        self.vbw_continue = false;
        info!("{}", self.video_filter().label());
    }

    /// Schedule an explicit generation advance; returns false when ignored
    pub fn memory_add(&mut self) -> bool {
        if self.memory_add_scheduled || self.config.memory_slots == 0 {
            return false;
        }
        if self.phosphor > 0 {
            self.retention.reset();
        }
        self.phosphor = 0;
        self.memory_add_scheduled = true;
        info!("Memory add: {}", self.retention.valid());
        true
    }

    /// Phosphor depth cycle: off, 1, 2, 4, 8, 16, off
    pub fn cycle_phosphor(&mut self) -> u32 {
        let next = match self.phosphor {
            0 => 1,
            depth if depth * 2 > MAX_PHOSPHOR => 0,
            depth => depth * 2,
        };
        self.set_phosphor(next);
        self.phosphor
    }

    pub fn set_phosphor(&mut self, depth: u32) {
        self.phosphor = depth.min(MAX_PHOSPHOR);
        if self.phosphor == 0 {
            self.retention.reset();
        }
        info!("Phosphor: {}", self.phosphor);
    }

    /// Stop or resume transforms; returns the new stopped state
    pub fn toggle_stop(&mut self) -> bool {
        self.stopped = !self.stopped;
        if self.stopped {
            self.phosphor = 0;
            self.retention.reset();
        }
        info!("{}", if self.stopped { "Stopped" } else { "Sweep Normal" });
        self.stopped
    }

    /// Halve the relative point step, wrapping back to MAX_STEP
    pub fn cycle_step_relative(&mut self) -> f32 {
        let next = self.params.next_step_relative();
        if next != self.step_relative {
            self.step_relative = next;
            self.params.step_relative = next;
            self.clear_screen();
        }
        info!("stepRel: {} points", self.step_relative);
        self.step_relative
    }

    /// Cycle the measurement mode of a channel (or of all channels)
    pub fn cycle_channel_mode(&mut self, selector: ChannelSelector) -> Result<ChannelSettings> {
        let reference = match selector {
            ChannelSelector::One(channel) => channel,
            ChannelSelector::All => 0,
        };
        self.check_channel(reference)?;

        let cycled = self.settings[reference].cycled();
        self.settings[reference] = cycled;
        if selector == ChannelSelector::All {
            self.settings.fill(cycled);
        }
        info!(
            "Ch. {:?}: {}, {}",
            selector,
            cycled.measurement.label(),
            cycled.window.label()
        );
        Ok(cycled)
    }

    pub fn set_window(&mut self, channel: usize, window: WindowKind) -> Result<()> {
        self.check_channel(channel)?;
        self.settings[channel].window = window;
        Ok(())
    }

    pub fn set_measurement(&mut self, channel: usize, mode: MeasurementMode) -> Result<()> {
        self.check_channel(channel)?;
        self.settings[channel].measurement = mode;
        Ok(())
    }

    /// Switch between dBV and dB power scaling
    pub fn toggle_power_units(&mut self) -> PowerUnits {
        self.power_units = self.power_units.toggled();
        self.clear_screen();
        self.power_units
    }

    /// Warm reset clears trackers and retention; cold reset also restores
    /// the configured span, windows, modes, VBW and phosphor
    pub fn reset(&mut self, cold: bool) -> Result<()> {
        if cold {
            self.center_hz = (self.config.start_hz + self.config.stop_hz) / 2;
            self.span_hz = self.config.initial_span_hz();
            self.step_relative = MAX_STEP;
            self.settings.fill(ChannelSettings {
                window: self.config.default_window,
                measurement: self.config.default_measurement,
            });
            self.vbw_exponent = 0;
            self.phosphor = self.config.phosphor;
        }
        self.stats.fill(AmplitudeStats::default());
        self.memory_add_scheduled = false;
        info!("Instrument reset ({})", if cold { "cold" } else { "warm" });
        self.set_span(self.span_hz)
    }

    /// Drain every whole chunk waiting in `reader` and run one cycle on
    /// the newest `fft_size` frames
    pub fn process_available(&mut self, reader: &mut SampleReader) -> Result<CycleOutcome> {
        let chunk_bytes = self.chunk_bytes();
        let chunks = reader.available_bytes() / chunk_bytes;
        if chunks == 0 {
            return Ok(CycleOutcome::default());
        }

        let frames = chunks * self.params.chunk_frames;
        let read = self.history.fill_from(reader, frames);
        self.filled_frames = (self.filled_frames + read).min(self.history.frames());
        trace!("Read {} of {} frames ({} chunks)", read, frames, chunks);

        let mut outcome = self.run_cycle(chunks, reader.overruns())?;
        outcome.chunks = chunks;
        Ok(outcome)
    }

    /// One cycle over samples already in the history
    fn run_cycle(&mut self, chunks: usize, overruns: u64) -> Result<CycleOutcome> {
        self.roll_phase = ((self.roll_phase as usize + chunks) % self.params.roll_factor as usize) as u32;

        if self.discard_pending() {
            debug!(
                "Discarding cycle: {} of {} frames of real input",
                self.filled_frames, self.params.fft_size
            );
            return Ok(CycleOutcome {
                discard: true,
                ..Default::default()
            });
        }

        let phosphor_active = self.phosphor > 0 && self.phosphor < MAX_PHOSPHOR;
        if self.memory_add_scheduled {
            // Nothing is reduced while stopped, so the frozen trace is carried over
            if self.stopped {
                self.retention.advance_copy();
            } else {
                self.retention.advance();
            }
            self.retention.grow(self.config.memory_slots + 1);
            self.memory_add_scheduled = false;
        } else if phosphor_active && !self.stopped {
            self.retention.advance();
        }

        self.stats = self.run_transforms()?;

        if !self.stopped {
            self.reduce_all()?;
            self.retention.commit();
            if phosphor_active {
                self.retention.grow(self.phosphor as usize + 1);
            }
            self.vbw_continue = true;
        }

        Ok(CycleOutcome {
            frame: Some(Arc::new(self.frame(chunks > 1, overruns))),
            ..Default::default()
        })
    }

    /// Transform every channel on the worker pool
    fn run_transforms(&mut self) -> Result<Vec<AmplitudeStats>> {
        let exponent = self.params.fft_exponent;
        let plan = self.plans.plan(exponent)?;
        let tables = self
            .settings
            .iter()
            .map(|s| self.windows.table(exponent, s.window))
            .collect::<Result<Vec<&WindowTable>>>()?;
        let history = &self.history;
        let execute = !self.stopped;
        let transforms = &mut self.transforms;

        self.pool.install(|| {
            transforms
                .par_iter_mut()
                .zip(tables.par_iter())
                .enumerate()
                .map(|(ch, (transform, table))| transform.run(history, ch, plan, table, execute))
                .collect()
        })
    }

    /// Reduce every channel's spectrum into the current generation
    fn reduce_all(&mut self) -> Result<()> {
        let previous = self.retention.previous();
        let video = self.video_filter();

        for ch in 0..self.config.channels {
            let settings = self.settings[ch];
            let table = self.windows.table(self.params.fft_exponent, settings.window)?;
            let reduce_settings = ReduceSettings {
                squeeze: self.params.squeeze,
                plot_samples: self.params.plot_samples,
                first_sample_offset: self.params.first_sample_offset,
                bin_to_point_ratio: self.params.bin_to_point_ratio(),
                scale: DbScale::new(
                    self.params.fft_size,
                    self.power_units,
                    settings.measurement,
                    table.noise_gain_bins(),
                ),
                mode: settings.measurement,
                video,
                continue_filter: self.vbw_continue,
                show_zero: self.config.show_zero,
            };
            self.used[ch] = reduce(
                self.transforms[ch].spectrum(),
                ch,
                &reduce_settings,
                self.retention.current_mut(),
                previous.as_deref(),
            );
        }
        Ok(())
    }

    fn frame(&self, low_cpu: bool, overruns: u64) -> SpectrumFrame {
        let channels = self
            .settings
            .iter()
            .zip(&self.stats)
            .zip(&self.used)
            .map(|((&settings, &stats), &used)| ChannelReport {
                settings,
                stats,
                flags: stats.flags(),
                used,
            })
            .collect();

        SpectrumFrame {
            params: self.params,
            generations: self.retention.generations(),
            channels,
            center_hz: self.center_hz,
            span_hz: self.span_hz,
            columns: self.config.display_columns,
            video: self.video_filter(),
            power_units: self.power_units,
            phosphor: self.phosphor,
            roll_phase: self.roll_phase,
            overruns,
            low_cpu,
            stopped: self.stopped,
        }
    }
}

impl Drop for SpectralEngine {
    fn drop(&mut self) {
        info!(
            "Released {} transform plans and {} window tables",
            self.plans.len(),
            self.windows.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BoundedBuffer;

    fn small_config() -> EngineConfig {
        EngineConfig {
            max_fft_exponent: MIN_FFT_EXPONENT,
            display_columns: 50,
            ..Default::default()
        }
    }

    fn sine(frames: usize, hz: f64, channels: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = (2.0 * std::f64::consts::PI * hz * i as f64 / 48_000.0).sin() * 0.5;
                std::iter::repeat(s as f32).take(channels)
            })
            .collect()
    }

    #[test]
    fn test_new_derives_parameters() {
        let engine = SpectralEngine::new(small_config()).unwrap();
        assert_eq!(engine.center_hz(), 10_000);
        assert_eq!(engine.span_hz(), 20_000);
        assert_eq!(engine.params().fft_size, 8192);
        assert_eq!(engine.chunk_bytes(), 4096 * 4);
        assert!(engine.discard_pending());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            jobs: 0,
            ..small_config()
        };
        assert!(matches!(
            SpectralEngine::new(config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_span_rejected() {
        let mut engine = SpectralEngine::new(small_config()).unwrap();
        assert!(matches!(engine.set_span(0), Err(EngineError::ZeroSpan)));
        assert_eq!(engine.span_hz(), 20_000);
    }

    #[test]
    fn test_span_and_center_are_clamped() {
        let mut engine = SpectralEngine::new(small_config()).unwrap();
        engine.set_span(1).unwrap();
        assert_eq!(engine.span_hz(), 10);
        engine.set_center(1_000_000).unwrap();
        assert_eq!(engine.center_hz(), 24_000);
    }

    #[test]
    fn test_phosphor_cycle() {
        let mut engine = SpectralEngine::new(small_config()).unwrap();
        let seen: Vec<u32> = (0..6).map(|_| engine.cycle_phosphor()).collect();
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 0]);
    }

    #[test]
    fn test_memory_add() {
        let mut engine = SpectralEngine::new(small_config()).unwrap();
        engine.set_phosphor(4);
        assert!(engine.memory_add());
        assert_eq!(engine.phosphor(), 0);
        assert!(!engine.memory_add());

        let config = EngineConfig {
            memory_slots: 0,
            ..small_config()
        };
        let mut engine = SpectralEngine::new(config).unwrap();
        assert!(!engine.memory_add());
    }

    #[test]
    fn test_stop_disables_phosphor() {
        let mut engine = SpectralEngine::new(small_config()).unwrap();
        engine.set_phosphor(8);
        assert!(engine.toggle_stop());
        assert_eq!(engine.phosphor(), 0);
        assert_eq!(engine.valid_generations(), 1);
        assert!(!engine.toggle_stop());
    }

    #[test]
    fn test_channel_mode_cycle() {
        let config = EngineConfig {
            channels: 3,
            ..small_config()
        };
        let mut engine = SpectralEngine::new(config).unwrap();

        let first = engine.cycle_channel_mode(ChannelSelector::One(1)).unwrap();
        assert_eq!(first.measurement, MeasurementMode::AveragedNoise);
        assert_eq!(first.window, WindowKind::Hft144d);

        // Wrapping the mode advances the window
        let second = engine.cycle_channel_mode(ChannelSelector::One(1)).unwrap();
        assert_eq!(second.measurement, MeasurementMode::Peak);
        assert_eq!(second.window, WindowKind::Rectangular);

        let all = engine.cycle_channel_mode(ChannelSelector::All).unwrap();
        for ch in 0..3 {
            assert_eq!(engine.channel_settings(ch).unwrap(), all);
        }

        assert!(matches!(
            engine.cycle_channel_mode(ChannelSelector::One(3)),
            Err(EngineError::ChannelOutOfRange { channel: 3, .. })
        ));
    }

    #[test]
    fn test_vbw_steps_are_bounded() {
        let mut engine = SpectralEngine::new(small_config()).unwrap();
        for _ in 0..5 {
            engine.step_vbw(Direction::Down);
        }
        assert_eq!(engine.video_filter(), VideoFilter::MaxHold);
        for _ in 0..20 {
            engine.step_vbw(Direction::Up);
        }
        assert_eq!(engine.video_filter(), VideoFilter::Order(256));
    }

    #[test]
    fn test_cold_reset_restores_defaults() {
        let mut engine = SpectralEngine::new(small_config()).unwrap();
        engine.set_span(1_000).unwrap();
        engine.set_window(0, WindowKind::Hanning).unwrap();
        engine.step_vbw(Direction::Up);

        engine.reset(false).unwrap();
        assert_eq!(engine.span_hz(), 1_000);
        assert_eq!(engine.channel_settings(0).unwrap().window, WindowKind::Hanning);

        engine.reset(true).unwrap();
        assert_eq!(engine.span_hz(), 20_000);
        assert_eq!(engine.channel_settings(0).unwrap().window, WindowKind::Hft144d);
        assert_eq!(engine.video_filter(), VideoFilter::Order(1));
        assert_eq!(engine.valid_generations(), 1);
    }

    #[test]
    fn test_tone_lands_on_expected_point() {
        let config = EngineConfig {
            channels: 2,
            jobs: 2,
            ..small_config()
        };
        let mut engine = SpectralEngine::new(config.clone()).unwrap();
        let (mut writer, mut reader) = BoundedBuffer::new(config.buffer_bytes(), 8).split();

        writer.write_samples(&sine(8192, 6_200.0, 2));
        let outcome = engine.process_available(&mut reader).unwrap();
        assert!(!outcome.discard);
        assert_eq!(outcome.chunks, 2);
        let frame = outcome.frame.unwrap();

        // 6200 Hz of a 0..20000 Hz plot over 50 columns
        for ch in 0..2 {
            let (point, _) = frame.peak(ch).unwrap();
            assert_eq!(point, 15);
            assert!(!frame.channels[ch].flags.zero);
        }
        assert!(frame.low_cpu);
        assert_eq!(frame.overruns, 0);
        assert!((frame.point_hz(15) - 6_000.0).abs() < 1.0);
    }

    #[test]
    fn test_cycle_before_full_history_is_discarded() {
        let config = small_config();
        let mut engine = SpectralEngine::new(config.clone()).unwrap();
        let (mut writer, mut reader) = BoundedBuffer::new(config.buffer_bytes(), 4).split();

        // One chunk of an 8192-sample transform rolled by 2
        writer.write_samples(&sine(4096, 1_000.0, 1));
        let outcome = engine.process_available(&mut reader).unwrap();
        assert_eq!(outcome.chunks, 1);
        assert!(outcome.discard);
        assert!(outcome.frame.is_none());

        writer.write_samples(&sine(4096, 1_000.0, 1));
        let outcome = engine.process_available(&mut reader).unwrap();
        assert!(!outcome.discard);
        assert!(outcome.frame.is_some());
        assert!(!engine.discard_pending());

        // A span change keeps the real samples already in the history
        engine.set_span(10_000).unwrap();
        writer.write_samples(&sine(4096, 1_000.0, 1));
        assert!(engine.process_available(&mut reader).unwrap().frame.is_some());
    }

    #[test]
    fn test_memory_add_while_stopped_keeps_frozen_trace() {
        let config = small_config();
        let mut engine = SpectralEngine::new(config.clone()).unwrap();
        let (mut writer, mut reader) = BoundedBuffer::new(config.buffer_bytes(), 4).split();

        writer.write_samples(&sine(8192, 6_200.0, 1));
        let live = engine.process_available(&mut reader).unwrap().frame.unwrap();

        assert!(engine.toggle_stop());
        assert!(engine.memory_add());
        writer.write_samples(&sine(4096, 1_000.0, 1));
        let frozen = engine.process_available(&mut reader).unwrap().frame.unwrap();

        assert!(frozen.stopped);
        assert_eq!(frozen.generations.len(), 2);
        assert_eq!(frozen.generations[0], frozen.generations[1]);
        assert_eq!(frozen.generations[0], live.generations[0]);
        assert_eq!(frozen.peak(0), live.peak(0));
    }

    #[test]
    fn test_video_filter_restarts_after_size_change() {
        let config = EngineConfig {
            max_fft_exponent: 14,
            ..small_config()
        };
        let quiet: Vec<f32> = sine(16_384, 10_000.0, 1).iter().map(|s| s * 0.2).collect();
        let run = |engine: &mut SpectralEngine, samples: &[f32]| {
            let (mut writer, mut reader) = BoundedBuffer::new(config.buffer_bytes(), 4).split();
            writer.write_samples(samples);
            engine.process_available(&mut reader).unwrap().frame.unwrap()
        };

        let mut filtered = SpectralEngine::new(config.clone()).unwrap();
        filtered.step_vbw(Direction::Up);
        let first = run(&mut filtered, &sine(8192, 10_000.0, 1));
        assert_eq!(first.params.fft_size, 8192);

        // A 500 Hz span needs a longer transform
        filtered.set_span(500).unwrap();
        let after = run(&mut filtered, &quiet);
        assert_eq!(after.params.fft_size, 16_384);
        assert_eq!(after.video, VideoFilter::Order(2));

        let mut fresh = SpectralEngine::new(config.clone()).unwrap();
        fresh.step_vbw(Direction::Up);
        fresh.set_span(500).unwrap();
        let unfiltered = run(&mut fresh, &quiet);

        assert!(after.peak(0).is_some());
        assert_eq!(after.generations[0], unfiltered.generations[0]);
    }

    #[test]
    fn test_partial_chunk_is_left_waiting() {
        let config = small_config();
        let mut engine = SpectralEngine::new(config.clone()).unwrap();
        let (mut writer, mut reader) = BoundedBuffer::new(config.buffer_bytes(), 4).split();

        writer.write_samples(&vec![0.0; 4000]);
        let outcome = engine.process_available(&mut reader).unwrap();
        assert_eq!(outcome.chunks, 0);
        assert!(outcome.frame.is_none());
        assert_eq!(reader.available_bytes(), 16_000);
    }
}
