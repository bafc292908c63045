//! Spectral bin reducer.
//!
//! Maps the `N/2 + 1` bins of one channel onto display points, converts
//! power to quantized decibels and applies the video filter against the
//! previous generation.

use rustfft::num_complex::Complex;

use crate::params::analysis_constants::{DB_SCALE, LEVEL_FLOOR};
use crate::params::{MeasurementMode, PowerUnits, VideoFilter};
use crate::retention::{Generation, Level};

/// Linear-power decibel scaling for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbScale {
    /// Hundredths of a dB per decade of power
    coe0: f64,

    /// Normalization added to `log10(power)`: FFT length and noise gain
    coe1: f64,
}

impl DbScale {
    /// `noise_gain_bins` is only folded in for averaged-noise readings
    pub fn new(fft_size: usize, units: PowerUnits, mode: MeasurementMode, noise_gain_bins: f64) -> Self {
        let noise_gain = match mode {
            MeasurementMode::AveragedNoise => noise_gain_bins,
            MeasurementMode::Peak => 1.0,
        };
        Self {
            coe0: DB_SCALE * units.db_per_decade(),
            coe1: 2.0 * (2.0 / fft_size as f64).log10() + (1.0 / noise_gain).log10(),
        }
    }

    /// Quantize `log10(power)` to hundredths of a dB, floored at LEVEL_FLOOR
    pub fn quantize(&self, log_power: f64) -> i16 {
        let db = (self.coe0 * (log_power + self.coe1)).round();
        db.clamp(LEVEL_FLOOR as f64, i16::MAX as f64) as i16
    }
}

/// Combines the linear power of the bins falling into one point
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerAccumulator {
    sum: f64,
    max: f64,
    count: usize,
}

impl PowerAccumulator {
    pub fn add(&mut self, power: f64) {
        self.sum += power;
        self.max = if self.count == 0 { power } else { self.max.max(power) };
        self.count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean for averaged-noise readings, maximum for peak readings
    pub fn combine(&self, mode: MeasurementMode) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(match mode {
            MeasurementMode::AveragedNoise => self.sum / self.count as f64,
            MeasurementMode::Peak => self.max,
        })
    }

    /// Combined value, leaving the accumulator empty
    pub fn take(&mut self, mode: MeasurementMode) -> Option<f64> {
        let combined = self.combine(mode);
        *self = Self::default();
        combined
    }
}

/// Everything the reducer needs to know about the current cycle
#[derive(Debug, Clone, Copy)]
pub struct ReduceSettings {
    pub squeeze: bool,

    /// Bins covering the span
    pub plot_samples: usize,

    /// Absolute index of the first bin of the span
    pub first_sample_offset: i64,

    /// Points advanced per bin in squeeze mode (step_abs / step_rel, at most 1)
    pub bin_to_point_ratio: f64,

    pub scale: DbScale,
    pub mode: MeasurementMode,
    pub video: VideoFilter,

    /// A previous generation of the same bin layout exists
    pub continue_filter: bool,

    /// Store true silence as LEVEL_FLOOR instead of "no data"
    pub show_zero: bool,
}

/// Points written by one reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsedPoints {
    pub first: Option<usize>,
    pub last: usize,
}

/// Writes one channel of the current generation
struct PointWriter<'a> {
    channel: usize,
    settings: &'a ReduceSettings,
    current: &'a mut Generation,
    previous: Option<&'a Generation>,
}

impl PointWriter<'_> {
    fn store(&mut self, point: usize, power: f64) {
        let fresh = self.settings.scale.quantize(power.log10());
        let previous = match (self.settings.continue_filter, self.previous) {
            (true, Some(generation)) => generation.get(point, self.channel),
            _ => None,
        };
        let level = match previous {
            Some(old) => self.settings.video.blend(fresh, old),
            None => fresh,
        };
        self.current.set(point, self.channel, Some(level));
    }

    fn store_silence(&mut self, point: usize) {
        let level: Level = self.settings.show_zero.then_some(LEVEL_FLOOR);
        self.current.set(point, self.channel, level);
    }
}

/// Reduce one channel's spectrum into `current`.
///
/// In squeeze mode every point is flushed exactly once: when the bin index
/// moves to the next point, and once more after the last bin.
pub fn reduce(
    spectrum: &[Complex<f64>],
    channel: usize,
    settings: &ReduceSettings,
    current: &mut Generation,
    previous: Option<&Generation>,
) -> UsedPoints {
    current.clear_channel(channel);
    let points = current.points();
    let last_bin = spectrum.len() as i64 - 1;

    let mut writer = PointWriter {
        channel,
        settings,
        current,
        previous,
    };
    let mut used = UsedPoints::default();
    let mut accumulator = PowerAccumulator::default();
    let mut open_point = 0usize;

    for sample in 0..=settings.plot_samples + 1 {
        let point = if settings.squeeze {
            (sample as f64 * settings.bin_to_point_ratio) as usize
        } else {
            sample
        };
        let absolute = sample as i64 + settings.first_sample_offset;
        if absolute < 0 || absolute > last_bin || point >= points {
            continue;
        }

        if point != open_point {
            if let Some(power) = accumulator.take(settings.mode) {
                writer.store(open_point, power);
            }
            open_point = point;
        }
        used.first.get_or_insert(point);
        used.last = point;

        let bin = spectrum[absolute as usize];
        let power = bin.norm_sqr();
        if power == 0.0 {
            if accumulator.is_empty() {
                writer.store_silence(point);
            }
        } else if settings.squeeze {
            accumulator.add(power);
        } else {
            writer.store(point, power);
        }
    }

    if let Some(power) = accumulator.take(settings.mode) {
        writer.store(open_point, power);
    }

    used
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 8192;

    fn settings(squeeze: bool, plot_samples: usize, ratio: f64, mode: MeasurementMode) -> ReduceSettings {
        ReduceSettings {
            squeeze,
            plot_samples,
            first_sample_offset: 0,
            bin_to_point_ratio: ratio,
            scale: DbScale::new(SIZE, PowerUnits::Volts, mode, 1.0),
            mode,
            video: VideoFilter::Order(1),
            continue_filter: false,
            show_zero: false,
        }
    }

    fn tone(bins: usize, amplitude: f64) -> Vec<Complex<f64>> {
        vec![Complex::new(amplitude, 0.0); bins]
    }

    #[test]
    fn test_squeeze_average_and_max() {
        let mut acc = PowerAccumulator::default();
        for p in [1.0, 4.0, 9.0] {
            acc.add(p);
        }
        let mean = acc.combine(MeasurementMode::AveragedNoise).unwrap();
        assert!((mean - 4.6667).abs() < 1e-4);
        assert_eq!(acc.combine(MeasurementMode::Peak), Some(9.0));

        assert_eq!(acc.take(MeasurementMode::Peak), Some(9.0));
        assert!(acc.is_empty());
        assert_eq!(acc.combine(MeasurementMode::Peak), None);
    }

    #[test]
    fn test_quantization_is_deterministic() {
        // I = 1, Q = 0: log10(1) = 0; 500 * 2 * log10(2 / 8192) = -3612.36
        let scale = DbScale::new(SIZE, PowerUnits::Volts, MeasurementMode::Peak, 4.5386);
        assert_eq!(scale.quantize(0.0), -3612);
        assert_eq!(scale.quantize(0.0), scale.quantize(0.0));

        let spectrum = tone(4, 1.0);
        let s = settings(false, 2, 1.0, MeasurementMode::Peak);
        let mut a = Generation::new(8, 1);
        let mut b = Generation::new(8, 1);
        reduce(&spectrum, 0, &s, &mut a, None);
        reduce(&spectrum, 0, &s, &mut b, None);
        assert_eq!(a.get(0, 0), Some(-3612));
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_gain_only_in_averaged_mode() {
        let peak = DbScale::new(SIZE, PowerUnits::Power, MeasurementMode::Peak, 1.5);
        let noise = DbScale::new(SIZE, PowerUnits::Power, MeasurementMode::AveragedNoise, 1.5);
        // 1000 * log10(1 / 1.5) = -176.09
        assert_eq!(peak.quantize(0.0) - noise.quantize(0.0), 176);
    }

    #[test]
    fn test_quantization_floor() {
        let scale = DbScale::new(SIZE, PowerUnits::Power, MeasurementMode::Peak, 1.0);
        assert_eq!(scale.quantize(-1e9), LEVEL_FLOOR);
    }

    #[test]
    fn test_exact_mode_maps_bins_one_to_one() {
        let spectrum: Vec<Complex<f64>> = (0..8).map(|i| Complex::new(i as f64 + 1.0, 0.0)).collect();
        let s = settings(false, 3, 1.0, MeasurementMode::Peak);
        let mut generation = Generation::new(10, 1);
        let used = reduce(&spectrum, 0, &s, &mut generation, None);

        // samples 0..=plot_samples+1
        assert_eq!(used, UsedPoints { first: Some(0), last: 4 });
        for point in 0..5 {
            let power = ((point + 1) as f64).powi(2);
            assert_eq!(generation.get(point, 0), Some(s.scale.quantize(power.log10())));
        }
        assert_eq!(generation.get(5, 0), None);
    }

    #[test]
    fn test_squeeze_flushes_each_point_once() {
        // Ratio 0.5: bins (0,1) -> point 0, (2,3) -> point 1, ...
        // bins 0..=9 visited (plot_samples 8, plus the trailing sample)
        let spectrum: Vec<Complex<f64>> = (0..16)
            .map(|i| Complex::new(if i % 2 == 0 { 1.0 } else { 10.0 }, 0.0))
            .collect();
        let s = settings(true, 8, 0.5, MeasurementMode::AveragedNoise);
        let mut generation = Generation::new(16, 1);
        let used = reduce(&spectrum, 0, &s, &mut generation, None);

        assert_eq!(used, UsedPoints { first: Some(0), last: 4 });
        // Each pair averages linear power (1 + 100) / 2
        let expected = s.scale.quantize(50.5f64.log10());
        for point in 0..5 {
            assert_eq!(generation.get(point, 0), Some(expected), "point {}", point);
        }
        assert_eq!(generation.get(5, 0), None);
    }

    #[test]
    fn test_squeeze_peak_keeps_max_at_boundaries() {
        // Ratio 1/4: four bins per point; the loud bins sit last in point 0
        // and first in point 1, so a misplaced flush would leak one across
        let mut spectrum = tone(16, 1.0);
        spectrum[3] = Complex::new(100.0, 0.0);
        spectrum[4] = Complex::new(0.0, 50.0);
        let s = settings(true, 10, 0.25, MeasurementMode::Peak);
        let mut generation = Generation::new(8, 1);
        let used = reduce(&spectrum, 0, &s, &mut generation, None);

        assert_eq!(used.last, 2);
        assert_eq!(generation.get(0, 0), Some(s.scale.quantize(10_000f64.log10())));
        assert_eq!(generation.get(1, 0), Some(s.scale.quantize(2_500f64.log10())));
        assert_eq!(generation.get(2, 0), Some(s.scale.quantize(0.0)));
    }

    #[test]
    fn test_zero_bins() {
        let spectrum = tone(8, 0.0);
        let mut s = settings(true, 4, 0.5, MeasurementMode::Peak);
        let mut generation = Generation::new(8, 1);
        reduce(&spectrum, 0, &s, &mut generation, None);
        assert!(generation.channel(0).all(|level| level.is_none()));

        s.show_zero = true;
        let used = reduce(&spectrum, 0, &s, &mut generation, None);
        for point in 0..=used.last {
            assert_eq!(generation.get(point, 0), Some(LEVEL_FLOOR));
        }
    }

    #[test]
    fn test_offset_skips_bins_outside_transform() {
        let spectrum = tone(5, 1.0);
        let mut s = settings(false, 4, 1.0, MeasurementMode::Peak);
        s.first_sample_offset = -2;
        let mut generation = Generation::new(10, 1);
        let used = reduce(&spectrum, 0, &s, &mut generation, None);

        assert_eq!(used, UsedPoints { first: Some(2), last: 5 });
        assert_eq!(generation.get(1, 0), None);
        assert!(generation.get(2, 0).is_some());
    }

    #[test]
    fn test_video_filter_needs_previous_frame() {
        let spectrum = tone(4, 1.0);
        let mut s = settings(false, 1, 1.0, MeasurementMode::Peak);
        s.video = VideoFilter::Order(4);

        let mut previous = Generation::new(4, 1);
        previous.set(0, 0, Some(-2000));

        let mut current = Generation::new(4, 1);
        reduce(&spectrum, 0, &s, &mut current, Some(&previous));
        assert_eq!(current.get(0, 0), Some(-3612));

        s.continue_filter = true;
        reduce(&spectrum, 0, &s, &mut current, Some(&previous));
        // (-3612 + -2000 * 3) / 4 = -2403
        assert_eq!(current.get(0, 0), Some(-2403));
        // No previous level at point 1: stored unfiltered
        assert_eq!(current.get(1, 0), Some(-3612));
    }
}
