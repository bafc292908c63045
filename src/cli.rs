//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;

use crate::audio::InputFormat;
use crate::params::analysis_constants::DEFAULT_FFT_EXPONENT;
use crate::params::{EngineConfig, MeasurementMode, PowerUnits, WindowKind};

/// Window choice on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WindowArg {
    Flat,
    Blackman,
    Hanning,
    FlatTop,
    Hft144d,
}

impl From<WindowArg> for WindowKind {
    fn from(arg: WindowArg) -> Self {
        match arg {
            WindowArg::Flat => WindowKind::Rectangular,
            WindowArg::Blackman => WindowKind::Blackman,
            WindowArg::Hanning => WindowKind::Hanning,
            WindowArg::FlatTop => WindowKind::FlatTop,
            WindowArg::Hft144d => WindowKind::Hft144d,
        }
    }
}

/// Measurement choice on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MeasurementArg {
    /// Peak of the bins in each point (tones)
    Tone,
    /// Average power minus window noise gain (noise floor)
    Noise,
}

impl From<MeasurementArg> for MeasurementMode {
    fn from(arg: MeasurementArg) -> Self {
        match arg {
            MeasurementArg::Tone => MeasurementMode::Peak,
            MeasurementArg::Noise => MeasurementMode::AveragedNoise,
        }
    }
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "specan")]
#[command(about = "Real-time multichannel spectrum analyzer", long_about = None)]
pub struct Args {
    /// Replay a WAV file instead of capturing from a device
    #[arg(long, value_name = "PATH")]
    pub wav: Option<PathBuf>,

    /// Restart the WAV file when it ends
    #[arg(long = "loop", requires = "wav")]
    pub looping: bool,

    /// Input device name (substring match); default device if omitted
    #[arg(long, value_name = "NAME", conflicts_with = "wav")]
    pub device: Option<String>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<f32>,

    /// Largest FFT size exponent (13..=25)
    #[arg(short = 'k', long = "fftk-max", value_name = "K", default_value_t = DEFAULT_FFT_EXPONENT)]
    pub max_fft_exponent: u32,

    /// Largest roll factor (1..=256)
    #[arg(long, value_name = "N", default_value_t = 16)]
    pub roll: u32,

    /// Parallel transform workers (1..=4)
    #[arg(short, long, value_name = "N", default_value_t = 1)]
    pub jobs: usize,

    /// Lower edge of the plot (Hz)
    #[arg(long, value_name = "HZ", default_value_t = 0)]
    pub start_hz: i64,

    /// Upper edge of the plot (Hz)
    #[arg(long, value_name = "HZ", default_value_t = 20_000)]
    pub stop_hz: i64,

    /// Display columns the spectrum is reduced to
    #[arg(long, value_name = "N", default_value_t = 500)]
    pub columns: usize,

    /// Phosphor depth: 0 (off), 1, 2, 4, 8 or 16 (infinite)
    #[arg(long, value_name = "DEPTH", default_value_t = 0)]
    pub phosphor: u32,

    /// Generations available to "memory add" (0..=15)
    #[arg(long, value_name = "N", default_value_t = 15)]
    pub memory_slots: usize,

    /// Window applied to every channel
    #[arg(long, value_enum, default_value_t = WindowArg::Hft144d)]
    pub window: WindowArg,

    /// Measurement mode applied to every channel
    #[arg(long, value_enum, default_value_t = MeasurementArg::Tone)]
    pub measurement: MeasurementArg,

    /// Video bandwidth exponent: -1 max hold, 0 full, n = 1/2^n
    #[arg(long, value_name = "N", default_value_t = 0, allow_negative_numbers = true)]
    pub vbw: i32,

    /// Show exactly-zero bins at -327.67 dB instead of leaving them empty
    #[arg(long)]
    pub show_zero: bool,

    /// Scale levels as dB power instead of dBV
    #[arg(long)]
    pub power: bool,

    /// Frames per input period
    #[arg(long, value_name = "FRAMES", default_value_t = 1024)]
    pub period_frames: usize,

    /// Bounded buffer size as a multiple of the largest transform
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub buffer_factor: usize,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Log level implied by `--verbose`
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Engine configuration for an input of the given format
    pub fn engine_config(&self, format: InputFormat) -> EngineConfig {
        EngineConfig {
            sample_rate_hz: format.sample_rate_hz,
            channels: format.channels,
            period_frames: self.period_frames,
            max_fft_exponent: self.max_fft_exponent,
            max_roll: self.roll,
            jobs: self.jobs,
            display_columns: self.columns,
            start_hz: self.start_hz,
            stop_hz: self.stop_hz,
            phosphor: self.phosphor,
            memory_slots: self.memory_slots,
            default_window: self.window.into(),
            default_measurement: self.measurement.into(),
            vbw_exponent: self.vbw,
            show_zero: self.show_zero,
            power_units: if self.power {
                PowerUnits::Power
            } else {
                PowerUnits::Volts
            },
            buffer_factor: self.buffer_factor,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEREO_48K: InputFormat = InputFormat {
        sample_rate_hz: 48_000,
        channels: 2,
    };

    #[test]
    fn test_defaults_match_engine_defaults() {
        let args = Args::parse_from(["specan"]);
        let config = args.engine_config(STEREO_48K);
        let defaults = EngineConfig::default();

        assert_eq!(config.max_fft_exponent, defaults.max_fft_exponent);
        assert_eq!(config.max_roll, defaults.max_roll);
        assert_eq!(config.display_columns, defaults.display_columns);
        assert_eq!(config.default_window, WindowKind::Hft144d);
        assert_eq!(config.channels, 2);
        assert!(config.validate().is_ok());
        assert_eq!(args.log_level(), LevelFilter::Warn);
    }

    #[test]
    fn test_parse_options() {
        let args = Args::parse_from([
            "specan",
            "-k",
            "16",
            "--jobs",
            "2",
            "--window",
            "hanning",
            "--measurement",
            "noise",
            "--vbw",
            "-1",
            "--power",
            "-vv",
        ]);
        let config = args.engine_config(STEREO_48K);
        assert_eq!(config.max_fft_exponent, 16);
        assert_eq!(config.jobs, 2);
        assert_eq!(config.default_window, WindowKind::Hanning);
        assert_eq!(config.default_measurement, MeasurementMode::AveragedNoise);
        assert_eq!(config.vbw_exponent, -1);
        assert_eq!(config.power_units, PowerUnits::Power);
        assert_eq!(args.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn test_loop_requires_wav() {
        assert!(Args::try_parse_from(["specan", "--loop"]).is_err());
    }
}
