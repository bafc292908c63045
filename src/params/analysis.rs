//! Analysis constants and display-scale settings.

/// Compile-time limits of the analysis pipeline
pub mod analysis_constants {
    /// Smallest supported FFT size exponent (2^13 = 8192 samples)
    pub const MIN_FFT_EXPONENT: u32 = 13;

    /// Largest supported FFT size exponent (2^25 samples)
    pub const MAX_FFT_EXPONENT: u32 = 25;

    /// Default upper FFT size exponent when not configured
    pub const DEFAULT_FFT_EXPONENT: u32 = 20;

    /// Upper bound of the roll factor option
    pub const MAX_ROLL_LIMIT: u32 = 256;

    /// Maximum number of input channels
    pub const MAX_CHANNELS: usize = 8;

    /// Maximum number of parallel transform workers
    pub const MAX_JOBS: usize = 4;

    /// Widest supported plot (display columns)
    pub const MAX_COLUMNS: usize = 2048;

    /// Number of retained generations in the ring
    pub const MAX_GENERATIONS: usize = 16;

    /// Deepest phosphor setting
    pub const MAX_PHOSPHOR: u32 = 16;

    /// Frame rate ceiling used to derive the RBW envelope (frames/s)
    pub const MAX_FPS: f32 = 50.0;

    /// Lowest RBW exponent (finest resolution is 2^-4)
    pub const RBW_EXPONENT_FLOOR: i32 = -4;

    /// Highest RBW exponent (coarsest resolution is 2^8)
    pub const RBW_EXPONENT_CEIL: i32 = 8;

    /// Width of the RBW envelope (exponent steps above its minimum)
    pub const RBW_EXPONENT_RANGE: i32 = 10;

    /// Largest relative step between plotted points (display columns)
    pub const MAX_STEP: f32 = 1.0;

    /// Smallest relative step between plotted points (display columns)
    pub const MIN_STEP: f32 = 0.125;

    /// Fixed-point scale of stored levels (hundredths of a dB)
    pub const DB_SCALE: f64 = 100.0;

    /// Lowest storable level, also used for "show zero as finite"
    /// (-327.67 dB)
    pub const LEVEL_FLOOR: i16 = i16::MIN + 1;

    /// Width of one interleaved sample in bytes (f32)
    pub const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

    /// Video bandwidth exponent bounds (-1 = max hold)
    pub const VBW_EXPONENT_MIN: i32 = -1;
    pub const VBW_EXPONENT_MAX: i32 = 8;
}

/// Video filter applied across successive frames at the same point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFilter {
    /// Keep the greater of the new and previous level
    MaxHold,

    /// One-pole IIR low-pass of the given order (1 = unfiltered)
    Order(u32),
}

impl VideoFilter {
    /// Build from the user-facing exponent (-1 = max hold, n = order 2^n)
    pub fn from_exponent(exponent: i32) -> Self {
        if exponent < 0 {
            Self::MaxHold
        } else {
            Self::Order(1 << exponent.min(analysis_constants::VBW_EXPONENT_MAX))
        }
    }

    /// Blend a fresh level with the previous generation's level
    pub fn blend(self, fresh: i16, previous: i16) -> i16 {
        match self {
            Self::MaxHold => fresh.max(previous),
            Self::Order(k) if k > 1 => {
                let k = k as f32;
                // Truncates toward zero like the integer store it feeds
                ((fresh as f32 + previous as f32 * (k - 1.0)) / k) as i16
            }
            Self::Order(_) => fresh,
        }
    }

    pub fn label(self) -> String {
        match self {
            Self::MaxHold => "VBW: Max Hold".to_string(),
            Self::Order(1) => "VBW: Full".to_string(),
            Self::Order(k) => format!("VBW: 1/{}x", k),
        }
    }
}

/// Y-axis scale: voltage decibels or power decibels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerUnits {
    /// dBV scale, 5 dB per decade of normalized bin power
    #[default]
    Volts,

    /// dB power scale, 10 dB per decade of normalized bin power
    Power,
}

impl PowerUnits {
    /// Decibels per decade of power (10 / (2 - isPowerMode))
    pub fn db_per_decade(self) -> f64 {
        match self {
            Self::Volts => 10.0 / 2.0,
            Self::Power => 10.0,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Volts => Self::Power,
            Self::Power => Self::Volts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_filter_from_exponent() {
        assert_eq!(VideoFilter::from_exponent(-1), VideoFilter::MaxHold);
        assert_eq!(VideoFilter::from_exponent(0), VideoFilter::Order(1));
        assert_eq!(VideoFilter::from_exponent(3), VideoFilter::Order(8));
    }

    #[test]
    fn test_video_filter_blend() {
        // (100 + 200 * 3) / 4 = 175
        assert_eq!(VideoFilter::Order(4).blend(100, 200), 175);
        assert_eq!(VideoFilter::Order(1).blend(100, 200), 100);
        assert_eq!(VideoFilter::MaxHold.blend(-500, -300), -300);
        assert_eq!(VideoFilter::MaxHold.blend(-200, -300), -200);
    }

    #[test]
    fn test_power_units_scale() {
        assert_eq!(PowerUnits::Volts.db_per_decade(), 5.0);
        assert_eq!(PowerUnits::Power.db_per_decade(), 10.0);
        assert_eq!(PowerUnits::Volts.toggled(), PowerUnits::Power);
    }
}
