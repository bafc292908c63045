//! Per-channel measurement settings.

/// Window function applied before each transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WindowKind {
    /// Flat window (no tapering)
    Rectangular,
    Blackman,
    Hanning,
    /// Flat-top 'FTSRS' window, accurate tone amplitude
    FlatTop,
    /// 144 dB side-lobe flat-top window
    #[default]
    Hft144d,
}

impl WindowKind {
    /// Every window, in cycling order
    pub const ALL: [WindowKind; 5] = [
        WindowKind::Rectangular,
        WindowKind::Blackman,
        WindowKind::Hanning,
        WindowKind::FlatTop,
        WindowKind::Hft144d,
    ];

    /// Cosine-sum coefficients `a_k` of `w(θ) = Σ a_k·cos(2kθ)`,
    /// normalized to `a_0 = 1` so every window has unity gain
    pub fn coefficients(self) -> &'static [f64] {
        match self {
            Self::Rectangular => &[1.0],
            Self::Blackman => &[0.42 / 0.42, -0.50 / 0.42, 0.08 / 0.42],
            Self::Hanning => &[1.0, -1.0],
            Self::FlatTop => &[1.0, -1.93, 1.29, -0.388, 0.028],
            Self::Hft144d => &[
                1.0,
                -1.967_600_33,
                1.579_836_07,
                -0.811_236_44,
                0.225_835_58,
                -0.027_738_48,
                0.000_903_60,
            ],
        }
    }

    /// Equivalent noise bandwidth of the window (bins).
    /// Averaged-noise readings are divided by this to compare windows.
    pub fn noise_gain_bins(self) -> f64 {
        match self {
            Self::Rectangular => 1.0,
            Self::Blackman => 1.727,
            Self::Hanning => 1.5,
            Self::FlatTop => 3.7702,
            Self::Hft144d => 4.5386,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Rectangular => "Flat",
            Self::Blackman => "Blackmn",
            Self::Hanning => "Hanning",
            Self::FlatTop => "FlatTop",
            Self::Hft144d => "HFT144D",
        }
    }

    /// Position in `ALL`, used to index per-plan window tables
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }
}

/// How multiple FFT bins collapsing into one point are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MeasurementMode {
    /// Running maximum, for tone detection
    #[default]
    Peak,

    /// Running mean of power, corrected by the window's noise gain
    AveragedNoise,
}

impl MeasurementMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Peak => "Tone (MAX)",
            Self::AveragedNoise => "Noise minus NF (AVG)",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Peak => Self::AveragedNoise,
            Self::AveragedNoise => Self::Peak,
        }
    }
}
