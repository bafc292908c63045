//! Engine error taxonomy.
//!
//! Transient conditions (overruns, amplitude overload) are never errors; they
//! surface as counters and flags on published frames. Everything here is
//! either a configuration bug or loss of the input collaborator.

use thiserror::Error;

/// Errors raised by the spectral engine and its session
#[derive(Debug, Error)]
pub enum EngineError {
    /// Span is used as a denominator throughout parameter derivation
    #[error("span of 0 Hz is not allowed")]
    ZeroSpan,

    #[error("FFT size exponent {exponent} outside supported range {min}..={max}")]
    FftExponentOutOfRange { exponent: u32, min: u32, max: u32 },

    /// A plan or window table was requested for a size never built
    #[error("no transform plan for 2^{exponent} (plans cover 2^{min}..=2^{max})")]
    UnsupportedPlan { exponent: u32, min: u32, max: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("channel {channel} out of range ({channels} channels)")]
    ChannelOutOfRange { channel: usize, channels: usize },

    /// The input subsystem went away; the session stops without reconnecting
    #[error("audio input lost: {0}")]
    InputLost(String),

    #[error("audio device error: {0}")]
    Audio(String),

    #[error("WAV source error: {0}")]
    Wav(#[from] hound::Error),

    #[error("transform failed: {0}")]
    Transform(String),
}

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, EngineError>;
