//! Parameter definitions with physical units and documented semantics.
//!
//! All tunables of the engine live here with:
//! - Physical units (Hz, samples, hundredths of a dB)
//! - Documented ranges and meanings
//! - Type safety where possible

mod analysis;
mod channel;
mod engine;

// Re-export all types
pub use analysis::{analysis_constants, PowerUnits, VideoFilter};
pub use channel::{MeasurementMode, WindowKind};
pub use engine::{EngineConfig, SpanLimits};
