//! specan library - real-time multichannel spectral analysis engine

pub mod audio;
pub mod buffer;
pub mod cli;
pub mod controller;
pub mod engine;
pub mod error;
pub mod params;
pub mod reducer;
pub mod retention;
pub mod session;
pub mod transform;
pub mod window;

pub use engine::{SpectralEngine, SpectrumFrame};
pub use error::{EngineError, Result};
pub use params::EngineConfig;
pub use session::{Command, Session, SessionHandle};
