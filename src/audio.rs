//! Audio input collaborators.
//!
//! A source delivers interleaved `f32` periods into the bounded buffer's
//! writer half: live capture through cpal, or replay of a WAV file.

mod system;
mod wav;

pub use system::CaptureSystem;
pub use wav::WavSource;

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::buffer::{Doorbell, SampleWriter};
use crate::error::Result;
use crate::session::Command;

/// Sample format a source delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    /// Sample rate (Hz)
    pub sample_rate_hz: u32,

    /// Interleaved channels per frame
    pub channels: usize,
}

/// Lets a source report to the processing thread from any context
#[derive(Debug, Clone)]
pub struct InputEvents {
    commands: Sender<Command>,
    doorbell: Arc<Doorbell>,
}

impl InputEvents {
    pub fn new(commands: Sender<Command>, doorbell: Arc<Doorbell>) -> Self {
        Self { commands, doorbell }
    }

    /// The input went away; the session ends with `InputLost`
    pub fn input_lost(&self, reason: impl Into<String>) {
        let _ = self.commands.send(Command::InputLost(reason.into()));
        self.doorbell.ring();
    }

    /// The input ran out normally; the session ends cleanly
    pub fn end_of_input(&self) {
        let _ = self.commands.send(Command::Shutdown);
        self.doorbell.ring();
    }
}

/// An input collaborator feeding the bounded buffer
pub trait SampleSource {
    fn format(&self) -> InputFormat;

    /// Begin delivering periods into `writer`
    fn start(&mut self, writer: SampleWriter, events: InputEvents) -> Result<()>;

    /// Stop delivering; called before the processing thread is joined
    fn stop(&mut self) {}
}
