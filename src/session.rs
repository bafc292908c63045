//! Processing session: the bounded buffer, the processing thread and the
//! input collaborator, wired together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::audio::{InputEvents, SampleSource};
use crate::buffer::{BoundedBuffer, Doorbell, SampleReader};
use crate::engine::{ChannelSelector, Direction, SpectralEngine, SpectrumFrame};
use crate::error::{EngineError, Result};
use crate::params::analysis_constants::SAMPLE_BYTES;
use crate::params::{EngineConfig, MeasurementMode, WindowKind};

/// Longest sleep between checks when no data arrives
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Latest published frame, shared with the renderer
pub type SharedFrame = Arc<Mutex<Option<Arc<SpectrumFrame>>>>;

/// Requests handled by the processing thread between cycles
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetCenter(i64),
    SetSpan(i64),
    StepRbw(Direction),
    StepVbw(Direction),
    MemoryAdd,
    CyclePhosphor,
    SetPhosphor(u32),
    ToggleStop,
    CycleStepRelative,
    CycleChannelMode(ChannelSelector),
    SetWindow(usize, WindowKind),
    SetMeasurement(usize, MeasurementMode),
    TogglePowerUnits,
    Reset { cold: bool },

    /// The input collaborator failed; ends the session with an error
    InputLost(String),

    /// Finish the session normally
    Shutdown,
}

/// What the processing loop does after a command
enum Flow {
    Continue,
    Exit,
}

/// Apply one command; a rejected user operation is logged, not fatal
fn apply(engine: &mut SpectralEngine, command: Command) -> Result<Flow> {
    debug!("Command: {:?}", command);
    let applied = match command {
        Command::SetCenter(hz) => engine.set_center(hz),
        Command::SetSpan(hz) => engine.set_span(hz),
        Command::StepRbw(direction) => engine.step_rbw(direction),
        Command::StepVbw(direction) => {
            engine.step_vbw(direction);
            Ok(())
        }
        Command::MemoryAdd => {
            if !engine.memory_add() {
                debug!("Memory add ignored");
            }
            Ok(())
        }
        Command::CyclePhosphor => {
            engine.cycle_phosphor();
            Ok(())
        }
        Command::SetPhosphor(depth) => {
            engine.set_phosphor(depth);
            Ok(())
        }
        Command::ToggleStop => {
            engine.toggle_stop();
            Ok(())
        }
        Command::CycleStepRelative => {
            engine.cycle_step_relative();
            Ok(())
        }
        Command::CycleChannelMode(selector) => engine.cycle_channel_mode(selector).map(|_| ()),
        Command::SetWindow(channel, kind) => engine.set_window(channel, kind),
        Command::SetMeasurement(channel, mode) => engine.set_measurement(channel, mode),
        Command::TogglePowerUnits => {
            engine.toggle_power_units();
            Ok(())
        }
        Command::Reset { cold } => engine.reset(cold),
        Command::InputLost(reason) => return Err(EngineError::InputLost(reason)),
        Command::Shutdown => return Ok(Flow::Exit),
    };

    if let Err(e) = applied {
        warn!("Command rejected: {}", e);
    }
    Ok(Flow::Continue)
}

/// Processing thread body: apply commands, drain chunks, publish frames
fn run_processing(
    mut engine: SpectralEngine,
    mut reader: SampleReader,
    commands: Receiver<Command>,
    latest: SharedFrame,
) -> Result<()> {
    let doorbell = reader.doorbell();
    let mut published = 0u64;

    loop {
        for command in commands.try_iter() {
            if let Flow::Exit = apply(&mut engine, command)? {
                info!("Processing thread done after {} frames", published);
                return Ok(());
            }
        }

        let outcome = engine.process_available(&mut reader)?;

        if let Some(count) = reader.take_overrun_report() {
            warn!(
                "Input overrun: {} bytes dropped; buffer too small relative to period size; raise --buffer-factor",
                count
            );
        }

        if let Some(frame) = outcome.frame {
            *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            published += 1;
        }

        if outcome.chunks == 0 {
            let chunk_bytes = engine.chunk_bytes();
            doorbell.wait(IDLE_WAIT, || {
                reader.available_bytes() >= chunk_bytes || !commands.is_empty()
            });
        }
    }
}

/// Entry point for building and starting a session
pub struct Session;

impl Session {
    /// Build the engine (plans and window tables), the bounded buffer and
    /// the processing thread, then start the input collaborator
    pub fn start(config: EngineConfig, mut source: Box<dyn SampleSource>) -> Result<SessionHandle> {
        let format = source.format();
        if format.sample_rate_hz != config.sample_rate_hz || format.channels != config.channels {
            return Err(EngineError::InvalidConfig(format!(
                "input delivers {} ch @ {} Hz, engine expects {} ch @ {} Hz",
                format.channels, format.sample_rate_hz, config.channels, config.sample_rate_hz
            )));
        }

        let engine = SpectralEngine::new(config.clone())?;

        let buffer_bytes = config.buffer_bytes();
        if buffer_bytes < config.period_bytes() * 2 {
            warn!(
                "Buffer of {} bytes holds fewer than two {}-byte periods",
                buffer_bytes,
                config.period_bytes()
            );
        }
        let (writer, reader) =
            BoundedBuffer::new(buffer_bytes, config.channels * SAMPLE_BYTES).split();
        info!(
            "Buffer: {} bytes ({} frames)",
            buffer_bytes,
            buffer_bytes / (config.channels * SAMPLE_BYTES)
        );

        let doorbell = reader.doorbell();
        let overruns = reader.overrun_counter();
        let (command_tx, command_rx) = unbounded();
        let latest: SharedFrame = Arc::new(Mutex::new(None));
        let latest_thread = Arc::clone(&latest);

        let thread = thread::Builder::new()
            .name("spectral-processing".to_string())
            .spawn(move || {
                let result = run_processing(engine, reader, command_rx, latest_thread);
                if let Err(e) = &result {
                    error!("Processing stopped: {}", e);
                }
                result
            })
            .map_err(|e| EngineError::InvalidConfig(format!("cannot spawn processing thread: {}", e)))?;

        let events = InputEvents::new(command_tx.clone(), Arc::clone(&doorbell));
        let mut handle = SessionHandle {
            source: None,
            commands: command_tx,
            doorbell,
            latest,
            overruns,
            thread: Some(thread),
        };

        source.start(writer, events)?;
        handle.source = Some(source);
        Ok(handle)
    }
}

/// Control side of a running session
pub struct SessionHandle {
    source: Option<Box<dyn SampleSource>>,
    commands: Sender<Command>,
    doorbell: Arc<Doorbell>,
    latest: SharedFrame,
    overruns: Arc<AtomicU64>,
    thread: Option<thread::JoinHandle<Result<()>>>,
}

impl SessionHandle {
    /// Queue a command for the processing thread
    pub fn send(&self, command: Command) {
        // A closed channel means the thread already ended; shutdown reports why
        let _ = self.commands.send(command);
        self.doorbell.ring();
    }

    /// Most recent published frame, if any
    pub fn latest_frame(&self) -> Option<Arc<SpectrumFrame>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bytes dropped by the input side so far
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// The processing thread has ended (input loss or a fatal error)
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop the input, end the processing thread and release the engine
    pub fn shutdown(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.send(Command::Shutdown);
        thread
            .join()
            .map_err(|_| EngineError::Transform("processing thread panicked".to_string()))?
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            debug!("Session ended with: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_dispatch_to_engine() {
        let config = EngineConfig {
            max_fft_exponent: 13,
            ..Default::default()
        };
        let mut engine = SpectralEngine::new(config).unwrap();

        assert!(matches!(apply(&mut engine, Command::SetSpan(1_000)), Ok(Flow::Continue)));
        assert_eq!(engine.span_hz(), 1_000);

        // Rejected operations leave the session running
        assert!(matches!(apply(&mut engine, Command::SetSpan(0)), Ok(Flow::Continue)));
        assert!(matches!(
            apply(&mut engine, Command::SetWindow(5, WindowKind::Hanning)),
            Ok(Flow::Continue)
        ));

        assert!(matches!(apply(&mut engine, Command::Shutdown), Ok(Flow::Exit)));
        assert!(matches!(
            apply(&mut engine, Command::InputLost("unplugged".to_string())),
            Err(EngineError::InputLost(_))
        ));
    }
}
