//! specan - real-time multichannel spectrum analyzer
//!
//! Captures from an audio device (or replays a WAV file), runs the spectral
//! engine and logs a one-line summary of every published frame.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use specan::audio::{CaptureSystem, SampleSource, WavSource};
use specan::cli::Args;
use specan::engine::SpectrumFrame;
use specan::params::analysis_constants::DB_SCALE;
use specan::session::Session;

/// How often the "renderer" polls for a new frame
const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn open_source(args: &Args) -> Result<Box<dyn SampleSource>> {
    Ok(match &args.wav {
        Some(path) => Box::new(
            WavSource::open(path, args.period_frames, args.looping)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(
            CaptureSystem::open(args.device.as_deref(), args.period_frames)
                .context("Failed to open audio input")?,
        ),
    })
}

/// One-line text rendering of a frame: peak point and level per channel
fn summarize(frame: &SpectrumFrame) -> String {
    let channels: Vec<String> = frame
        .channels
        .iter()
        .enumerate()
        .map(|(ch, report)| {
            let peak = match frame.peak(ch) {
                Some((point, level)) => format!(
                    "{:.1} Hz {:.2} dB",
                    frame.point_hz(point),
                    level as f64 / DB_SCALE
                ),
                None => "no data".to_string(),
            };
            let flags = &report.flags;
            format!(
                "ch{} {}{}{}{}",
                ch,
                peak,
                if flags.overload { " OVERLOAD" } else { "" },
                if flags.at_max { " MAX" } else { "" },
                if flags.zero { " ZERO" } else { "" }
            )
        })
        .collect();

    format!(
        "2^{} x{} {}{}{} | {}",
        frame.params.fft_exponent,
        frame.params.roll_factor,
        frame.params.rbw_label(),
        if frame.low_cpu { " [low CPU]" } else { "" },
        if frame.stopped { " [stopped]" } else { "" },
        channels.join(" | ")
    )
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    let source = open_source(&args)?;
    let config = args.engine_config(source.format());
    let session = Session::start(config, source).context("Failed to start session")?;

    info!("specan is running");
    let started = Instant::now();
    let limit = args.duration.map(Duration::from_secs_f32);
    let mut last: Option<Arc<SpectrumFrame>> = None;

    while !session.is_finished() && limit.map_or(true, |limit| started.elapsed() < limit) {
        if let Some(frame) = session.latest_frame() {
            if !last.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &frame)) {
                info!("{}", summarize(&frame));
                last = Some(frame);
            }
        }
        thread::sleep(POLL_INTERVAL);
    }

    let overruns = session.overruns();
    session.shutdown().context("Session ended with an error")?;
    info!("Done ({} bytes overrun)", overruns);
    Ok(())
}
