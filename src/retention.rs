//! Multi-generation retention ring ("phosphor" memory).
//!
//! Generations are reference-counted snapshots. The processing thread writes
//! the current one in place when no reader holds it and copies it otherwise,
//! so a renderer holding a published frame never sees a half-written
//! generation.

use std::sync::Arc;

use crate::params::analysis_constants::MAX_GENERATIONS;

/// One stored level in hundredths of a dB; `None` means "no data here"
pub type Level = Option<i16>;

/// Reduced spectrum of every channel: `[point][channel] -> Level`
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    points: usize,
    channels: usize,
    levels: Vec<Level>,
}

impl Generation {
    pub fn new(points: usize, channels: usize) -> Self {
        Self {
            points,
            channels,
            levels: vec![None; points * channels],
        }
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn get(&self, point: usize, channel: usize) -> Level {
        self.levels[point * self.channels + channel]
    }

    pub fn set(&mut self, point: usize, channel: usize, level: Level) {
        self.levels[point * self.channels + channel] = level;
    }

    /// Levels of every channel at one point
    pub fn column(&self, point: usize) -> &[Level] {
        &self.levels[point * self.channels..(point + 1) * self.channels]
    }

    /// Levels of one channel across all points
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = Level> + '_ {
        self.levels
            .iter()
            .skip(channel)
            .step_by(self.channels)
            .copied()
    }

    /// Mark every point of one channel as "no data"
    pub fn clear_channel(&mut self, channel: usize) {
        for point in 0..self.points {
            self.set(point, channel, None);
        }
    }

    pub fn clear(&mut self) {
        self.levels.fill(None);
    }
}

/// Ring of up to MAX_GENERATIONS generations
#[derive(Debug)]
pub struct RetentionBuffer {
    slots: Vec<Arc<Generation>>,
    current: usize,
    previous: Option<usize>,
    valid: usize,
}

impl RetentionBuffer {
    pub fn new(points: usize, channels: usize) -> Self {
        let blank = Arc::new(Generation::new(points, channels));
        Self {
            slots: vec![blank; MAX_GENERATIONS],
            current: 0,
            previous: None,
            valid: 1,
        }
    }

    /// Move the write position to the next (oldest) slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % MAX_GENERATIONS;
    }

    /// Advance, carrying the current generation into the new slot
    pub fn advance_copy(&mut self) {
        let carried = Arc::clone(&self.slots[self.current]);
        self.advance();
        self.slots[self.current] = carried;
    }

    /// Grow the valid count by one, up to `limit` (and never past the ring)
    pub fn grow(&mut self, limit: usize) {
        self.valid = (self.valid + 1).min(limit.clamp(1, MAX_GENERATIONS));
    }

    /// Mutable access to the generation being written
    pub fn current_mut(&mut self) -> &mut Generation {
        Arc::make_mut(&mut self.slots[self.current])
    }

    pub fn current(&self) -> &Arc<Generation> {
        &self.slots[self.current]
    }

    /// Last committed generation, for the video filter
    pub fn previous(&self) -> Option<Arc<Generation>> {
        self.previous.map(|i| Arc::clone(&self.slots[i]))
    }

    /// Mark the current generation as complete
    pub fn commit(&mut self) {
        self.previous = Some(self.current);
    }

    /// Drop all but the current generation and forget the previous frame
    pub fn reset(&mut self) {
        self.valid = 1;
        self.previous = None;
    }

    pub fn valid(&self) -> usize {
        self.valid
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Valid generations, newest first
    pub fn generations(&self) -> Vec<Arc<Generation>> {
        (0..self.valid)
            .map(|age| {
                let slot = (self.current + MAX_GENERATIONS - age) % MAX_GENERATIONS;
                Arc::clone(&self.slots[slot])
            })
            .collect()
    }
}
