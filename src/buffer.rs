//! Bounded single-producer/single-consumer sample buffer.
//!
//! The writer half lives in the real-time input callback: it never blocks,
//! never allocates, and drops whatever does not fit, counting the dropped
//! bytes. The reader half lives in the processing thread, which sleeps on a
//! [`Doorbell`] until the callback rings it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Wake-up signal from the input callback (and control side) to the processing thread
#[derive(Debug, Default)]
pub struct Doorbell {
    rung: Mutex<bool>,
    cvar: Condvar,
}

impl Doorbell {
    /// Signal without waiting. If the processing thread holds the lock it is
    /// busy and will re-check available data before sleeping again, so a
    /// skipped signal loses nothing.
    pub fn try_ring(&self) -> bool {
        match self.rung.try_lock() {
            Ok(mut rung) => {
                *rung = true;
                self.cvar.notify_one();
                true
            }
            Err(_) => false,
        }
    }

    /// Signal from a context that may block (commands, shutdown)
    pub fn ring(&self) {
        let mut rung = self.rung.lock().unwrap_or_else(PoisonError::into_inner);
        *rung = true;
        self.cvar.notify_one();
    }

    /// Sleep until rung, `ready` reports work, or `timeout` passes
    pub fn wait(&self, timeout: Duration, ready: impl Fn() -> bool) {
        let mut rung = self.rung.lock().unwrap_or_else(PoisonError::into_inner);
        if !*rung && !ready() {
            rung = self
                .cvar
                .wait_timeout(rung, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *rung = false;
    }
}

/// Byte-oriented bounded ring shared by one writer and one reader
pub struct BoundedBuffer {
    ring: HeapRb<u8>,
    frame_bytes: usize,
    overruns: Arc<AtomicU64>,
    doorbell: Arc<Doorbell>,
}

impl BoundedBuffer {
    /// Create a buffer of `capacity_bytes`. Writes are truncated to whole
    /// frames of `frame_bytes` so a dropped tail never splits a sample.
    pub fn new(capacity_bytes: usize, frame_bytes: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity_bytes.max(1)),
            frame_bytes: frame_bytes.max(1),
            overruns: Arc::new(AtomicU64::new(0)),
            doorbell: Arc::new(Doorbell::default()),
        }
    }

    /// Split into the callback-side writer and the processing-side reader
    pub fn split(self) -> (SampleWriter, SampleReader) {
        let (producer, consumer) = self.ring.split();
        let writer = SampleWriter {
            producer,
            frame_bytes: self.frame_bytes,
            overruns: Arc::clone(&self.overruns),
            doorbell: Arc::clone(&self.doorbell),
        };
        let reader = SampleReader {
            consumer,
            overruns: self.overruns,
            doorbell: self.doorbell,
            next_report: 1,
        };
        (writer, reader)
    }
}

/// Writer half, owned by the input callback
pub struct SampleWriter {
    producer: HeapProd<u8>,
    frame_bytes: usize,
    overruns: Arc<AtomicU64>,
    doorbell: Arc<Doorbell>,
}

impl SampleWriter {
    /// Copy raw interleaved sample bytes in, dropping what does not fit.
    /// Returns the number of bytes stored.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let room = self.producer.vacant_len().min(bytes.len());
        let room = room - room % self.frame_bytes;
        let written = self.producer.push_slice(&bytes[..room]);

        let dropped = bytes.len() - written;
        if dropped > 0 {
            self.overruns.fetch_add(dropped as u64, Ordering::Relaxed);
        }

        self.doorbell.try_ring();
        written
    }

    /// Copy interleaved `f32` samples in
    pub fn write_samples(&mut self, samples: &[f32]) -> usize {
        self.write(bytemuck::cast_slice(samples))
    }

    /// Total bytes dropped so far
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }
}

/// Reader half, owned by the processing thread
pub struct SampleReader {
    consumer: HeapCons<u8>,
    overruns: Arc<AtomicU64>,
    doorbell: Arc<Doorbell>,
    next_report: u64,
}

impl SampleReader {
    /// Bytes ready to be read
    pub fn available_bytes(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Move up to `dest.len()` bytes out; returns the count moved
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        self.consumer.pop_slice(dest)
    }

    /// Move whole `f32` samples out; returns the count moved
    pub fn read_samples(&mut self, dest: &mut [f32]) -> usize {
        self.read(bytemuck::cast_slice_mut(dest)) / std::mem::size_of::<f32>()
    }

    /// Drop up to `count` bytes without copying them
    pub fn discard(&mut self, count: usize) -> usize {
        self.consumer.skip(count)
    }

    /// Total bytes dropped by the writer so far
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Shared counter, for observers outside the processing thread
    pub fn overrun_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.overruns)
    }

    /// Returns the overrun count each time it passes the next power of two,
    /// so sustained overruns are reported without flooding the log
    pub fn take_overrun_report(&mut self) -> Option<u64> {
        let count = self.overruns();
        if count >= self.next_report {
            while self.next_report <= count {
                self.next_report = self.next_report.saturating_mul(2);
            }
            Some(count)
        } else {
            None
        }
    }

    pub fn doorbell(&self) -> Arc<Doorbell> {
        Arc::clone(&self.doorbell)
    }

    /// Sleep until at least `min_bytes` are available, the doorbell rings,
    /// or `timeout` passes
    pub fn wait_for(&self, min_bytes: usize, timeout: Duration) {
        self.doorbell
            .wait(timeout, || self.consumer.occupied_len() >= min_bytes)
    }

    pub fn capacity(&self) -> usize {
        self.consumer.capacity().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let (mut writer, mut reader) = BoundedBuffer::new(64, 4).split();
        let samples = [0.25f32, -0.5, 1.0];
        assert_eq!(writer.write_samples(&samples), 12);
        assert_eq!(reader.available_bytes(), 12);

        let mut out = [0.0f32; 3];
        assert_eq!(reader.read_samples(&mut out), 3);
        assert_eq!(out, samples);
        assert_eq!(reader.available_bytes(), 0);
        assert_eq!(reader.overruns(), 0);
    }

    #[test]
    fn test_overrun_counts_dropped_bytes() {
        // Room for exactly one chunk of 16 frames, stereo f32
        let chunk_bytes = 16 * 2 * 4;
        let (mut writer, reader) = BoundedBuffer::new(chunk_bytes, 8).split();

        let chunk = vec![0.1f32; 16 * 2];
        assert_eq!(writer.write_samples(&chunk), chunk_bytes);
        assert_eq!(writer.write_samples(&chunk), 0);

        assert_eq!(reader.overruns(), chunk_bytes as u64);
        assert_eq!(reader.available_bytes(), chunk_bytes);
    }

    #[test]
    fn test_partial_write_keeps_whole_frames() {
        let (mut writer, reader) = BoundedBuffer::new(20, 8).split();
        // 24 bytes offered, 20 free, but only 16 form whole frames
        assert_eq!(writer.write(&[0u8; 24]), 16);
        assert_eq!(reader.overruns(), 8);
        assert_eq!(reader.available_bytes(), 16);
    }

    #[test]
    fn test_overrun_report_doubles() {
        let (mut writer, mut reader) = BoundedBuffer::new(4, 4).split();
        assert_eq!(reader.take_overrun_report(), None);

        writer.write(&[0u8; 8]); // 4 dropped
        assert_eq!(reader.take_overrun_report(), Some(4));
        assert_eq!(reader.take_overrun_report(), None);

        writer.write(&[0u8; 4]); // 8 dropped in total
        assert_eq!(reader.take_overrun_report(), Some(8));
    }

    #[test]
    fn test_discard_drops_bytes() {
        let (mut writer, mut reader) = BoundedBuffer::new(32, 4).split();
        writer.write(&[1u8; 16]);
        assert_eq!(reader.discard(12), 12);
        assert_eq!(reader.available_bytes(), 4);
    }

    #[test]
    fn test_wait_returns_when_data_ready() {
        let (mut writer, reader) = BoundedBuffer::new(64, 4).split();
        writer.write(&[0u8; 8]);
        // Data is already there, so this must not sleep for the full timeout
        let start = std::time::Instant::now();
        reader.wait_for(8, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_doorbell_wakes_waiter() {
        let (writer, reader) = BoundedBuffer::new(64, 4).split();
        let doorbell = reader.doorbell();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            doorbell.ring();
            writer
        });
        let start = std::time::Instant::now();
        reader.wait_for(1024, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(4));
        let _ = handle.join();
    }
}
