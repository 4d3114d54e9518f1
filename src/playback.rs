//! Gapless playback scheduling
//!
//! Remote speech arrives as discrete chunks with network jitter. Each chunk is
//! booked on the output device's clock at `max(cursor, now)` and the cursor is
//! advanced by the chunk's duration, so consecutive chunks play back-to-back.

use crate::codec::{decode_remote_chunk, DOWNLINK_SAMPLE_RATE};
use crate::error::MediaError;
use tracing::{debug, warn};

/// An output device with its own clock.
///
/// Times are seconds on the device clock. The clock only advances while the
/// device is running.
pub trait AudioSink: Send {
    fn current_time(&self) -> f64;
    fn is_running(&self) -> bool;
    fn resume(&self) -> Result<(), MediaError>;
    fn suspend(&self);
    /// Book mono samples at the sink rate to start at `start_time`.
    fn schedule(&self, start_time: f64, samples: Vec<f32>);
    /// Drop everything booked that has not reached the device yet.
    fn flush(&self);
    fn close(&self);
}

/// Where a chunk landed on the device clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub start: f64,
    pub duration: f64,
}

/// Books remote audio chunks back-to-back on an [`AudioSink`]
pub struct PlaybackScheduler {
    sink: Box<dyn AudioSink>,
    sample_rate: u32,
    /// Start time of the next chunk
    next_play_time: f64,
}

impl PlaybackScheduler {
    /// The sink stays suspended until the first chunk arrives.
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            sample_rate: DOWNLINK_SAMPLE_RATE,
            next_play_time: 0.0,
        }
    }

    pub fn next_play_time(&self) -> f64 {
        self.next_play_time
    }

    /// Book one chunk of little-endian PCM16. Never waits.
    pub fn enqueue(&mut self, chunk: &[u8]) -> Option<ScheduledChunk> {
        if !self.sink.is_running() {
            if let Err(e) = self.sink.resume() {
                warn!("Failed to resume playback device: {}", e);
            }
        }

        let samples = decode_remote_chunk(chunk);
        if samples.is_empty() {
            return None;
        }

        let now = self.sink.current_time();
        if self.next_play_time < now {
            self.next_play_time = now;
        }

        let start = self.next_play_time;
        let duration = samples.len() as f64 / self.sample_rate as f64;
        self.sink.schedule(start, samples);
        self.next_play_time += duration;

        debug!("Booked {:.3}s of speech at {:.3}s", duration, start);
        Some(ScheduledChunk { start, duration })
    }

    /// Hard stop. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.next_play_time = 0.0;
        self.sink.flush();
        if self.sink.is_running() {
            self.sink.suspend();
        }
    }

    pub fn close(&mut self) {
        self.stop();
        self.sink.close();
    }
}
