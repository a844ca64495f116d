//! Bounded-cadence progress accounting.
//!
//! Progress events are throttled to one per `max(2 * batch_size,
//! declared_total / 100, 1)` frames so the telemetry stream stays small on
//! long inputs, with one unconditional terminal event. The declared total is
//! container metadata and may be wrong; the terminal event therefore reports
//! the actual processed count as the total, at 100%.

use std::time::Instant;

use crate::events::Event;

pub struct ProgressTracker {
    declared_total: u64,
    interval: u64,
    processed: u64,
    last_reported: u64,
    last_percent: u32,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(declared_total: u64, batch_size: usize) -> Self {
        let interval = (2 * batch_size as u64).max(declared_total / 100).max(1);
        Self {
            declared_total,
            interval,
            processed: 0,
            last_reported: 0,
            last_percent: 0,
            started: Instant::now(),
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Records `frames` newly processed frames; returns a progress event when
    /// the cadence interval has elapsed since the last report.
    pub fn advance(&mut self, frames: u64) -> Option<Event> {
        self.processed += frames;
        if self.processed - self.last_reported < self.interval {
            return None;
        }
        self.last_reported = self.processed;
        Some(self.snapshot(self.declared_total, false))
    }

    /// The unconditional terminal event: 100%, with the actual processed
    /// count as the total regardless of what the container declared.
    pub fn finish(&mut self) -> Event {
        self.last_reported = self.processed;
        self.snapshot(self.processed, true)
    }

    fn snapshot(&mut self, total: u64, terminal: bool) -> Event {
        let percent = if terminal {
            100
        } else if total == 0 {
            0
        } else {
            (((self.processed * 100) as f64 / total as f64).round() as u32).min(100)
        };
        // Never let a corrected total walk the percentage backwards.
        let percent = percent.max(self.last_percent);
        self.last_percent = percent;

        let elapsed = self.started.elapsed().as_secs_f64();
        let fps_speed = if elapsed > 0.0 {
            (self.processed as f64 / elapsed * 10.0).round() / 10.0
        } else {
            0.0
        };

        Event::Progress {
            current_frame: self.processed,
            total_frames: total,
            progress: percent,
            fps_speed,
        }
    }
}
