//! Frame-timing telemetry.
//!
//! The `frame-timing` built-in patch wraps the game loop's per-frame method and feeds
//! [`frame_stats`]. Embedders read the process-wide counters with [`FrameStats::snapshot`].

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, OnceLock,
    },
    time::{Duration, Instant},
};

/// Lock-free frame counters.
///
/// Frame durations are measured between consecutive ticks, so the first tick only starts the
/// clock and the frame count is one less than the tick count.
#[derive(Debug)]
pub struct FrameStats {
    frames: AtomicU64,
    total_ns: AtomicU64,
    last_ns: AtomicU64,
    min_ns: AtomicU64,
    max_ns: AtomicU64,
    last_tick: Mutex<Option<Instant>>,
}

/// A point-in-time copy of [`FrameStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSnapshot {
    /// Frames measured
    pub frames: u64,
    /// Duration of the most recent frame
    pub last: Duration,
    /// Shortest frame, zero before the first frame
    pub min: Duration,
    /// Longest frame
    pub max: Duration,
    /// Frames per second over all measured frames, zero before the first frame
    pub average_fps: f64,
}

impl FrameStats {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            total_ns: AtomicU64::new(0),
            last_ns: AtomicU64::new(0),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: AtomicU64::new(0),
            last_tick: Mutex::new(None),
        }
    }

    /// Marks the end of a frame now.
    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    /// Marks the end of a frame at `now`.
    pub fn tick_at(&self, now: Instant) {
        let previous = lock!(self.last_tick).replace(now);
        if let Some(previous) = previous {
            self.record(now.saturating_duration_since(previous));
        }
    }

    /// Records one frame of the given duration.
    pub fn record(&self, frame: Duration) {
        let ns = u64::try_from(frame.as_nanos()).unwrap_or(u64::MAX);
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.total_ns.fetch_add(ns, Ordering::Relaxed);
        self.last_ns.store(ns, Ordering::Relaxed);
        self.min_ns.fetch_min(ns, Ordering::Relaxed);
        self.max_ns.fetch_max(ns, Ordering::Relaxed);
    }

    /// Copies the current counters.
    #[must_use]
    pub fn snapshot(&self) -> FrameSnapshot {
        let frames = self.frames.load(Ordering::Relaxed);
        let total_ns = self.total_ns.load(Ordering::Relaxed);
        let min_ns = self.min_ns.load(Ordering::Relaxed);

        #[allow(clippy::cast_precision_loss)]
        let average_fps = if frames == 0 || total_ns == 0 {
            0.0
        } else {
            frames as f64 / (total_ns as f64 / 1_000_000_000.0)
        };

        FrameSnapshot {
            frames,
            last: Duration::from_nanos(self.last_ns.load(Ordering::Relaxed)),
            min: Duration::from_nanos(if frames == 0 { 0 } else { min_ns }),
            max: Duration::from_nanos(self.max_ns.load(Ordering::Relaxed)),
            average_fps,
        }
    }

    /// Clears all counters.
    pub fn reset(&self) {
        *lock!(self.last_tick) = None;
        self.frames.store(0, Ordering::Relaxed);
        self.total_ns.store(0, Ordering::Relaxed);
        self.last_ns.store(0, Ordering::Relaxed);
        self.min_ns.store(u64::MAX, Ordering::Relaxed);
        self.max_ns.store(0, Ordering::Relaxed);
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide frame counters.
pub fn frame_stats() -> &'static FrameStats {
    static STATS: OnceLock<FrameStats> = OnceLock::new();
    STATS.get_or_init(FrameStats::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_starts_clock() {
        let stats = FrameStats::new();
        let start = Instant::now();
        stats.tick_at(start);
        assert_eq!(stats.snapshot().frames, 0);

        stats.tick_at(start + Duration::from_millis(16));
        stats.tick_at(start + Duration::from_millis(48));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.min, Duration::from_millis(16));
        assert_eq!(snapshot.max, Duration::from_millis(32));
        assert_eq!(snapshot.last, Duration::from_millis(32));
        assert!((snapshot.average_fps - 41.666).abs() < 0.01);
    }

    #[test]
    fn test_empty_and_reset() {
        let stats = FrameStats::new();
        let empty = stats.snapshot();
        assert_eq!(empty.min, Duration::ZERO);
        assert_eq!(empty.average_fps, 0.0);

        stats.record(Duration::from_millis(10));
        stats.reset();
        assert_eq!(stats.snapshot(), empty);
    }
}
