//! Conversion of raw hardware events into bucketed readings.

use crate::collector::types::{RawSensorEvent, SensorReading};
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Default bucket interval in milliseconds.
pub const DEFAULT_BUCKET_INTERVAL_MS: i64 = 20;

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Source of wall-clock and monotonic time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn wall_clock_ms(&self) -> i64;
    /// Nanoseconds on the same monotonic timeline the hardware stamps events with.
    fn monotonic_ns(&self) -> i64;
}

/// Clock backed by the system time and a process-local monotonic origin.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_clock_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn monotonic_ns(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    wall_ms: AtomicI64,
    monotonic_ns: AtomicI64,
}

impl ManualClock {
    pub fn new(wall_ms: i64, monotonic_ns: i64) -> Self {
        Self {
            wall_ms: AtomicI64::new(wall_ms),
            monotonic_ns: AtomicI64::new(monotonic_ns),
        }
    }

    /// Advance both timelines by the same amount.
    pub fn advance_ms(&self, ms: i64) {
        self.wall_ms.fetch_add(ms, Ordering::SeqCst);
        self.monotonic_ns
            .fetch_add(ms * NANOS_PER_MILLI, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn wall_clock_ms(&self) -> i64 {
        self.wall_ms.load(Ordering::SeqCst)
    }

    fn monotonic_ns(&self) -> i64 {
        self.monotonic_ns.load(Ordering::SeqCst)
    }
}

/// Maps hardware events onto wall-clock buckets.
#[derive(Debug, Clone, Copy)]
pub struct SampleNormalizer {
    interval_ms: i64,
}

impl SampleNormalizer {
    /// Create a normalizer; intervals below 1 ms are raised to 1 ms.
    pub fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
        }
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Floor a wall-clock estimate to its bucket.
    pub fn bucket(&self, wall_clock_ms: i64) -> i64 {
        wall_clock_ms.div_euclid(self.interval_ms) * self.interval_ms
    }

    /// Normalize one event against the given clock.
    pub fn normalize(&self, event: RawSensorEvent, clock: &dyn Clock) -> SensorReading {
        let offset_ms = (event.timestamp_ns - clock.monotonic_ns()).div_euclid(NANOS_PER_MILLI);
        let estimate = clock.wall_clock_ms() + offset_ms;

        SensorReading {
            bucket_timestamp: self.bucket(estimate),
            sensor_type: event.sensor_type,
            values: event.values,
            accuracy: event.accuracy,
        }
    }
}

impl Default for SampleNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_INTERVAL_MS)
    }
}
