//! Collection transparency log.
//!
//! Counts what the agent recorded and transmitted during a session so the
//! user can see exactly what left the device.

use crate::collector::types::SensorType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Transparency statistics for the current process.
#[derive(Debug)]
pub struct TransparencyLog {
    accelerometer_readings: AtomicU64,
    gravity_readings: AtomicU64,
    gyroscope_readings: AtomicU64,
    other_readings: AtomicU64,
    /// Windows handed to the classifier
    windows_flushed: AtomicU64,
    /// Flushes that produced no prediction
    inference_failures: AtomicU64,
    predictions_sent: AtomicU64,
    /// Channel exchanges abandoned after a transport error
    exchanges_failed: AtomicU64,
    files_sent: AtomicU64,
    files_received: AtomicU64,
    uploads_completed: AtomicU64,
    uploads_failed: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            accelerometer_readings: AtomicU64::new(0),
            gravity_readings: AtomicU64::new(0),
            gyroscope_readings: AtomicU64::new(0),
            other_readings: AtomicU64::new(0),
            windows_flushed: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            predictions_sent: AtomicU64::new(0),
            exchanges_failed: AtomicU64::new(0),
            files_sent: AtomicU64::new(0),
            files_received: AtomicU64::new(0),
            uploads_completed: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that accumulates on top of previously saved totals.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_reading(&self, sensor: &SensorType) {
        let counter = match sensor {
            SensorType::Accelerometer => &self.accelerometer_readings,
            SensorType::Gravity => &self.gravity_readings,
            SensorType::Gyroscope => &self.gyroscope_readings,
            SensorType::Other(_) => &self.other_readings,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_flushed(&self) {
        self.windows_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction_sent(&self) {
        self.predictions_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exchange_failed(&self) {
        self.exchanges_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_sent(&self) {
        self.files_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_received(&self) {
        self.files_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self, success: bool) {
        if success {
            self.uploads_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.uploads_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            accelerometer_readings: self.accelerometer_readings.load(Ordering::Relaxed),
            gravity_readings: self.gravity_readings.load(Ordering::Relaxed),
            gyroscope_readings: self.gyroscope_readings.load(Ordering::Relaxed),
            other_readings: self.other_readings.load(Ordering::Relaxed),
            windows_flushed: self.windows_flushed.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            predictions_sent: self.predictions_sent.load(Ordering::Relaxed),
            exchanges_failed: self.exchanges_failed.load(Ordering::Relaxed),
            files_sent: self.files_sent.load(Ordering::Relaxed),
            files_received: self.files_received.load(Ordering::Relaxed),
            uploads_completed: self.uploads_completed.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Accelerometer readings: {}\n\
             - Gravity readings: {}\n\
             - Gyroscope readings: {}\n\
             - Windows classified: {} ({} without prediction)\n\
             - Predictions sent: {}\n\
             - Failed exchanges: {}\n\
             - Files sent / received: {} / {}\n\
             - Uploads completed / failed: {} / {}\n\
             - Session duration: {} seconds\n\
             \n\
             Data Handling:\n\
             - Only inertial sensor values are recorded\n\
             - Raw readings are discarded after export",
            stats.accelerometer_readings,
            stats.gravity_readings,
            stats.gyroscope_readings,
            stats.windows_flushed,
            stats.inference_failures,
            stats.predictions_sent,
            stats.exchanges_failed,
            stats.files_sent,
            stats.files_received,
            stats.uploads_completed,
            stats.uploads_failed,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let persisted = PersistedStats {
                stats: self.stats(),
                last_updated: Utc::now(),
            };
            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;
                let s = persisted.stats;

                self.accelerometer_readings
                    .store(s.accelerometer_readings, Ordering::Relaxed);
                self.gravity_readings.store(s.gravity_readings, Ordering::Relaxed);
                self.gyroscope_readings
                    .store(s.gyroscope_readings, Ordering::Relaxed);
                self.other_readings.store(s.other_readings, Ordering::Relaxed);
                self.windows_flushed.store(s.windows_flushed, Ordering::Relaxed);
                self.inference_failures
                    .store(s.inference_failures, Ordering::Relaxed);
                self.predictions_sent.store(s.predictions_sent, Ordering::Relaxed);
                self.exchanges_failed.store(s.exchanges_failed, Ordering::Relaxed);
                self.files_sent.store(s.files_sent, Ordering::Relaxed);
                self.files_received.store(s.files_received, Ordering::Relaxed);
                self.uploads_completed
                    .store(s.uploads_completed, Ordering::Relaxed);
                self.uploads_failed.store(s.uploads_failed, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.accelerometer_readings,
            &self.gravity_readings,
            &self.gyroscope_readings,
            &self.other_readings,
            &self.windows_flushed,
            &self.inference_failures,
            &self.predictions_sent,
            &self.exchanges_failed,
            &self.files_sent,
            &self.files_received,
            &self.uploads_completed,
            &self.uploads_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub accelerometer_readings: u64,
    pub gravity_readings: u64,
    pub gyroscope_readings: u64,
    pub other_readings: u64,
    pub windows_flushed: u64,
    pub inference_failures: u64,
    pub predictions_sent: u64,
    pub exchanges_failed: u64,
    pub files_sent: u64,
    pub files_received: u64,
    pub uploads_completed: u64,
    pub uploads_failed: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl TransparencyStats {
    pub fn total_readings(&self) -> u64 {
        self.accelerometer_readings
            + self.gravity_readings
            + self.gyroscope_readings
            + self.other_readings
    }
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(flatten)]
    stats: TransparencyStats,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_counters_by_type() {
        let log = TransparencyLog::new();

        log.record_reading(&SensorType::Accelerometer);
        log.record_reading(&SensorType::Accelerometer);
        log.record_reading(&SensorType::Gyroscope);
        log.record_reading(&SensorType::Other("light".into()));

        let stats = log.stats();
        assert_eq!(stats.accelerometer_readings, 2);
        assert_eq!(stats.gyroscope_readings, 1);
        assert_eq!(stats.gravity_readings, 0);
        assert_eq!(stats.total_readings(), 4);
    }

    #[test]
    fn test_upload_outcomes() {
        let log = TransparencyLog::new();
        log.record_upload(true);
        log.record_upload(false);
        log.record_upload(false);

        let stats = log.stats();
        assert_eq!(stats.uploads_completed, 1);
        assert_eq!(stats.uploads_failed, 2);
    }

    #[test]
    fn test_transparency_log_reset() {
        let log = TransparencyLog::new();
        log.record_window_flushed();
        log.record_prediction_sent();
        log.record_exchange_failed();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.windows_flushed, 0);
        assert_eq!(stats.predictions_sent, 0);
        assert_eq!(stats.exchanges_failed, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_file_sent();
        log.record_reading(&SensorType::Gravity);
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path);
        let stats = reloaded.stats();
        assert_eq!(stats.files_sent, 1);
        assert_eq!(stats.gravity_readings, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = TransparencyLog::new().summary();
        assert!(summary.contains("Accelerometer readings"));
        assert!(summary.contains("Predictions sent"));
        assert!(summary.contains("Data Handling"));
    }
}
