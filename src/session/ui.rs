//! UI collaborator boundary.
//!
//! Neither side renders anything itself; they push plain values into a
//! [`UiSink`]. [`UiState`] keeps the latest of each so the CLI and the
//! control server can show them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Receives display updates from the session layer.
pub trait UiSink: Send + Sync {
    /// Number of sensors the wearable reported.
    fn sensor_count(&self, count: u32);

    /// Latest prediction text, as received.
    fn prediction(&self, text: &str);

    /// One-line status message.
    fn status(&self, text: &str);

    /// A session file was stored locally.
    fn file_received(&self, path: &Path);
}

/// Everything currently on screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiSnapshot {
    pub sensor_count: Option<u32>,
    pub prediction: Option<String>,
    pub status: String,
    pub received_files: Vec<PathBuf>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Shared, cloneable [`UiSink`] that remembers the latest values.
#[derive(Debug, Clone, Default)]
pub struct UiState {
    inner: Arc<RwLock<UiSnapshot>>,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UiSnapshot {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut UiSnapshot)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
        guard.updated_at = Some(Utc::now());
    }
}

impl UiSink for UiState {
    fn sensor_count(&self, count: u32) {
        tracing::info!("Available sensors on wearable: {count}");
        self.update(|ui| ui.sensor_count = Some(count));
    }

    fn prediction(&self, text: &str) {
        tracing::debug!("Prediction: {text}");
        self.update(|ui| ui.prediction = Some(text.to_string()));
    }

    fn status(&self, text: &str) {
        tracing::info!("Status: {text}");
        self.update(|ui| ui.status = text.to_string());
    }

    fn file_received(&self, path: &Path) {
        tracing::info!("Session file stored at {}", path.display());
        self.update(|ui| ui.received_files.push(path.to_path_buf()));
    }
}
