//! Motion Sensor Agent - wearable activity recording with a paired companion.
//!
//! The wearable samples inertial sensors, classifies a sliding window of
//! motion on-device and streams predictions to a companion device. When the
//! session stops, every reading is exported as one time-aligned CSV and
//! shipped to the companion, which stores it and optionally uploads it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── wearable ────────────────────────────┐
//! │  SensorHub ──▶ Normalizer ──▶ ReadingStore ──────────┐           │
//! │                    │                                 │ export    │
//! │                    ▼                                 ▼           │
//! │             InferenceWindow ──▶ Classifier ──▶ SessionCoordinator│
//! └──────────────────────────────────────────────────────┬───────────┘
//!                                        channels         │
//! ┌──────────────────────────── companion ───────────────▼───────────┐
//! │   RemoteListener ──▶ UiSink          RemoteListener ──▶ Upload   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use motion_sensor_agent::collector::{SystemClock, VirtualSensorHub};
//! use motion_sensor_agent::session::{MemoryNetwork, SessionCoordinator, UiState};
//! use motion_sensor_agent::{transparency, Config};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let config = Config::default();
//! let network = MemoryNetwork::new();
//! let (watch, _inbox) = network.join("watch", "Watch", &[config.capability.as_str()]);
//! let clock = Arc::new(SystemClock::new());
//! let hub = Arc::new(VirtualSensorHub::new(config.sensors.sensors(), clock.clone()));
//!
//! let coordinator = SessionCoordinator::from_config(
//!     &config,
//!     Arc::new(watch),
//!     hub,
//!     Arc::new(UiState::new()),
//!     clock,
//!     transparency::create_shared_log(),
//! );
//! let _report = coordinator.start_session(Some("phone")).await;
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod session;
pub mod transparency;
pub mod upload;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{CollectorError, RawSensorEvent, SensorHub, SensorReading, SensorType};
pub use config::{Config, ConfigError, SensorSelection, UploadSettings};
pub use core::{CapturePipeline, Classifier, InferenceWindow, Prediction, ReadingStore};
pub use session::{
    ChannelTransport, CompanionController, RemoteListener, SessionCoordinator, SessionError,
    SessionPhase, UiSink, WearableService,
};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};
pub use upload::{UploadError, UploadSink};

#[cfg(feature = "upload")]
pub use upload::HttpUploader;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data handling declaration shown to users.
pub const DATA_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║            MOTION SENSOR AGENT - DATA DECLARATION                ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent records wearable motion data for activity research.  ║
║                                                                  ║
║  ✓ WHAT WE RECORD:                                               ║
║    • Accelerometer, gravity and gyroscope values                 ║
║    • When each sample was taken (20 ms resolution)               ║
║    • The activity predicted from the last window of motion       ║
║                                                                  ║
║  ✗ WHAT WE NEVER RECORD:                                         ║
║    • Location or any other sensor                                ║
║    • Anything outside an explicitly started session              ║
║                                                                  ║
║  Readings leave the watch only for the paired companion, as one  ║
║  CSV file per session. Upload happens only when enabled.         ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    motion-sensor status                                          ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
