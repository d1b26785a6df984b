//! Configuration for the Motion Sensor Agent.

use crate::collector::types::SensorType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the upload API key.
pub const API_KEY_ENV: &str = "MOTION_SENSOR_API_KEY";

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Classifier input width in scalar slots
    pub window_capacity: usize,

    /// Timestamp bucket width
    pub bucket_interval_ms: i64,

    /// How often the latest prediction is pushed to the companion
    #[serde(with = "duration_ms")]
    pub prediction_period: Duration,

    /// Sampling period of the simulated sensors
    #[serde(with = "duration_ms")]
    pub sample_period: Duration,

    /// Capability advertised by wearable nodes
    pub capability: String,

    /// Which sensors the simulated hardware reports
    pub sensors: SensorSelection,

    /// Where the wearable writes exported session files
    pub export_path: PathBuf,

    /// Where the companion stores received session files
    pub receive_path: PathBuf,

    /// Path for storing state and transparency logs
    pub data_path: PathBuf,

    /// IANA zone used to name received files
    pub timezone: String,

    pub upload: UploadSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motion-sensor-agent");

        Self {
            window_capacity: 222,
            bucket_interval_ms: 20,
            prediction_period: Duration::from_secs(1),
            sample_period: Duration::from_millis(20),
            capability: "AGL_MOZGASMERES".to_string(),
            sensors: SensorSelection::default(),
            export_path: data_dir.join("exports"),
            receive_path: data_dir.join("received"),
            data_path: data_dir,
            timezone: "UTC".to_string(),
            upload: UploadSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motion-sensor-agent")
            .join("config.json")
    }

    /// Path of the persisted transparency stats.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [&self.export_path, &self.receive_path, &self.data_path] {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Reject values the session layer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 {
            return Err(ConfigError::Invalid("window_capacity must be positive".into()));
        }
        if self.bucket_interval_ms <= 0 {
            return Err(ConfigError::Invalid("bucket_interval_ms must be positive".into()));
        }
        if self.prediction_period.is_zero() || self.sample_period.is_zero() {
            return Err(ConfigError::Invalid("periods must be non-zero".into()));
        }
        self.tz()?;
        Ok(())
    }

    /// Parsed [`Config::timezone`].
    pub fn tz(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", self.timezone)))
    }
}

/// Upload of received session files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://studio.edgeimpulse.com/v1".to_string(),
            api_key: None,
        }
    }
}

impl UploadSettings {
    /// API key from the environment, falling back to the config file.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_key.clone())
    }
}

/// Which motion sensors the hardware offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSelection {
    pub accelerometer: bool,
    pub gravity: bool,
    pub gyroscope: bool,
}

impl Default for SensorSelection {
    fn default() -> Self {
        Self {
            accelerometer: true,
            gravity: true,
            gyroscope: true,
        }
    }
}

impl SensorSelection {
    /// Parse a comma-separated list such as `acc,gyro` or `all`.
    pub fn from_csv(s: &str) -> Self {
        let names: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let has = |aliases: &[&str]| {
            names
                .iter()
                .any(|n| n == "all" || aliases.contains(&n.as_str()))
        };

        Self {
            accelerometer: has(&["accelerometer", "acc"]),
            gravity: has(&["gravity", "grav"]),
            gyroscope: has(&["gyroscope", "gyro"]),
        }
    }

    /// Check if at least one sensor is selected.
    pub fn any_enabled(&self) -> bool {
        self.accelerometer || self.gravity || self.gyroscope
    }

    pub fn sensors(&self) -> Vec<SensorType> {
        let mut sensors = Vec::new();
        if self.accelerometer {
            sensors.push(SensorType::Accelerometer);
        }
        if self.gravity {
            sensors.push(SensorType::Gravity);
        }
        if self.gyroscope {
            sensors.push(SensorType::Gyroscope);
        }
        sensors
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
