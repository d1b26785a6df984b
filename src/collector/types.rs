//! Sensor event types for the Motion Sensor Agent.
//!
//! Raw events carry the hardware's monotonic timestamp; normalized readings
//! carry a wall-clock bucket so different sensor streams line up on one row.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of inertial sensor producing an event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorType {
    Accelerometer,
    Gravity,
    Gyroscope,
    /// Any other platform sensor, keyed by its string type
    Other(String),
}

/// Sensors a recording session tries to register.
pub const REQUIRED_SENSORS: [SensorType; 3] = [
    SensorType::Accelerometer,
    SensorType::Gravity,
    SensorType::Gyroscope,
];

impl SensorType {
    /// Platform string type of this sensor.
    pub fn string_type(&self) -> &str {
        match self {
            SensorType::Accelerometer => "android.sensor.accelerometer",
            SensorType::Gravity => "android.sensor.gravity",
            SensorType::Gyroscope => "android.sensor.gyroscope",
            SensorType::Other(name) => name,
        }
    }

    /// Parse a platform string type or a short name (`accelerometer`, `gyro`, ...).
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "android.sensor.accelerometer" | "accelerometer" | "acc" => SensorType::Accelerometer,
            "android.sensor.gravity" | "gravity" | "grav" => SensorType::Gravity,
            "android.sensor.gyroscope" | "gyroscope" | "gyro" => SensorType::Gyroscope,
            _ => SensorType::Other(name.trim().to_string()),
        }
    }

    /// Whether values of this sensor feed the inference window.
    pub fn feeds_inference(&self) -> bool {
        matches!(self, SensorType::Accelerometer | SensorType::Gyroscope)
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorType::Accelerometer => write!(f, "accelerometer"),
            SensorType::Gravity => write!(f, "gravity"),
            SensorType::Gyroscope => write!(f, "gyroscope"),
            SensorType::Other(name) => write!(f, "{name}"),
        }
    }
}

/// An event as delivered by the sensor hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSensorEvent {
    pub sensor_type: SensorType,
    pub values: Vec<f32>,
    pub accuracy: i32,
    /// Monotonic hardware timestamp in nanoseconds
    pub timestamp_ns: i64,
}

impl RawSensorEvent {
    pub fn new(
        sensor_type: SensorType,
        values: Vec<f32>,
        accuracy: i32,
        timestamp_ns: i64,
    ) -> Self {
        Self {
            sensor_type,
            values,
            accuracy,
            timestamp_ns,
        }
    }
}

/// One normalized sample, aligned to a wall-clock bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Milliseconds since epoch, floored to the bucket interval
    pub bucket_timestamp: i64,
    pub sensor_type: SensorType,
    pub values: Vec<f32>,
    pub accuracy: i32,
}

impl SensorReading {
    pub fn new(bucket_timestamp: i64, sensor_type: SensorType, values: Vec<f32>) -> Self {
        Self {
            bucket_timestamp,
            sensor_type,
            values,
            accuracy: 3,
        }
    }
}
