//! Sensor collection for the Motion Sensor Agent.
//!
//! The platform sensor manager is reached through the [`SensorHub`] trait.
//! Listeners are crossbeam senders; whoever owns the receiving end is the
//! single writer for everything derived from the events.

pub mod normalizer;
pub mod types;
pub mod virtual_hub;

use crossbeam_channel::Sender;

// Re-export commonly used types
pub use normalizer::{Clock, ManualClock, SampleNormalizer, SystemClock};
pub use types::{RawSensorEvent, SensorReading, SensorType, REQUIRED_SENSORS};
pub use virtual_hub::{GeneratorHandle, VirtualSensorHub};

/// Capacity of the queue between sensor callbacks and the capture path.
pub const EVENT_QUEUE_CAPACITY: usize = 10_000;

/// Platform sensor manager boundary.
pub trait SensorHub: Send + Sync {
    /// Every sensor the hardware reports, required or not.
    fn available_sensors(&self) -> Vec<SensorType>;

    /// Deliver events of `sensor` into `sender` until unregistered.
    fn register(
        &self,
        sensor: &SensorType,
        sender: Sender<RawSensorEvent>,
    ) -> Result<(), CollectorError>;

    /// Drop every registered listener.
    fn unregister_all(&self);

    /// Sensors that currently have a listener.
    fn registered(&self) -> Vec<SensorType>;
}

/// Errors that can occur during sensor collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    SensorUnavailable(SensorType),
    AlreadyRegistered(SensorType),
    AlreadyRunning,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::SensorUnavailable(sensor) => {
                write!(f, "Sensor not available: {sensor}")
            }
            CollectorError::AlreadyRegistered(sensor) => {
                write!(f, "Listener already registered for {sensor}")
            }
            CollectorError::AlreadyRunning => write!(f, "Signal generator is already running"),
        }
    }
}

impl std::error::Error for CollectorError {}
