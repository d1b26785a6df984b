//! In-process sensor hub.
//!
//! Stands in for the platform sensor manager: availability is configured up
//! front, events are injected with [`VirtualSensorHub::emit`] or produced by a
//! background signal generator.

use crate::collector::normalizer::Clock;
use crate::collector::types::{RawSensorEvent, SensorType};
use crate::collector::{CollectorError, SensorHub};
use crossbeam_channel::{Sender, TrySendError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Sensor hub with configurable hardware availability.
pub struct VirtualSensorHub {
    available: Vec<SensorType>,
    listeners: Mutex<BTreeMap<SensorType, Sender<RawSensorEvent>>>,
    clock: Arc<dyn Clock>,
    registrations: AtomicU64,
    dropped: AtomicU64,
    generator_running: Arc<AtomicBool>,
}

impl VirtualSensorHub {
    /// Create a hub reporting `available` as present hardware.
    pub fn new(available: impl IntoIterator<Item = SensorType>, clock: Arc<dyn Clock>) -> Self {
        let mut available: Vec<SensorType> = available.into_iter().collect();
        available.sort();
        available.dedup();

        Self {
            available,
            listeners: Mutex::new(BTreeMap::new()),
            clock,
            registrations: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            generator_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stamp and deliver an event; returns whether a listener accepted it.
    pub fn emit(&self, sensor: SensorType, values: Vec<f32>, accuracy: i32) -> bool {
        let timestamp_ns = self.clock.monotonic_ns();
        self.emit_event(RawSensorEvent::new(sensor, values, accuracy, timestamp_ns))
    }

    /// Deliver a pre-stamped event.
    pub fn emit_event(&self, event: RawSensorEvent) -> bool {
        let listeners = self.lock_listeners();
        let Some(sender) = listeners.get(&event.sensor_type) else {
            return false;
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Sensor queue full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Total number of successful registrations over the hub's lifetime.
    pub fn registration_count(&self) -> u64 {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Events dropped because the capture queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Start a background thread emitting a synthetic motion signal for every
    /// registered sensor once per `period`.
    pub fn start_generator(
        self: &Arc<Self>,
        period: Duration,
    ) -> Result<GeneratorHandle, CollectorError> {
        if self.generator_running.swap(true, Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        let hub = Arc::clone(self);
        let running = Arc::clone(&self.generator_running);
        let thread_running = Arc::clone(&running);

        let handle = thread::spawn(move || {
            let mut tick: u64 = 0;
            while thread_running.load(Ordering::SeqCst) {
                let t = tick as f32 * period.as_secs_f32();
                for sensor in hub.registered() {
                    let values = synthetic_values(&sensor, t);
                    hub.emit(sensor, values, 3);
                }
                tick = tick.wrapping_add(1);
                thread::sleep(period);
            }
        });

        Ok(GeneratorHandle {
            running,
            thread_handle: Some(handle),
        })
    }

    fn lock_listeners(&self) -> MutexGuard<'_, BTreeMap<SensorType, Sender<RawSensorEvent>>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SensorHub for VirtualSensorHub {
    fn available_sensors(&self) -> Vec<SensorType> {
        self.available.clone()
    }

    fn register(
        &self,
        sensor: &SensorType,
        sender: Sender<RawSensorEvent>,
    ) -> Result<(), CollectorError> {
        if !self.available.contains(sensor) {
            return Err(CollectorError::SensorUnavailable(sensor.clone()));
        }

        let mut listeners = self.lock_listeners();
        if listeners.contains_key(sensor) {
            return Err(CollectorError::AlreadyRegistered(sensor.clone()));
        }
        listeners.insert(sensor.clone(), sender);
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unregister_all(&self) {
        self.lock_listeners().clear();
    }

    fn registered(&self) -> Vec<SensorType> {
        self.lock_listeners().keys().cloned().collect()
    }
}

/// Handle to a running signal generator; stops it on drop.
pub struct GeneratorHandle {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl GeneratorHandle {
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GeneratorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Walking-like motion: a 2 Hz stride on top of gravity.
fn synthetic_values(sensor: &SensorType, t: f32) -> Vec<f32> {
    let stride = (t * 2.0 * std::f32::consts::TAU).sin();
    match sensor {
        SensorType::Accelerometer => vec![1.2 * stride, 9.81 + 2.5 * stride.abs(), 0.4 * stride],
        SensorType::Gravity => vec![0.0, 9.81, 0.0],
        SensorType::Gyroscope => vec![0.3 * stride, 0.05, -0.2 * stride],
        SensorType::Other(_) => vec![stride],
    }
}
