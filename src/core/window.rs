//! Fixed-capacity buffer feeding the activity classifier.
//!
//! Values accumulate until the window is exactly full, or until the next
//! event would not fit. Either way the current contents are flushed before
//! anything else is admitted, so no value is ever dropped or wrapped.

use crate::collector::types::SensorType;
use serde::{Deserialize, Serialize};

/// Default classifier input width in scalar slots.
pub const DEFAULT_WINDOW_CAPACITY: usize = 222;

/// Value used to pad a short window up to the classifier input width.
pub const PAD_VALUE: f32 = 0.0;

/// Window lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowPhase {
    Empty,
    Filling,
    Full,
}

/// Sensor a window slot was filled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotSource {
    Accelerometer,
    Gyroscope,
    /// Admitted without a sensor tag
    Unknown,
    /// Padding after a short flush
    Padding,
}

impl From<&SensorType> for SlotSource {
    fn from(sensor: &SensorType) -> Self {
        match sensor {
            SensorType::Accelerometer => SlotSource::Accelerometer,
            SensorType::Gyroscope => SlotSource::Gyroscope,
            _ => SlotSource::Unknown,
        }
    }
}

/// Contents handed out by a flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlushedWindow {
    /// Exactly `capacity` values, padded when fewer were collected
    pub values: Vec<f32>,
    /// Source of each entry in `values`
    pub sources: Vec<SlotSource>,
    /// Slots that held real samples
    pub filled: usize,
}

impl FlushedWindow {
    pub fn is_padded(&self) -> bool {
        self.filled < self.values.len()
    }

    /// Consecutive xyz triples filled from `source`, in window order.
    pub fn triples(&self, source: SlotSource) -> Vec<[f32; 3]> {
        let mut triples = Vec::new();
        let mut i = 0;
        while i + 3 <= self.filled {
            if self.sources[i..i + 3].iter().all(|s| *s == source) {
                triples.push([self.values[i], self.values[i + 1], self.values[i + 2]]);
                i += 3;
            } else {
                i += 1;
            }
        }
        triples
    }
}

/// Rolling classifier input buffer.
#[derive(Debug, Clone)]
pub struct InferenceWindow {
    buffer: Vec<f32>,
    sources: Vec<SlotSource>,
    capacity: usize,
    fill_index: usize,
    flush_count: u64,
}

impl InferenceWindow {
    /// Create a window; a zero capacity is raised to one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![PAD_VALUE; capacity],
            sources: vec![SlotSource::Padding; capacity],
            capacity,
            fill_index: 0,
            flush_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn fill_index(&self) -> usize {
        self.fill_index
    }

    pub fn is_empty(&self) -> bool {
        self.fill_index == 0
    }

    /// Total flushes since creation.
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    pub fn phase(&self) -> WindowPhase {
        match self.fill_index {
            0 => WindowPhase::Empty,
            n if n == self.capacity => WindowPhase::Full,
            _ => WindowPhase::Filling,
        }
    }

    /// Admit untagged values; see [`InferenceWindow::admit_from`].
    pub fn admit(&mut self, values: &[f32]) -> Vec<FlushedWindow> {
        self.admit_from(SlotSource::Unknown, values)
    }

    /// Admit one event's values, returning every window flushed on the way.
    ///
    /// A non-empty window that cannot take all of `values` is flushed first.
    /// Events longer than the capacity are split into capacity-sized chunks.
    pub fn admit_from(&mut self, source: SlotSource, values: &[f32]) -> Vec<FlushedWindow> {
        let mut flushed = Vec::new();
        let mut rest = values;

        while !rest.is_empty() {
            if self.fill_index > 0 && self.fill_index + rest.len() > self.capacity {
                flushed.extend(self.flush());
            }

            let take = rest.len().min(self.capacity - self.fill_index);
            self.buffer[self.fill_index..self.fill_index + take].copy_from_slice(&rest[..take]);
            self.sources[self.fill_index..self.fill_index + take].fill(source);
            self.fill_index += take;
            rest = &rest[take..];

            if self.fill_index == self.capacity {
                flushed.extend(self.flush());
            }
        }

        flushed
    }

    /// Hand out the current contents and reset; `None` when empty.
    pub fn flush(&mut self) -> Option<FlushedWindow> {
        if self.fill_index == 0 {
            return None;
        }

        let filled = self.fill_index;
        let mut values = self.buffer.clone();
        values[filled..].fill(PAD_VALUE);
        let mut sources = self.sources.clone();
        sources[filled..].fill(SlotSource::Padding);

        self.fill_index = 0;
        self.flush_count += 1;
        Some(FlushedWindow {
            values,
            sources,
            filled,
        })
    }

    /// Drop the current contents without flushing.
    pub fn reset(&mut self) {
        self.fill_index = 0;
    }
}

impl Default for InferenceWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}
