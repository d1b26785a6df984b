//! Session reading buffer and its CSV export.
//!
//! Readings are kept in arrival order. The export merges them by bucket so
//! each row carries one accelerometer, gravity and gyroscope triple.

use crate::collector::types::{SensorReading, SensorType};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Header row of the exported CSV.
pub const CSV_HEADER: &str =
    "Timestamp,uacc_x,uacc_y,uacc_z,grav_y,grav_x,grav_z,gyr_x,gyr_y,gyr_z";

/// Calibration factor applied to accelerometer components on export.
pub const ACCELEROMETER_SCALE: f32 = -0.1;

/// Components exported per sensor type.
const AXES: usize = 3;

/// Append-only buffer of normalized readings for one session.
#[derive(Debug, Clone, Default)]
pub struct ReadingStore {
    readings: Vec<SensorReading>,
}

/// First reading of each exported sensor type within one bucket.
#[derive(Debug, Default)]
struct BucketRow<'a> {
    accelerometer: Option<&'a [f32]>,
    gravity: Option<&'a [f32]>,
    gyroscope: Option<&'a [f32]>,
}

impl<'a> BucketRow<'a> {
    fn slot(&mut self, sensor: &SensorType) -> Option<&mut Option<&'a [f32]>> {
        match sensor {
            SensorType::Accelerometer => Some(&mut self.accelerometer),
            SensorType::Gravity => Some(&mut self.gravity),
            SensorType::Gyroscope => Some(&mut self.gyroscope),
            SensorType::Other(_) => None,
        }
    }
}

impl ReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, reading: SensorReading) {
        self.readings.push(reading);
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn readings(&self) -> &[SensorReading] {
        &self.readings
    }

    /// Number of distinct buckets, i.e. data rows of the export.
    pub fn bucket_count(&self) -> usize {
        self.group_by_bucket().len()
    }

    /// Render the merged CSV export.
    pub fn export(&self) -> Vec<u8> {
        let rows = self.group_by_bucket();
        let mut output = String::with_capacity(CSV_HEADER.len() + 1 + rows.len() * 64);
        output.push_str(CSV_HEADER);
        output.push('\n');

        for (bucket, row) in &rows {
            let _ = write!(output, "{bucket}");
            write_triple(&mut output, row.accelerometer, ACCELEROMETER_SCALE);
            write_triple(&mut output, row.gravity, 1.0);
            write_triple(&mut output, row.gyroscope, 1.0);
            output.push('\n');
        }

        output.into_bytes()
    }

    /// Write the export into `dir` under a fresh file name.
    pub fn export_to_file(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("recording_{}.csv", Uuid::new_v4().simple()));
        std::fs::write(&path, self.export())?;
        Ok(path)
    }

    fn group_by_bucket(&self) -> BTreeMap<i64, BucketRow<'_>> {
        let mut rows: BTreeMap<i64, BucketRow<'_>> = BTreeMap::new();
        for reading in &self.readings {
            let row = rows.entry(reading.bucket_timestamp).or_default();
            if let Some(slot) = row.slot(&reading.sensor_type) {
                // First reading per type and bucket wins.
                if slot.is_none() {
                    *slot = Some(&reading.values);
                }
            }
        }
        rows
    }
}

fn write_triple(output: &mut String, values: Option<&[f32]>, scale: f32) {
    for axis in 0..AXES {
        output.push(',');
        match values.and_then(|v| v.get(axis)) {
            Some(&v) if v.is_finite() => {
                let _ = write!(output, "{}", v * scale);
            }
            _ => output.push_str("NaN"),
        }
    }
}
