//! Sensor-callback path of a recording session.
//!
//! One `CapturePipeline` owns the reading store and the inference window.
//! It runs on a single capture thread, so neither needs synchronization;
//! the only value it shares is the latest prediction.

use crate::collector::normalizer::{Clock, SampleNormalizer};
use crate::collector::types::RawSensorEvent;
use crate::core::classifier::{ClassifierAdapter, PredictionCell};
use crate::core::store::ReadingStore;
use crate::core::window::{FlushedWindow, InferenceWindow, SlotSource};
use crate::transparency::SharedTransparencyLog;
use crossbeam_channel::Receiver;
use std::sync::Arc;

pub struct CapturePipeline {
    normalizer: SampleNormalizer,
    clock: Arc<dyn Clock>,
    store: ReadingStore,
    window: InferenceWindow,
    adapter: ClassifierAdapter,
    predictions: PredictionCell,
    log: SharedTransparencyLog,
}

impl CapturePipeline {
    pub fn new(
        normalizer: SampleNormalizer,
        clock: Arc<dyn Clock>,
        window: InferenceWindow,
        adapter: ClassifierAdapter,
        predictions: PredictionCell,
        log: SharedTransparencyLog,
    ) -> Self {
        if adapter.input_len() != window.capacity() {
            tracing::warn!(
                "Window capacity {} differs from classifier input width {}; every flush will fail",
                window.capacity(),
                adapter.input_len()
            );
        }

        Self {
            normalizer,
            clock,
            store: ReadingStore::new(),
            window,
            adapter,
            predictions,
            log,
        }
    }

    /// Forget the previous session's readings and partial window.
    pub fn reset(&mut self) {
        self.store.clear();
        self.window.reset();
        self.predictions.clear();
    }

    /// Handle one hardware callback.
    pub fn on_event(&mut self, event: RawSensorEvent) {
        let reading = self.normalizer.normalize(event, self.clock.as_ref());
        self.log.record_reading(&reading.sensor_type);

        if reading.sensor_type.feeds_inference() {
            let source = SlotSource::from(&reading.sensor_type);
            for flushed in self.window.admit_from(source, &reading.values) {
                self.classify(flushed);
            }
        }

        self.store.append(reading);
    }

    /// Drain `events` until every sender is gone, then hand the pipeline back.
    pub fn run(mut self, events: Receiver<RawSensorEvent>) -> Self {
        while let Ok(event) = events.recv() {
            self.on_event(event);
        }
        tracing::debug!("Capture path finished with {} readings", self.store.len());
        self
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    pub fn window(&self) -> &InferenceWindow {
        &self.window
    }

    /// Cell the pipeline publishes predictions into.
    pub fn predictions(&self) -> &PredictionCell {
        &self.predictions
    }

    pub fn log(&self) -> &SharedTransparencyLog {
        &self.log
    }

    fn classify(&mut self, flushed: FlushedWindow) {
        self.log.record_window_flushed();
        match self.adapter.classify_window(&flushed) {
            Ok(prediction) => {
                tracing::debug!("Window classified as {prediction}");
                self.predictions.store(prediction);
            }
            Err(e) => {
                self.log.record_inference_failure();
                tracing::warn!("Inference failed, keeping previous prediction: {e}");
            }
        }
    }
}
