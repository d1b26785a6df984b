//! Core functionality for the Motion Sensor Agent.
//!
//! This module contains:
//! - The reading store and its merged CSV export
//! - The inference window feeding the classifier
//! - The classifier adapter and shared prediction
//! - The capture pipeline tying them to the sensor callback path

pub mod classifier;
pub mod pipeline;
pub mod store;
pub mod window;

// Re-export commonly used types
pub use classifier::{
    Classifier, ClassifierAdapter, ClassifierError, MotionEnergyClassifier, Prediction,
    PredictionCell,
};
pub use pipeline::CapturePipeline;
pub use store::{ReadingStore, CSV_HEADER};
pub use window::{
    FlushedWindow, InferenceWindow, SlotSource, WindowPhase, DEFAULT_WINDOW_CAPACITY,
};
