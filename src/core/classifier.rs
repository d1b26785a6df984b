//! Activity classification on flushed windows.
//!
//! The model itself is opaque: anything implementing [`Classifier`] takes a
//! fixed-length vector and returns one probability per label.

use crate::core::window::{FlushedWindow, SlotSource};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::sync::{Arc, RwLock};

/// Opaque activity model.
pub trait Classifier: Send {
    /// Expected input width in scalar slots.
    fn input_len(&self) -> usize;

    /// Class names in output order.
    fn labels(&self) -> &[String];

    /// Run the model on one window.
    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>, ClassifierError>;

    /// Run the model on a flushed window; models that care which sensor
    /// filled each slot override this.
    fn infer_window(&mut self, window: &FlushedWindow) -> Result<Vec<f32>, ClassifierError> {
        self.infer(&window.values)
    }
}

/// Errors raised while classifying a window.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierError {
    /// Input width does not match the model
    InputLength { expected: usize, actual: usize },
    /// Output width does not match the label set
    OutputLength { expected: usize, actual: usize },
    /// Model returned no usable probability
    NoScores,
    /// Model-internal failure
    Model(String),
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::InputLength { expected, actual } => {
                write!(f, "Classifier input has {actual} values, expected {expected}")
            }
            ClassifierError::OutputLength { expected, actual } => {
                write!(f, "Classifier output has {actual} scores, expected {expected}")
            }
            ClassifierError::NoScores => write!(f, "Classifier returned no usable scores"),
            ClassifierError::Model(msg) => write!(f, "Classifier error: {msg}"),
        }
    }
}

impl std::error::Error for ClassifierError {}

/// Most likely activity for the latest window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_name: String,
    /// Probability of `class_name`, within [0, 1]
    pub confidence: f32,
}

impl Prediction {
    pub fn new(class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Wire form sent over the prediction channel.
    pub fn to_payload(&self) -> Vec<u8> {
        format!("{},{:.4}", self.class_name, self.confidence).into_bytes()
    }

    /// Parse the wire form; `None` when the text is not `label,confidence`.
    pub fn from_payload(text: &str) -> Option<Self> {
        let (label, confidence) = text.trim().rsplit_once(',')?;
        let confidence: f32 = confidence.trim().parse().ok()?;
        if label.is_empty() || !confidence.is_finite() {
            return None;
        }
        Some(Self::new(label, confidence))
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.1}%)", self.class_name, self.confidence * 100.0)
    }
}

/// Latest prediction, shared between the capture path and the push loop.
#[derive(Debug, Clone, Default)]
pub struct PredictionCell {
    inner: Arc<RwLock<Option<Prediction>>>,
}

impl PredictionCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value.
    pub fn store(&self, prediction: Prediction) {
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(prediction),
            Err(poisoned) => *poisoned.into_inner() = Some(prediction),
        }
    }

    /// Snapshot of the current value.
    pub fn load(&self) -> Option<Prediction> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

/// Turns window contents into a [`Prediction`].
pub struct ClassifierAdapter {
    model: Box<dyn Classifier>,
}

impl ClassifierAdapter {
    pub fn new(model: Box<dyn Classifier>) -> Self {
        Self { model }
    }

    pub fn input_len(&self) -> usize {
        self.model.input_len()
    }

    /// Classify raw window values and pick the most likely label.
    pub fn classify(&mut self, window: &[f32]) -> Result<Prediction, ClassifierError> {
        self.check_input(window.len())?;
        let scores = self.model.infer(window)?;
        self.pick(scores)
    }

    /// Classify a flushed window, keeping its slot sources visible to the model.
    pub fn classify_window(
        &mut self,
        window: &FlushedWindow,
    ) -> Result<Prediction, ClassifierError> {
        self.check_input(window.values.len())?;
        let scores = self.model.infer_window(window)?;
        self.pick(scores)
    }

    fn check_input(&self, actual: usize) -> Result<(), ClassifierError> {
        let expected = self.model.input_len();
        if actual != expected {
            return Err(ClassifierError::InputLength { expected, actual });
        }
        Ok(())
    }

    fn pick(&self, scores: Vec<f32>) -> Result<Prediction, ClassifierError> {
        let labels = self.model.labels();
        if scores.len() != labels.len() {
            return Err(ClassifierError::OutputLength {
                expected: labels.len(),
                actual: scores.len(),
            });
        }

        let best = top_index(&scores).ok_or(ClassifierError::NoScores)?;
        Ok(Prediction::new(labels[best].clone(), scores[best]))
    }
}

/// Index of the highest score; ties go to the lowest index, NaN never wins.
pub fn top_index(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Default activity labels of the built-in model.
pub const DEFAULT_LABELS: [&str; 3] = ["still", "walking", "running"];

/// Heuristic model scoring activity by signal energy.
///
/// The spread of accelerometer magnitudes across the window is mapped onto
/// still / walking / running with a softmax. Gyroscope slots are skipped;
/// untagged input is read as uniform xyz triples.
pub struct MotionEnergyClassifier {
    input_len: usize,
    labels: Vec<String>,
    /// Magnitude standard deviation at the centre of each class
    centres: [f64; 3],
}

impl MotionEnergyClassifier {
    pub fn new(input_len: usize) -> Self {
        Self {
            input_len,
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
            centres: [0.05, 1.5, 5.0],
        }
    }

    fn score(&self, magnitudes: Vec<f64>) -> Result<Vec<f32>, ClassifierError> {
        if magnitudes.len() < 2 {
            return Err(ClassifierError::Model("window too short for energy estimate".into()));
        }

        let spread = magnitudes.iter().std_dev();
        if !spread.is_finite() {
            return Err(ClassifierError::Model("non-finite window values".into()));
        }

        // Softmax over negative log-distance to each centre.
        let logits: Vec<f64> = self
            .centres
            .iter()
            .map(|c| -((spread + 1e-3).ln() - c.ln()).abs() * 4.0)
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        Ok(exps.iter().map(|e| (e / total) as f32).collect())
    }
}

impl Classifier for MotionEnergyClassifier {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>, ClassifierError> {
        self.score(input.chunks_exact(3).map(|c| magnitude(c[0], c[1], c[2])).collect())
    }

    fn infer_window(&mut self, window: &FlushedWindow) -> Result<Vec<f32>, ClassifierError> {
        let accelerometer = window.triples(SlotSource::Accelerometer);
        if accelerometer.len() < 2 {
            // Gyroscope-only or untagged input.
            return self.infer(&window.values[..window.filled]);
        }
        self.score(accelerometer.iter().map(|[x, y, z]| magnitude(*x, *y, *z)).collect())
    }
}

fn magnitude(x: f32, y: f32, z: f32) -> f64 {
    let (x, y, z) = (f64::from(x), f64::from(y), f64::from(z));
    (x * x + y * y + z * z).sqrt()
}
