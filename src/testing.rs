// In-memory providers for unit tests

use anyhow::{anyhow, Result};
use image::{DynamicImage, Rgb, RgbImage};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use crate::core::types::{BoundingBox, InferenceResult};
use crate::services::providers::{
    ProviderSet, SpecimenClassifier, SpecimenDetector, TextRecognizer,
};

pub(crate) fn test_image() -> Arc<DynamicImage> {
    Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        64,
        48,
        Rgb([120, 90, 60]),
    )))
}

pub(crate) fn detection(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> InferenceResult {
    InferenceResult::new(BoundingBox::new(x, y, w, h), confidence, 0)
}

/// Blocks classifier calls until opened
#[derive(Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

pub(crate) struct MockRecognizer {
    lines: Option<Vec<String>>,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MockRecognizer {
    pub fn returning(lines: &[&str]) -> Self {
        Self {
            lines: Some(lines.iter().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            lines: None,
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }
}

impl TextRecognizer for MockRecognizer {
    fn recognize(&self, _image: &DynamicImage) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lines
            .clone()
            .ok_or_else(|| anyhow!("recognizer unavailable"))
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct MockDetector {
    results: Option<Vec<InferenceResult>>,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MockDetector {
    pub fn returning(results: Vec<InferenceResult>) -> Self {
        Self {
            results: Some(results),
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            results: None,
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }
}

impl SpecimenDetector for MockDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<Vec<InferenceResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .clone()
            .ok_or_else(|| anyhow!("detector unavailable"))
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

enum ClassifierBehavior {
    Logits(Vec<f32>),
    Empty,
    Fail,
}

pub(crate) struct MockClassifier {
    name: String,
    behavior: ClassifierBehavior,
    barrier: Option<Arc<Barrier>>,
    gate: Option<Arc<Gate>>,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MockClassifier {
    fn with_behavior(name: &str, behavior: ClassifierBehavior, outputs: usize) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            barrier: None,
            gate: None,
            input_shape: vec![1, 3, 224, 224],
            output_shape: vec![1, outputs],
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn returning(name: &str, logits: Vec<f32>) -> Self {
        let outputs = logits.len();
        Self::with_behavior(name, ClassifierBehavior::Logits(logits), outputs)
    }

    pub fn empty(name: &str) -> Self {
        Self::with_behavior(name, ClassifierBehavior::Empty, 0)
    }

    pub fn failing(name: &str) -> Self {
        Self::with_behavior(name, ClassifierBehavior::Fail, 0)
    }

    /// Block inside `classify` until every classifier sharing the barrier arrives
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Block inside `classify` until the gate opens
    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl SpecimenClassifier for MockClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn classify(&self, _image: &DynamicImage) -> Result<Option<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait();
        }
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        match &self.behavior {
            ClassifierBehavior::Logits(logits) => Ok(Some(logits.clone())),
            ClassifierBehavior::Empty => Ok(None),
            ClassifierBehavior::Fail => Err(anyhow!("{} classifier crashed", self.name)),
        }
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Concrete mock handles kept alongside the erased `ProviderSet` so tests can
/// inspect call and close counters.
pub(crate) struct MockProviders {
    pub recognizer: Arc<MockRecognizer>,
    pub detector: Arc<MockDetector>,
    pub species: Arc<MockClassifier>,
    pub sex: Arc<MockClassifier>,
    pub abdomen_status: Arc<MockClassifier>,
}

impl MockProviders {
    /// One confident detection, a legible id and logits for all three classifiers
    pub fn healthy() -> Self {
        Self::new(
            MockRecognizer::returning(&["", "  ABC123  ", "second line"]),
            MockDetector::returning(vec![detection(0.25, 0.25, 0.5, 0.5, 0.9)]),
            MockClassifier::returning("species", vec![0.1, 3.0, 0.2, 0.0, -1.0, 0.5, 0.3]),
            MockClassifier::returning("sex", vec![2.0, -1.0]),
            MockClassifier::returning("abdomen_status", vec![0.0, 0.2, 1.5]),
        )
    }

    pub fn new(
        recognizer: MockRecognizer,
        detector: MockDetector,
        species: MockClassifier,
        sex: MockClassifier,
        abdomen_status: MockClassifier,
    ) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
            detector: Arc::new(detector),
            species: Arc::new(species),
            sex: Arc::new(sex),
            abdomen_status: Arc::new(abdomen_status),
        }
    }

    pub fn with_detector(mut self, detector: MockDetector) -> Self {
        self.detector = Arc::new(detector);
        self
    }

    pub fn with_recognizer(mut self, recognizer: MockRecognizer) -> Self {
        self.recognizer = Arc::new(recognizer);
        self
    }

    pub fn with_sex(mut self, sex: MockClassifier) -> Self {
        self.sex = Arc::new(sex);
        self
    }

    pub fn provider_set(&self) -> ProviderSet {
        ProviderSet {
            text_recognizer: self.recognizer.clone(),
            detector: self.detector.clone(),
            species_classifier: self.species.clone(),
            sex_classifier: self.sex.clone(),
            abdomen_status_classifier: self.abdomen_status.clone(),
        }
    }
}
