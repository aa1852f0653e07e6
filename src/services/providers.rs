// Inference provider contracts
//
// Providers are opaque capability handles (ONNX sessions, platform OCR, mocks).
// All calls are synchronous and CPU bound; the repository moves them onto the
// blocking pool. Implementations must be safe to call from any thread but are
// not assumed reentrant, so stateful providers serialize internally.

use anyhow::Result;
use image::DynamicImage;
use std::sync::Arc;

use crate::core::labels::LabelCategory;
use crate::core::types::InferenceResult;

/// Text recognition (OCR) over a whole frame
pub trait TextRecognizer: Send + Sync {
    /// Recognized text, one entry per line, in reading order
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Specimen localization
pub trait SpecimenDetector: Send + Sync {
    /// Zero or more candidate boxes, in no particular order
    fn detect(&self, image: &DynamicImage) -> Result<Vec<InferenceResult>>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// One attribute classifier operating on a cropped specimen
pub trait SpecimenClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Model input shape, e.g. `[1, 3, 224, 224]`
    fn input_shape(&self) -> &[usize];

    /// Model output shape, e.g. `[1, 7]`
    fn output_shape(&self) -> &[usize];

    /// Raw logits, or `None` when the model produced no usable output
    fn classify(&self, image: &DynamicImage) -> Result<Option<Vec<f32>>>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// The full set of provider handles owned by one repository
#[derive(Clone)]
pub struct ProviderSet {
    pub text_recognizer: Arc<dyn TextRecognizer>,
    pub detector: Arc<dyn SpecimenDetector>,
    pub species_classifier: Arc<dyn SpecimenClassifier>,
    pub sex_classifier: Arc<dyn SpecimenClassifier>,
    pub abdomen_status_classifier: Arc<dyn SpecimenClassifier>,
}

impl ProviderSet {
    pub fn classifier(&self, category: LabelCategory) -> &Arc<dyn SpecimenClassifier> {
        match category {
            LabelCategory::Species => &self.species_classifier,
            LabelCategory::Sex => &self.sex_classifier,
            LabelCategory::AbdomenStatus => &self.abdomen_status_classifier,
        }
    }
}
