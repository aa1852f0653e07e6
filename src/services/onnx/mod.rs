// ONNX Runtime implementations of the provider traits

pub mod classifier;
pub mod detector;
pub mod ocr;
pub mod session;

pub use classifier::OnnxSpecimenClassifier;
pub use detector::OnnxSpecimenDetector;
pub use ocr::OnnxTextRecognizer;
pub use session::build_session;

use anyhow::Result;
use image::DynamicImage;
use ndarray::Array4;
use std::sync::Arc;
use tracing::info;

use crate::core::config::InferenceConfig;
use crate::core::labels::LabelCategory;
use crate::services::providers::ProviderSet;

/// Resize to `width` x `height` and lay out as `[1, 3, H, W]` RGB in [0, 1]
pub(crate) fn image_to_nchw(image: &DynamicImage, width: u32, height: u32) -> Array4<f32> {
    let rgb = image
        .resize_exact(width, height, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let mut array = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        array[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        array[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        array[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }
    array
}

pub struct OnnxProviders;

impl OnnxProviders {
    /// Load every model named in the configuration and bundle the handles
    pub fn load(config: &InferenceConfig) -> Result<ProviderSet> {
        let dir = &config.models_dir;
        info!("Loading models from {}", dir.display());

        let classifier = |category: LabelCategory, file: &str| -> Result<_> {
            Ok(Arc::new(OnnxSpecimenClassifier::new(
                &dir.join(file),
                category,
                config,
            )?))
        };

        Ok(ProviderSet {
            text_recognizer: Arc::new(OnnxTextRecognizer::new(
                &dir.join(&config.ocr_model),
                &dir.join(&config.ocr_vocab),
                config,
            )?),
            detector: Arc::new(OnnxSpecimenDetector::new(
                &dir.join(&config.detector_model),
                config,
            )?),
            species_classifier: classifier(LabelCategory::Species, &config.species_model)?,
            sex_classifier: classifier(LabelCategory::Sex, &config.sex_model)?,
            abdomen_status_classifier: classifier(
                LabelCategory::AbdomenStatus,
                &config.abdomen_status_model,
            )?,
        })
    }
}
