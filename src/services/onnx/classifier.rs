// Attribute classifier on ONNX Runtime

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{info, trace, warn};

use crate::core::config::InferenceConfig;
use crate::core::labels::LabelCategory;
use crate::services::onnx::{build_session, image_to_nchw};
use crate::services::providers::SpecimenClassifier;

pub struct OnnxSpecimenClassifier {
    name: String,
    session: Mutex<Option<Session>>,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
}

impl OnnxSpecimenClassifier {
    pub fn new(model_path: &Path, category: LabelCategory, config: &InferenceConfig) -> Result<Self> {
        let name = category.as_str().to_string();
        let (backend, session) = build_session(
            model_path,
            &name,
            config.inference_backend.as_deref(),
            config.intra_threads,
        )?;

        let size = config.classifier_input_size as usize;
        info!("{} classifier ready on {}", name, backend);

        Ok(Self {
            name,
            session: Mutex::new(Some(session)),
            input_shape: vec![1, 3, size, size],
            output_shape: vec![1, category.cardinality()],
        })
    }
}

impl SpecimenClassifier for OnnxSpecimenClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn classify(&self, image: &DynamicImage) -> Result<Option<Vec<f32>>> {
        let size = self.input_shape[2] as u32;
        let input = Value::from_array(image_to_nchw(image, size, size))?;

        let logits = {
            let mut guard = self.session.lock();
            let session = guard
                .as_mut()
                .with_context(|| format!("{} classifier session is closed", self.name))?;
            let outputs = session.run(ort::inputs![input])?;

            let output = outputs
                .keys()
                .next()
                .with_context(|| format!("{} classifier produced no outputs", self.name))?
                .to_string();
            let (_shape, data) = outputs[output.as_str()].try_extract_tensor::<f32>()?;
            data.to_vec()
        };

        if logits.is_empty() {
            warn!("{} classifier returned an empty tensor", self.name);
            return Ok(None);
        }

        trace!("{} logits: {:?}", self.name, logits);
        Ok(Some(logits))
    }

    fn close(&self) -> Result<()> {
        self.session.lock().take();
        Ok(())
    }
}
