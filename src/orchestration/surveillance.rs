// Surveillance workflow: field captures feeding the monitoring record.
// Every stored capture must carry all three attributes.

use futures::future::BoxFuture;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::errors::{ImagingError, ImagingResult};
use crate::core::labels::LabelCategory;
use crate::core::types::{
    BoxSelection, CapturedFrameProcessingResult, LiveFrameProcessingResult, SessionType,
};
use crate::orchestration::workflow::{FramePipeline, ImagingWorkflow};
use crate::services::repository::InferenceRepository;

pub struct SurveillanceWorkflow {
    pipeline: FramePipeline,
}

impl SurveillanceWorkflow {
    pub fn new(repository: Arc<InferenceRepository>, box_selection: BoxSelection) -> Self {
        Self {
            pipeline: FramePipeline::new(repository, box_selection),
        }
    }
}

/// Reject a capture whose classification is missing any attribute
fn require_complete(
    result: CapturedFrameProcessingResult,
) -> ImagingResult<CapturedFrameProcessingResult> {
    let missing: Vec<LabelCategory> = [
        (LabelCategory::Species, result.species.is_none()),
        (LabelCategory::Sex, result.sex.is_none()),
        (LabelCategory::AbdomenStatus, result.abdomen_status.is_none()),
    ]
    .into_iter()
    .filter_map(|(category, absent)| absent.then_some(category))
    .collect();

    if missing.is_empty() {
        Ok(result)
    } else {
        Err(ImagingError::IncompleteClassification { missing })
    }
}

impl ImagingWorkflow for SurveillanceWorkflow {
    fn session_type(&self) -> SessionType {
        SessionType::Surveillance
    }

    fn process_live_frame(
        &self,
        image: Arc<DynamicImage>,
    ) -> BoxFuture<'_, LiveFrameProcessingResult> {
        Box::pin(self.pipeline.live_frame(image))
    }

    fn process_captured_frame(
        &self,
        image: Arc<DynamicImage>,
    ) -> BoxFuture<'_, ImagingResult<CapturedFrameProcessingResult>> {
        Box::pin(async move {
            let result = self
                .pipeline
                .captured_frame(image)
                .await
                .and_then(require_complete);

            if let Err(e) = &result {
                warn!("Surveillance capture rejected: {}", e);
            }
            self.pipeline.record_capture(&result);
            result
        })
    }

    fn close(&self) {
        debug!("Surveillance workflow closed");
    }
}
