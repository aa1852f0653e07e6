// Data collection workflow: captures for building training sets.
// Partial classification is kept; missing labels stay empty.

use futures::future::BoxFuture;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::errors::ImagingResult;
use crate::core::types::{
    BoxSelection, CapturedFrameProcessingResult, LiveFrameProcessingResult, SessionType,
};
use crate::orchestration::workflow::{FramePipeline, ImagingWorkflow};
use crate::services::repository::InferenceRepository;

pub struct DataCollectionWorkflow {
    pipeline: FramePipeline,
}

impl DataCollectionWorkflow {
    pub fn new(repository: Arc<InferenceRepository>, box_selection: BoxSelection) -> Self {
        Self {
            pipeline: FramePipeline::new(repository, box_selection),
        }
    }
}

impl ImagingWorkflow for DataCollectionWorkflow {
    fn session_type(&self) -> SessionType {
        SessionType::DataCollection
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
            let result = self.pipeline.captured_frame(image).await;

            if let Ok(captured) = &result {
                let labelled = [&captured.species, &captured.sex, &captured.abdomen_status]
                    .iter()
                    .filter(|label| label.is_some())
                    .count();
                if labelled < 3 {
                    info!("Keeping partially labelled capture ({}/3 labels)", labelled);
                }
            }
            self.pipeline.record_capture(&result);
            result
        })
    }

    fn close(&self) {
        debug!("Data collection workflow closed");
    }
}
