// Workflow selection by session type

use std::sync::Arc;
use tracing::info;

use crate::core::config::CaptureConfig;
use crate::core::types::SessionType;
use crate::orchestration::data_collection::DataCollectionWorkflow;
use crate::orchestration::surveillance::SurveillanceWorkflow;
use crate::orchestration::workflow::ImagingWorkflow;
use crate::services::repository::InferenceRepository;

pub struct ImagingWorkflowFactory;

impl ImagingWorkflowFactory {
    /// Build the workflow for a session. Called once; the choice is fixed for
    /// the session's lifetime.
    pub fn create(
        session_type: SessionType,
        repository: Arc<InferenceRepository>,
        config: &CaptureConfig,
    ) -> Box<dyn ImagingWorkflow> {
        info!(
            "Creating {} workflow (box selection: {:?})",
            session_type, config.box_selection
        );

        match session_type {
            SessionType::Surveillance => {
                Box::new(SurveillanceWorkflow::new(repository, config.box_selection))
            }
            SessionType::DataCollection => {
                Box::new(DataCollectionWorkflow::new(repository, config.box_selection))
            }
        }
    }
}
