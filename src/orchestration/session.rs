// Capture session: the calling layer around one imaging workflow.
//
// Owns the identifier gate, capture serialization, persistence of successful
// captures and the teardown order (workflow first, providers last).

use image::DynamicImage;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::core::config::CaptureConfig;
use crate::core::errors::{SessionError, SessionResult};
use crate::core::types::{LiveFrameProcessingResult, SessionType, SpecimenRecord};
use crate::orchestration::factory::ImagingWorkflowFactory;
use crate::orchestration::workflow::ImagingWorkflow;
use crate::services::repository::InferenceRepository;
use crate::services::specimen_id::SpecimenIdValidator;
use crate::services::store::SpecimenStore;

pub struct ImagingSession {
    session_id: String,
    session_type: SessionType,
    workflow: Box<dyn ImagingWorkflow>,
    repository: Arc<InferenceRepository>,
    store: Arc<dyn SpecimenStore>,
    validator: SpecimenIdValidator,
    capture_lock: Mutex<()>,
}

impl ImagingSession {
    pub fn new(
        session_id: impl Into<String>,
        repository: Arc<InferenceRepository>,
        store: Arc<dyn SpecimenStore>,
        config: &CaptureConfig,
    ) -> Self {
        let session_id = session_id.into();
        let workflow =
            ImagingWorkflowFactory::create(config.session_type, repository.clone(), config);

        info!("Session {} opened ({})", session_id, config.session_type);

        Self {
            session_id,
            session_type: config.session_type,
            workflow,
            repository,
            store,
            validator: SpecimenIdValidator::new(config.auto_correct_specimen_id),
            capture_lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub async fn process_live_frame(&self, image: Arc<DynamicImage>) -> LiveFrameProcessingResult {
        self.workflow.process_live_frame(image).await
    }

    /// Process a shutter press and store the result.
    ///
    /// Surveillance requires a valid specimen id and checks it before any
    /// inference runs. Data collection records the id only when it is valid.
    #[instrument(skip(self, image), fields(session_id = %self.session_id))]
    pub async fn capture(
        &self,
        image: Arc<DynamicImage>,
        raw_specimen_id: Option<&str>,
    ) -> SessionResult<SpecimenRecord> {
        let _guard = self
            .capture_lock
            .try_lock()
            .map_err(|_| SessionError::CaptureInProgress {
                session_id: self.session_id.clone(),
            })?;

        let specimen_id = match self.session_type {
            SessionType::Surveillance => {
                Some(self.validator.validate(raw_specimen_id.unwrap_or_default())?)
            }
            SessionType::DataCollection => raw_specimen_id.and_then(|raw| {
                self.validator
                    .validate(raw)
                    .map_err(|e| debug!("Recording capture without id: {}", e))
                    .ok()
            }),
        };

        let result = self.workflow.process_captured_frame(image).await?;

        let record = SpecimenRecord {
            session_id: self.session_id.clone(),
            session_type: self.session_type,
            specimen_id,
            result,
            captured_at_ms: now_ms(),
        };

        self.store
            .save(record.clone())
            .map_err(SessionError::Storage)?;

        info!(
            "Stored capture {} ({})",
            record.specimen_id.as_deref().unwrap_or("-"),
            record.result.species.as_deref().unwrap_or("unlabelled")
        );
        Ok(record)
    }

    /// Wait for any in-flight capture, then release the workflow and the
    /// inference providers.
    pub async fn close(&self) -> SessionResult<()> {
        let _guard = self.capture_lock.lock().await;

        self.workflow.close();
        self.repository
            .close_resources()
            .map_err(SessionError::Close)?;

        info!("Session {} closed", self.session_id);
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
