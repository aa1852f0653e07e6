// Imaging workflow contract and the frame pipeline shared by both variants

use futures::future::BoxFuture;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::errors::{ImagingError, ImagingResult};
use crate::core::labels::{resolve_label, LabelCategory};
use crate::core::types::{
    BoxSelection, CapturedFrameProcessingResult, InferenceResult, LiveFrameProcessingResult,
    SessionType, SpecimenClassification,
};
use crate::services::repository::InferenceRepository;
use crate::utils::image_ops::crop_to_bbox_async;

/// Session-type specific imaging behavior.
///
/// One implementation is chosen per session by `ImagingWorkflowFactory`.
pub trait ImagingWorkflow: Send + Sync {
    fn session_type(&self) -> SessionType;

    /// Detection plus OCR over a preview frame. Never fails; whatever could
    /// be computed is returned.
    fn process_live_frame(
        &self,
        image: Arc<DynamicImage>,
    ) -> BoxFuture<'_, LiveFrameProcessingResult>;

    /// Detect, crop, classify and label a shutter-selected frame.
    fn process_captured_frame(
        &self,
        image: Arc<DynamicImage>,
    ) -> BoxFuture<'_, ImagingResult<CapturedFrameProcessingResult>>;

    /// Release per-workflow resources. The shared repository is closed by
    /// its owner, not here.
    fn close(&self);
}

/// Pick the authoritative box among several detections.
///
/// Ties keep the earlier candidate. Returns `None` only for an empty slice.
pub fn select_authoritative(
    candidates: &[InferenceResult],
    selection: BoxSelection,
) -> Option<&InferenceResult> {
    let score = |r: &InferenceResult| match selection {
        BoxSelection::HighestConfidence => r.confidence,
        BoxSelection::LargestArea => r.bbox.area(),
    };

    let mut iter = candidates.iter();
    let mut best = iter.next()?;
    for candidate in iter {
        if score(candidate) > score(best) {
            best = candidate;
        }
    }
    Some(best)
}

/// Resolve every label that has logits; missing logits stay `None`.
pub fn resolve_labels(
    classification: &SpecimenClassification,
    inference_result: InferenceResult,
) -> ImagingResult<CapturedFrameProcessingResult> {
    let resolve = |category: LabelCategory| -> ImagingResult<Option<String>> {
        classification
            .get(category)
            .map(|r| resolve_label(category, &r.logits).map(str::to_string))
            .transpose()
            .map_err(ImagingError::from)
    };

    Ok(CapturedFrameProcessingResult {
        species: resolve(LabelCategory::Species)?,
        sex: resolve(LabelCategory::Sex)?,
        abdomen_status: resolve(LabelCategory::AbdomenStatus)?,
        inference_result,
    })
}

/// Frame processing steps common to every workflow variant
pub(crate) struct FramePipeline {
    repository: Arc<InferenceRepository>,
    box_selection: BoxSelection,
}

impl FramePipeline {
    pub(crate) fn new(repository: Arc<InferenceRepository>, box_selection: BoxSelection) -> Self {
        Self {
            repository,
            box_selection,
        }
    }

    #[instrument(skip_all)]
    pub(crate) async fn live_frame(&self, image: Arc<DynamicImage>) -> LiveFrameProcessingResult {
        let (detections, specimen_id) = tokio::join!(
            self.repository.detect_specimen(image.clone()),
            self.repository.read_specimen_id(image)
        );

        let inference_results = detections.unwrap_or_else(|e| {
            warn!("Live frame detection failed: {}", e);
            Vec::new()
        });

        self.repository.metrics().record_live_frame();

        LiveFrameProcessingResult {
            specimen_id,
            inference_results,
        }
    }

    /// Detection, box selection, crop and classification of a captured frame.
    ///
    /// Labels are resolved for every classifier that produced logits; the
    /// caller decides whether a partial result is acceptable.
    #[instrument(skip_all, fields(selection = ?self.box_selection))]
    pub(crate) async fn captured_frame(
        &self,
        image: Arc<DynamicImage>,
    ) -> ImagingResult<CapturedFrameProcessingResult> {
        let detections = self
            .repository
            .detect_specimen(image.clone())
            .await
            .map_err(ImagingError::Detection)?;

        let chosen = select_authoritative(&detections, self.box_selection)
            .cloned()
            .ok_or(ImagingError::NoSpecimenDetected)?;

        debug!(
            "Selected box {:?} (confidence {:.3}) out of {} candidates",
            chosen.bbox,
            chosen.confidence,
            detections.len()
        );

        let crop = crop_to_bbox_async(image, chosen.bbox)
            .await
            .map_err(|e| ImagingError::Crop(format!("{:#}", e)))?;

        let classification = self.repository.classify_specimen(Arc::new(crop)).await;
        let chosen = chosen.with_classification(&classification);

        resolve_labels(&classification, chosen)
    }

    pub(crate) fn record_capture<T>(&self, result: &ImagingResult<T>) {
        self.repository.metrics().record_capture(result.is_ok());
    }
}
