// Error types for the imaging pipeline
//
// Using thiserror so callers can match on the kind of failure:
// - captures surface typed errors and must be retried
// - live frames never see these (failures degrade to empty results)

use thiserror::Error;

use crate::core::labels::LabelCategory;

/// Provider and repository level failures
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("{provider} provider failed: {source}")]
    ProviderFailed {
        provider: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Inference resources are closed")]
    ResourcesClosed,

    #[error("Inference task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Label resolution failures (logits do not fit the vocabulary)
#[derive(Debug, Error, PartialEq)]
pub enum LabelError {
    #[error("{category} logits have length {actual}, expected {expected}")]
    LogitsLength {
        category: LabelCategory,
        expected: usize,
        actual: usize,
    },

    #[error("{category} logits contain non-finite values")]
    NonFiniteLogits { category: LabelCategory },
}

/// Captured frame processing failures
#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("No specimen detected in captured frame")]
    NoSpecimenDetected,

    #[error("Specimen detection failed: {0}")]
    Detection(#[source] InferenceError),

    #[error("Failed to crop specimen region: {0}")]
    Crop(String),

    #[error("Label resolution failed: {0}")]
    LabelResolution(#[from] LabelError),

    #[error("Classification incomplete, missing: {missing:?}")]
    IncompleteClassification { missing: Vec<LabelCategory> },
}

/// Specimen identifier validation failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid specimen id {raw:?}: {reason}")]
    InvalidSpecimenId { raw: String, reason: &'static str },
}

/// Capture session failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    InvalidSpecimenId(#[from] ValidationError),

    #[error(transparent)]
    Imaging(#[from] ImagingError),

    #[error("A capture is already in progress for session {session_id}")]
    CaptureInProgress { session_id: String },

    #[error("Failed to store specimen record: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("Failed to close session resources: {0}")]
    Close(#[source] InferenceError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("IoU threshold must be in [0.0, 1.0], got {0}")]
    InvalidIoUThreshold(f32),

    #[error("Invalid model input size: {0}")]
    InvalidInputSize(String),

    #[error("Unknown session type: {0}")]
    UnknownSessionType(String),

    #[error("Unknown box selection policy: {0}")]
    UnknownBoxSelection(String),

    #[error("Invalid models directory: {0}")]
    InvalidModelsDir(String),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

// Convenience type aliases for Results
pub type ImagingResult<T> = Result<T, ImagingError>;
pub type ValidationResult<T> = Result<T, ValidationError>;
pub type SessionResult<T> = Result<T, SessionError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ValidationError {
    pub(crate) fn invalid(raw: &str, reason: &'static str) -> Self {
        ValidationError::InvalidSpecimenId {
            raw: raw.to_string(),
            reason,
        }
    }
}
