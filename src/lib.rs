// Library exports for the specimen imaging workflow

// Core modules
pub mod core;
pub mod orchestration;
pub mod services;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types and functions
pub use core::{
    config::{CaptureConfig, Config, InferenceConfig},
    errors::{ConfigError, ImagingError, InferenceError, LabelError, SessionError, ValidationError},
    labels::{resolve_label, LabelCategory},
    types::{
        BoundingBox, BoxSelection, CapturedFrameProcessingResult, InferenceResult,
        LiveFrameProcessingResult, SessionType, SpecimenClassification, SpecimenRecord,
    },
};

pub use orchestration::{
    DataCollectionWorkflow, ImagingSession, ImagingWorkflow, ImagingWorkflowFactory,
    SurveillanceWorkflow,
};

pub use services::{
    CameraFocusController, FocusOutcome, InMemorySpecimenStore, InferenceRepository, ProviderSet,
    SpecimenIdValidator, SpecimenStore,
};

pub use utils::{load_image_async, Metrics};
