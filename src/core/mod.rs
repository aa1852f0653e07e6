pub mod config;
pub mod errors;
pub mod labels;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{CaptureConfig, Config, InferenceConfig};
pub use errors::{
    ConfigError, ImagingError, InferenceError, LabelError, SessionError, ValidationError,
};
pub use labels::{resolve_label, LabelCategory};
pub use types::{
    BoundingBox, BoxSelection, CapturedFrameProcessingResult, ClassifierResult, InferenceResult,
    LiveFrameProcessingResult, SessionType, SpecimenClassification, SpecimenRecord, StreamState,
    ViewPoint,
};
