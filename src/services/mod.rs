pub mod focus;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod providers;
pub mod repository;
pub mod specimen_id;
pub mod store;

pub use focus::{CameraControl, CameraFocusController, FocusOutcome, StreamStateProvider};
pub use providers::{ProviderSet, SpecimenClassifier, SpecimenDetector, TextRecognizer};
pub use repository::InferenceRepository;
pub use specimen_id::SpecimenIdValidator;
pub use store::{InMemorySpecimenStore, SpecimenStore};
