pub mod data_collection;
pub mod factory;
pub mod session;
pub mod surveillance;
pub mod workflow;

pub use data_collection::DataCollectionWorkflow;
pub use factory::ImagingWorkflowFactory;
pub use session::ImagingSession;
pub use surveillance::SurveillanceWorkflow;
pub use workflow::{resolve_labels, select_authoritative, ImagingWorkflow};
