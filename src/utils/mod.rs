pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{crop_image_async, crop_to_bbox_async, load_image_async};
pub use metrics::{Metrics, MetricsSnapshot};
