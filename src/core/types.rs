// Data model for the imaging pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::core::errors::ConfigError;
use crate::core::labels::LabelCategory;

/// Normalized rectangle: top-left corner plus size, all in [0, 1] frame units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

fn unit(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl BoundingBox {
    /// Build a box clamped to the frame. The size is shrunk so the box never
    /// extends past the right or bottom edge.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        let x = unit(x);
        let y = unit(y);
        Self {
            x,
            y,
            width: unit(width).min(1.0 - x),
            height: unit(height).min(1.0 - y),
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Center of the box in normalized coordinates
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Pixel rectangle `(x, y, width, height)` inside an image of the given size.
    /// Always at least one pixel wide and tall so a crop is never empty.
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let img_w = image_width.max(1);
        let img_h = image_height.max(1);

        let px = ((self.x * img_w as f32).floor() as u32).min(img_w - 1);
        let py = ((self.y * img_h as f32).floor() as u32).min(img_h - 1);
        let pw = ((self.width * img_w as f32).ceil() as u32).clamp(1, img_w - px);
        let ph = ((self.height * img_h as f32).ceil() as u32).clamp(1, img_h - py);

        (px, py, pw, ph)
    }
}

/// One detector box, optionally enriched with classifier logits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
    pub species_logits: Option<Vec<f32>>,
    pub sex_logits: Option<Vec<f32>>,
    pub abdomen_status_logits: Option<Vec<f32>>,
}

impl InferenceResult {
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            species_logits: None,
            sex_logits: None,
            abdomen_status_logits: None,
        }
    }

    pub fn logits(&self, category: LabelCategory) -> Option<&[f32]> {
        match category {
            LabelCategory::Species => self.species_logits.as_deref(),
            LabelCategory::Sex => self.sex_logits.as_deref(),
            LabelCategory::AbdomenStatus => self.abdomen_status_logits.as_deref(),
        }
    }

    /// Attach whatever logits the classification produced
    pub fn with_classification(mut self, classification: &SpecimenClassification) -> Self {
        self.species_logits = classification.species.as_ref().map(|r| r.logits.clone());
        self.sex_logits = classification.sex.as_ref().map(|r| r.logits.clone());
        self.abdomen_status_logits = classification
            .abdomen_status
            .as_ref()
            .map(|r| r.logits.clone());
        self
    }
}

/// Raw classifier output; the duration is diagnostic only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
    pub logits: Vec<f32>,
    pub inference_duration: Duration,
}

/// Output of the three-way classification fan-out. Each slot is independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecimenClassification {
    pub species: Option<ClassifierResult>,
    pub sex: Option<ClassifierResult>,
    pub abdomen_status: Option<ClassifierResult>,
}

impl SpecimenClassification {
    pub fn get(&self, category: LabelCategory) -> Option<&ClassifierResult> {
        match category {
            LabelCategory::Species => self.species.as_ref(),
            LabelCategory::Sex => self.sex.as_ref(),
            LabelCategory::AbdomenStatus => self.abdomen_status.as_ref(),
        }
    }

    pub fn set(&mut self, category: LabelCategory, result: ClassifierResult) {
        let slot = match category {
            LabelCategory::Species => &mut self.species,
            LabelCategory::Sex => &mut self.sex,
            LabelCategory::AbdomenStatus => &mut self.abdomen_status,
        };
        *slot = Some(result);
    }

    /// Categories whose classifier produced nothing
    pub fn missing(&self) -> Vec<LabelCategory> {
        LabelCategory::ALL
            .into_iter()
            .filter(|c| self.get(*c).is_none())
            .collect()
    }
}

/// Per preview frame result; recomputed every frame, never persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveFrameProcessingResult {
    pub specimen_id: String,
    pub inference_results: Vec<InferenceResult>,
}

/// Per shutter press result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrameProcessingResult {
    pub species: Option<String>,
    pub sex: Option<String>,
    pub abdomen_status: Option<String>,
    pub inference_result: InferenceResult,
}

/// Session type chosen by the calling session, immutable for its duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    Surveillance,
    DataCollection,
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionType::Surveillance => f.write_str("SURVEILLANCE"),
            SessionType::DataCollection => f.write_str("DATA_COLLECTION"),
        }
    }
}

impl FromStr for SessionType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "SURVEILLANCE" => Ok(SessionType::Surveillance),
            "DATA_COLLECTION" => Ok(SessionType::DataCollection),
            _ => Err(ConfigError::UnknownSessionType(s.to_string())),
        }
    }
}

/// Policy for picking the authoritative box among several detections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxSelection {
    #[default]
    HighestConfidence,
    LargestArea,
}

impl FromStr for BoxSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "highest_confidence" | "confidence" => Ok(BoxSelection::HighestConfidence),
            "largest_area" | "area" => Ok(BoxSelection::LargestArea),
            _ => Err(ConfigError::UnknownBoxSelection(s.to_string())),
        }
    }
}

/// Point in view-space pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewPoint {
    pub x: f32,
    pub y: f32,
}

/// Preview stream state as reported by the camera layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

/// Accepted capture handed to the storage collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecimenRecord {
    pub session_id: String,
    pub session_type: SessionType,
    pub specimen_id: Option<String>,
    pub result: CapturedFrameProcessingResult,
    pub captured_at_ms: u64,
}
