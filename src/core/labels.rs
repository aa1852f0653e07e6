// Label vocabularies and logits-to-label resolution

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::LabelError;

pub const SPECIES_LABELS: [&str; 7] = [
    "An. funestus",
    "An. gambiae",
    "An. other",
    "Culex",
    "Aedes",
    "Mansonia",
    "Non-mosquito",
];

pub const SEX_LABELS: [&str; 2] = ["Female", "Male"];

pub const ABDOMEN_STATUS_LABELS: [&str; 3] = ["Unfed", "Fully fed", "Gravid"];

/// The three independently classified specimen attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCategory {
    Species,
    Sex,
    AbdomenStatus,
}

impl LabelCategory {
    pub const ALL: [LabelCategory; 3] = [
        LabelCategory::Species,
        LabelCategory::Sex,
        LabelCategory::AbdomenStatus,
    ];

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            LabelCategory::Species => &SPECIES_LABELS,
            LabelCategory::Sex => &SEX_LABELS,
            LabelCategory::AbdomenStatus => &ABDOMEN_STATUS_LABELS,
        }
    }

    /// Number of logits a classifier for this category must produce
    pub fn cardinality(self) -> usize {
        self.labels().len()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LabelCategory::Species => "species",
            LabelCategory::Sex => "sex",
            LabelCategory::AbdomenStatus => "abdomen_status",
        }
    }
}

impl fmt::Display for LabelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve raw logits to a label by arg-max over the category vocabulary.
///
/// Pure and deterministic: on ties the lowest index wins. Logits of the wrong
/// length or containing NaN/inf are rejected rather than mapped to a label.
pub fn resolve_label(category: LabelCategory, logits: &[f32]) -> Result<&'static str, LabelError> {
    let labels = category.labels();
    if logits.len() != labels.len() {
        return Err(LabelError::LogitsLength {
            category,
            expected: labels.len(),
            actual: logits.len(),
        });
    }
    if logits.iter().any(|v| !v.is_finite()) {
        return Err(LabelError::NonFiniteLogits { category });
    }

    let mut best_idx = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &val) in logits.iter().enumerate() {
        if val > best_val {
            best_val = val;
            best_idx = i;
        }
    }

    Ok(labels[best_idx])
}
