// Specimen identifier normalization and OCR auto-correction
//
// Identifiers are three letters followed by three digits (e.g. ABC123).
// Auto-correction is a single positional pass over a fixed confusion table,
// not an edit-distance search.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::errors::{ValidationError, ValidationResult};

pub const SPECIMEN_ID_LENGTH: usize = 6;

/// Positions expected to hold letters; the rest hold digits
const LETTER_POSITIONS: usize = 3;

static SPECIMEN_ID_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}[0-9]{3}$").expect("specimen id regex is valid"));

fn digit_to_letter(c: char) -> char {
    match c {
        '0' => 'O',
        '1' => 'I',
        '2' => 'Z',
        '3' => 'E',
        '4' => 'A',
        '5' => 'S',
        '6' => 'G',
        '7' => 'T',
        '8' => 'B',
        '9' => 'P',
        other => other,
    }
}

fn letter_to_digit(c: char) -> char {
    match c {
        'O' => '0',
        'I' => '1',
        'Z' => '2',
        'E' => '3',
        'A' => '4',
        'S' => '5',
        'G' => '6',
        'T' => '7',
        'B' => '8',
        'P' => '9',
        other => other,
    }
}

/// Trim, drop internal whitespace and upper-case ASCII letters.
///
/// Case folding is ASCII only, so every character maps to exactly one
/// character and the length seen by `validate` is the raw length.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Apply the positional confusion table to an already normalized id
pub fn auto_correct(normalized: &str) -> String {
    normalized
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if i < LETTER_POSITIONS {
                digit_to_letter(c)
            } else {
                letter_to_digit(c)
            }
        })
        .collect()
}

/// Validate (and optionally auto-correct) a raw identifier.
///
/// Returns the normalized identifier on success. Any failure is
/// `ValidationError::InvalidSpecimenId`; there is no retry beyond the one
/// corrective pass.
pub fn validate(raw: &str, auto_correct_enabled: bool) -> ValidationResult<String> {
    let normalized = normalize(raw);

    if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::invalid(raw, "contains non-alphanumeric characters"));
    }

    if normalized.len() != SPECIMEN_ID_LENGTH {
        return Err(ValidationError::invalid(raw, "expected exactly 6 characters"));
    }

    let candidate = if auto_correct_enabled {
        auto_correct(&normalized)
    } else {
        normalized
    };

    if !SPECIMEN_ID_FORMAT.is_match(&candidate) {
        return Err(ValidationError::invalid(
            raw,
            "expected three letters followed by three digits",
        ));
    }

    Ok(candidate)
}

/// Stateless validator handle for callers that prefer an object
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecimenIdValidator {
    auto_correct: bool,
}

impl SpecimenIdValidator {
    pub fn new(auto_correct: bool) -> Self {
        Self { auto_correct }
    }

    pub fn auto_correct(&self) -> bool {
        self.auto_correct
    }

    pub fn validate(&self, raw: &str) -> ValidationResult<String> {
        validate(raw, self.auto_correct)
    }
}
