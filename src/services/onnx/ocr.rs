// CTC text recognizer for specimen id labels

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::core::config::InferenceConfig;
use crate::services::onnx::{build_session, image_to_nchw};
use crate::services::providers::TextRecognizer;

/// OCR model input dimensions
const TARGET_HEIGHT: u32 = 48;
const MIN_WIDTH: u32 = 16;
const MAX_WIDTH: u32 = 1024;

/// CTC blank token index
const BLANK_INDEX: usize = 0;

pub struct OnnxTextRecognizer {
    session: Mutex<Option<Session>>,
    vocab: HashMap<usize, String>,
}

impl OnnxTextRecognizer {
    pub fn new(model_path: &Path, vocab_path: &Path, config: &InferenceConfig) -> Result<Self> {
        let content = std::fs::read_to_string(vocab_path).with_context(|| {
            format!("Failed to read OCR vocabulary {}", vocab_path.display())
        })?;
        let vocab = load_vocabulary(&content);

        let (backend, session) = build_session(
            model_path,
            "ocr",
            config.inference_backend.as_deref(),
            config.intra_threads,
        )?;

        info!("OCR ready on {}: vocab_size={}", backend, vocab.len());

        Ok(Self {
            session: Mutex::new(Some(session)),
            vocab,
        })
    }
}

/// Parse a vocabulary file: one token per line, token `i` on line `i` maps to
/// class `i + 1` (class 0 is the CTC blank). `<space>` stands for a space.
pub fn load_vocabulary(content: &str) -> HashMap<usize, String> {
    content
        .lines()
        .enumerate()
        .map(|(i, token)| {
            let token = if token == "<space>" { " " } else { token };
            (i + 1, token.to_string())
        })
        .collect()
}

/// CTC greedy decode over `[seq_len, vocab_size]` logits.
/// Collapses repeats and removes blanks.
pub fn ctc_decode(
    logits: &[f32],
    seq_len: usize,
    vocab_size: usize,
    vocab: &HashMap<usize, String>,
) -> String {
    let mut text = String::new();
    let mut prev_idx: Option<usize> = None;

    for t in 0..seq_len {
        let offset = t * vocab_size;
        let Some(step) = logits.get(offset..offset + vocab_size) else {
            break;
        };

        let mut best_idx = 0;
        let mut best_val = f32::NEG_INFINITY;
        for (i, &val) in step.iter().enumerate() {
            if val > best_val {
                best_val = val;
                best_idx = i;
            }
        }

        if best_idx != BLANK_INDEX && Some(best_idx) != prev_idx {
            if let Some(token) = vocab.get(&best_idx) {
                text.push_str(token);
            }
        }
        prev_idx = Some(best_idx);
    }

    text
}

impl TextRecognizer for OnnxTextRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>> {
        let (w, h) = image.dimensions();
        let scale = TARGET_HEIGHT as f32 / h.max(1) as f32;
        let width = ((w as f32 * scale) as u32).clamp(MIN_WIDTH, MAX_WIDTH);
        let input = Value::from_array(image_to_nchw(image, width, TARGET_HEIGHT))?;

        let (dims, logits) = {
            let mut guard = self.session.lock();
            let session = guard.as_mut().context("OCR session is closed")?;
            let outputs = session.run(ort::inputs![input])?;

            let output = outputs
                .keys()
                .next()
                .context("No outputs from OCR model")?
                .to_string();
            let (shape, data) = outputs[output.as_str()].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            (dims, data.to_vec())
        };

        let (seq_len, vocab_size) = match dims.as_slice() {
            [seq, 1, vocab] => (*seq, *vocab),
            [1, seq, vocab] => (*seq, *vocab),
            [seq, vocab] => (*seq, *vocab),
            _ => anyhow::bail!("Unexpected logits shape: {:?}", dims),
        };

        let text = ctc_decode(&logits, seq_len, vocab_size, &self.vocab);
        debug!("OCR result: '{}'", text);

        Ok(text.lines().map(str::to_string).collect())
    }

    fn close(&self) -> Result<()> {
        self.session.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(indices: &[usize], vocab_size: usize) -> Vec<f32> {
        let mut logits = vec![0.0; indices.len() * vocab_size];
        for (t, &idx) in indices.iter().enumerate() {
            logits[t * vocab_size + idx] = 1.0;
        }
        logits
    }

    #[test]
    fn test_vocabulary_loading() {
        let vocab = load_vocabulary("A\nB\n<space>\n1\n");
        assert_eq!(vocab.get(&1).map(String::as_str), Some("A"));
        assert_eq!(vocab.get(&3).map(String::as_str), Some(" "));
        assert_eq!(vocab.get(&4).map(String::as_str), Some("1"));
        assert!(!vocab.contains_key(&0));
    }

    #[test]
    fn test_ctc_collapses_repeats_and_blanks() {
        let vocab = load_vocabulary("A\nB\nC\n1\n");
        // A A blank A B B blank 1
        let logits = one_hot(&[1, 1, 0, 1, 2, 2, 0, 4], 5);

        assert_eq!(ctc_decode(&logits, 8, 5, &vocab), "AAB1");
    }

    #[test]
    fn test_ctc_truncated_logits() {
        let vocab = load_vocabulary("A\n");
        let logits = one_hot(&[1], 2);
        assert_eq!(ctc_decode(&logits, 4, 2, &vocab), "A");
    }
}
