// YOLO-style specimen detector on ONNX Runtime

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::core::config::InferenceConfig;
use crate::core::types::{BoundingBox, InferenceResult};
use crate::services::onnx::{build_session, image_to_nchw};
use crate::services::providers::SpecimenDetector;

pub struct OnnxSpecimenDetector {
    session: Mutex<Option<Session>>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl OnnxSpecimenDetector {
    pub fn new(model_path: &Path, config: &InferenceConfig) -> Result<Self> {
        let (backend, session) = build_session(
            model_path,
            "detector",
            config.inference_backend.as_deref(),
            config.intra_threads,
        )?;

        info!(
            "Detector ready on {} (input {}px, conf {:.2}, iou {:.2})",
            backend, config.detector_input_size, config.confidence_threshold, config.iou_threshold
        );

        Ok(Self {
            session: Mutex::new(Some(session)),
            input_size: config.detector_input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
        })
    }
}

impl SpecimenDetector for OnnxSpecimenDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<InferenceResult>> {
        let start = Instant::now();
        let input = Value::from_array(image_to_nchw(image, self.input_size, self.input_size))?;

        let (shape, data) = {
            let mut guard = self.session.lock();
            let session = guard.as_mut().context("Detector session is closed")?;
            let outputs = session.run(ort::inputs![input])?;

            let name = outputs
                .keys()
                .next()
                .context("Detector produced no outputs")?
                .to_string();
            let (shape, data) = outputs[name.as_str()].try_extract_tensor::<f32>()?;
            let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            (shape, data.to_vec())
        };

        let candidates =
            parse_predictions(&data, &shape, self.input_size, self.confidence_threshold)?;
        let kept = non_max_suppression(candidates, self.iou_threshold);

        debug!(
            "Detector produced {} box(es) in {:.2}ms",
            kept.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(kept)
    }

    fn close(&self) -> Result<()> {
        self.session.lock().take();
        Ok(())
    }
}

/// Decode a `[1, 4 + classes, anchors]` prediction tensor.
///
/// Rows 0..4 hold center x, center y, width and height in input pixels; the
/// remaining rows hold per-class scores. Anchors whose best class score is
/// below `threshold` are dropped. Boxes come back normalized, top-left based.
pub fn parse_predictions(
    data: &[f32],
    shape: &[usize],
    input_size: u32,
    threshold: f32,
) -> Result<Vec<InferenceResult>> {
    let (rows, anchors) = match shape {
        [1, rows, anchors] if *rows > 4 => (*rows, *anchors),
        _ => anyhow::bail!("Unexpected detector output shape: {:?}", shape),
    };
    if data.len() != rows * anchors {
        anyhow::bail!(
            "Detector output has {} values, expected {} for shape {:?}",
            data.len(),
            rows * anchors,
            shape
        );
    }

    let size = input_size as f32;
    let at = |row: usize, anchor: usize| data[row * anchors + anchor];

    let mut results = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..rows)
            .map(|row| (row - 4, at(row, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });

        if score < threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        let bbox = BoundingBox::new(
            (cx - w / 2.0) / size,
            (cy - h / 2.0) / size,
            w / size,
            h / size,
        );
        results.push(InferenceResult::new(bbox, score, class_id as u32));
    }

    trace!("{} of {} anchors above threshold {}", results.len(), anchors, threshold);
    Ok(results)
}

/// Greedy NMS, highest confidence first
pub fn non_max_suppression(
    detections: Vec<InferenceResult>,
    iou_threshold: f32,
) -> Vec<InferenceResult> {
    let mut sorted = detections;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<InferenceResult> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Column-major helper: one Vec per anchor, transposed into row layout
    fn tensor(anchors: &[[f32; 6]]) -> (Vec<f32>, Vec<usize>) {
        let rows = 6;
        let mut data = vec![0.0; rows * anchors.len()];
        for (a, values) in anchors.iter().enumerate() {
            for (r, v) in values.iter().enumerate() {
                data[r * anchors.len() + a] = *v;
            }
        }
        (data, vec![1, rows, anchors.len()])
    }

    #[test]
    fn test_parse_predictions() {
        let (data, shape) = tensor(&[
            [320.0, 320.0, 128.0, 64.0, 0.9, 0.1],
            [100.0, 100.0, 10.0, 10.0, 0.1, 0.2],
            [200.0, 400.0, 40.0, 80.0, 0.3, 0.7],
        ]);

        let results = parse_predictions(&data, &shape, 640, 0.5).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].class_id, 0);
        assert_eq!(results[0].bbox, BoundingBox::new(0.4, 0.45, 0.2, 0.1));
        assert_eq!(results[1].class_id, 1);
        assert!((results[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_parse_rejects_bad_shape() {
        assert!(parse_predictions(&[0.0; 8], &[1, 4, 2], 640, 0.5).is_err());
        assert!(parse_predictions(&[0.0; 5], &[1, 6, 1], 640, 0.5).is_err());
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let detections = vec![
            InferenceResult::new(BoundingBox::new(0.1, 0.1, 0.4, 0.4), 0.6, 0),
            InferenceResult::new(BoundingBox::new(0.12, 0.1, 0.4, 0.4), 0.9, 0),
            InferenceResult::new(BoundingBox::new(0.6, 0.6, 0.2, 0.2), 0.5, 0),
        ];

        let kept = non_max_suppression(detections, 0.45);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.5);
    }
}
