// Inference repository: owns the provider handles and exposes the three
// pipeline operations (read id, detect, classify) without workflow logic.

use image::DynamicImage;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::core::errors::InferenceError;
use crate::core::labels::LabelCategory;
use crate::core::types::{BoundingBox, ClassifierResult, InferenceResult, SpecimenClassification};
use crate::services::providers::ProviderSet;
use crate::utils::metrics::Metrics;

pub struct InferenceRepository {
    providers: RwLock<Option<ProviderSet>>,
    metrics: Metrics,
}

impl InferenceRepository {
    pub fn new(providers: ProviderSet) -> Self {
        Self::with_metrics(providers, Metrics::new())
    }

    pub fn with_metrics(providers: ProviderSet, metrics: Metrics) -> Self {
        Self {
            providers: RwLock::new(Some(providers)),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.providers.read().is_none()
    }

    /// Clone the provider handles out of the lock so no lock is held across
    /// an inference call.
    fn providers(&self) -> Result<ProviderSet, InferenceError> {
        self.providers
            .read()
            .clone()
            .ok_or(InferenceError::ResourcesClosed)
    }

    /// Run OCR and return the first non-blank line, trimmed.
    ///
    /// Best effort: any failure yields an empty string, which callers treat
    /// as "not yet legible".
    #[instrument(skip_all)]
    pub async fn read_specimen_id(&self, image: Arc<DynamicImage>) -> String {
        let recognizer = match self.providers() {
            Ok(providers) => providers.text_recognizer,
            Err(e) => {
                warn!("Skipping specimen id OCR: {}", e);
                return String::new();
            }
        };

        let outcome = tokio::task::spawn_blocking(move || recognizer.recognize(&image)).await;

        match outcome {
            Ok(Ok(lines)) => {
                let id = first_non_blank_line(&lines);
                debug!("OCR read specimen id {:?} from {} lines", id, lines.len());
                id
            }
            Ok(Err(e)) => {
                self.metrics.record_ocr_failure();
                debug!("OCR failed, treating id as illegible: {:#}", e);
                String::new()
            }
            Err(e) => {
                self.metrics.record_ocr_failure();
                warn!("OCR task failed: {}", e);
                String::new()
            }
        }
    }

    /// Run the detector once.
    ///
    /// An empty vector means no specimen was found. Provider failures are
    /// returned as errors so a capture can surface them; boxes are clamped to
    /// the frame.
    #[instrument(skip_all)]
    pub async fn detect_specimen(
        &self,
        image: Arc<DynamicImage>,
    ) -> Result<Vec<InferenceResult>, InferenceError> {
        let detector = self.providers()?.detector;
        let start = Instant::now();

        let outcome = tokio::task::spawn_blocking(move || detector.detect(&image))
            .await
            .map_err(|e| InferenceError::TaskJoinFailed(e.to_string()))
            .and_then(|result| {
                result.map_err(|source| InferenceError::ProviderFailed {
                    provider: "detector",
                    source,
                })
            });

        self.metrics.record_detection(outcome.is_ok(), start.elapsed());

        let results: Vec<InferenceResult> = outcome?
            .into_iter()
            .map(|r| InferenceResult {
                bbox: BoundingBox::new(r.bbox.x, r.bbox.y, r.bbox.width, r.bbox.height),
                ..r
            })
            .collect();

        debug!(
            "Detected {} candidate(s) in {:.2}ms",
            results.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(results)
    }

    /// Classify a cropped specimen with all three classifiers concurrently.
    ///
    /// The three calls are independent and joined before returning. A slot is
    /// `None` when its classifier failed or produced nothing; the other slots
    /// are unaffected. Dropping the returned future drops the task set, which
    /// aborts tasks that have not started and discards any partial results.
    #[instrument(skip_all)]
    pub async fn classify_specimen(&self, crop: Arc<DynamicImage>) -> SpecimenClassification {
        let mut classification = SpecimenClassification::default();

        let providers = match self.providers() {
            Ok(providers) => providers,
            Err(e) => {
                warn!("Skipping classification: {}", e);
                return classification;
            }
        };

        let mut tasks = JoinSet::new();
        for category in LabelCategory::ALL {
            let classifier = Arc::clone(providers.classifier(category));
            let image = Arc::clone(&crop);
            tasks.spawn_blocking(move || {
                let start = Instant::now();
                let outcome = classifier.classify(&image);
                (category, outcome, start.elapsed())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((category, Ok(Some(logits)), elapsed)) => {
                    self.metrics.record_classifier_latency(category, elapsed);
                    debug!(
                        "{} classifier produced {} logits in {:.2}ms",
                        category,
                        logits.len(),
                        elapsed.as_secs_f64() * 1000.0
                    );
                    classification.set(
                        category,
                        ClassifierResult {
                            logits,
                            inference_duration: elapsed,
                        },
                    );
                }
                Ok((category, Ok(None), _)) => {
                    debug!("{} classifier produced no output", category);
                }
                Ok((category, Err(e), _)) => {
                    self.metrics.record_classifier_failure();
                    warn!("{} classifier failed: {:#}", category, e);
                }
                Err(e) => {
                    self.metrics.record_classifier_failure();
                    error!("Classifier task failed: {}", e);
                }
            }
        }

        classification
    }

    /// Release every provider handle exactly once.
    ///
    /// Must be the final act of the owning session's teardown, after in-flight
    /// work has completed. Calling it a second time is a contract violation and
    /// returns `InferenceError::ResourcesClosed`.
    pub fn close_resources(&self) -> Result<(), InferenceError> {
        let providers = self
            .providers
            .write()
            .take()
            .ok_or(InferenceError::ResourcesClosed)?;

        let mut failures = 0;
        let mut report = |provider: &str, result: anyhow::Result<()>| {
            if let Err(e) = result {
                failures += 1;
                warn!("Failed to close {} provider: {:#}", provider, e);
            }
        };

        report("text recognizer", providers.text_recognizer.close());
        report("detector", providers.detector.close());
        for category in LabelCategory::ALL {
            report(category.as_str(), providers.classifier(category).close());
        }

        info!("Inference resources released ({} close failures)", failures);
        Ok(())
    }
}

fn first_non_blank_line(lines: &[String]) -> String {
    lines
        .iter()
        .flat_map(|block| block.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        test_image, Gate, MockClassifier, MockDetector, MockProviders, MockRecognizer,
    };
    use std::sync::atomic::Ordering;
    use std::sync::Barrier;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_specimen_id_first_non_blank_line() {
        let mocks = MockProviders::healthy();
        let repository = InferenceRepository::new(mocks.provider_set());

        assert_eq!(repository.read_specimen_id(test_image()).await, "ABC123");
    }

    #[tokio::test]
    async fn test_read_specimen_id_failure_is_empty() {
        let mocks = MockProviders::healthy().with_recognizer(MockRecognizer::failing());
        let repository = InferenceRepository::new(mocks.provider_set());

        assert_eq!(repository.read_specimen_id(test_image()).await, "");
        assert_eq!(repository.metrics().snapshot().ocr_failures, 1);
    }

    #[tokio::test]
    async fn test_read_specimen_id_blank_text_is_empty() {
        let mocks = MockProviders::healthy().with_recognizer(MockRecognizer::returning(&["   ", "\n"]));
        let repository = InferenceRepository::new(mocks.provider_set());

        assert_eq!(repository.read_specimen_id(test_image()).await, "");
    }

    #[tokio::test]
    async fn test_detect_nothing_is_empty_not_error() {
        let mocks = MockProviders::healthy().with_detector(MockDetector::returning(vec![]));
        let repository = InferenceRepository::new(mocks.provider_set());

        let results = repository.detect_specimen(test_image()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_detect_provider_failure_is_error() {
        let mocks = MockProviders::healthy().with_detector(MockDetector::failing());
        let repository = InferenceRepository::new(mocks.provider_set());

        let err = repository.detect_specimen(test_image()).await.unwrap_err();
        assert!(matches!(
            err,
            InferenceError::ProviderFailed {
                provider: "detector",
                ..
            }
        ));
        assert_eq!(repository.metrics().snapshot().detection_failures, 1);
    }

    #[tokio::test]
    async fn test_detect_clamps_boxes() {
        let raw = InferenceResult::new(
            BoundingBox {
                x: -0.1,
                y: 0.8,
                width: 0.5,
                height: 0.5,
            },
            0.7,
            2,
        );
        let mocks = MockProviders::healthy().with_detector(MockDetector::returning(vec![raw]));
        let repository = InferenceRepository::new(mocks.provider_set());

        let results = repository.detect_specimen(test_image()).await.unwrap();
        let bbox = results[0].bbox;
        assert_eq!(bbox.x, 0.0);
        assert!(bbox.y + bbox.height <= 1.0);
        assert_eq!(results[0].class_id, 2);
    }

    #[tokio::test]
    async fn test_classify_runs_all_three_concurrently() {
        // Each classifier blocks until all three are inside `classify`, so
        // this only completes if the calls overlap.
        let barrier = Arc::new(Barrier::new(3));
        let mocks = MockProviders::new(
            MockRecognizer::returning(&[]),
            MockDetector::returning(vec![]),
            MockClassifier::returning("species", vec![0.0; 7]).with_barrier(barrier.clone()),
            MockClassifier::returning("sex", vec![0.0; 2]).with_barrier(barrier.clone()),
            MockClassifier::returning("abdomen_status", vec![0.0; 3]).with_barrier(barrier),
        );
        let repository = InferenceRepository::new(mocks.provider_set());

        let classification = tokio::time::timeout(
            Duration::from_secs(10),
            repository.classify_specimen(test_image()),
        )
        .await
        .expect("classifiers did not run concurrently");

        assert_eq!(classification.species.unwrap().logits.len(), 7);
        assert_eq!(classification.sex.unwrap().logits.len(), 2);
        assert_eq!(classification.abdomen_status.unwrap().logits.len(), 3);
    }

    #[tokio::test]
    async fn test_dropped_classification_discards_partial_results() {
        let gate = Arc::new(Gate::default());
        let mocks = MockProviders::new(
            MockRecognizer::returning(&[]),
            MockDetector::returning(vec![]),
            MockClassifier::returning("species", vec![0.0; 7]).with_gate(gate.clone()),
            MockClassifier::returning("sex", vec![1.0, 0.0]).with_gate(gate.clone()),
            MockClassifier::returning("abdomen_status", vec![0.0; 3]).with_gate(gate.clone()),
        );
        let repository = InferenceRepository::new(mocks.provider_set());

        // The parent future is dropped while every classifier is still blocked
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            repository.classify_specimen(test_image()),
        )
        .await;
        assert!(cancelled.is_err());

        let snapshot = repository.metrics().snapshot();
        assert_eq!(snapshot.classifier_latency_samples, 0);
        assert_eq!(snapshot.classifier_failures, 0);

        gate.open();

        // The repository stays usable and only the new call's results count
        let classification = repository.classify_specimen(test_image()).await;
        assert!(classification.missing().is_empty());
        assert_eq!(classification.sex.unwrap().logits, vec![1.0, 0.0]);

        let snapshot = repository.metrics().snapshot();
        assert_eq!(snapshot.classifier_latency_samples, 3);
        assert_eq!(snapshot.classifier_failures, 0);
    }

    #[tokio::test]
    async fn test_classify_single_failure_only_empties_its_slot() {
        let mocks = MockProviders::healthy().with_sex(MockClassifier::failing("sex"));
        let repository = InferenceRepository::new(mocks.provider_set());

        let classification = repository.classify_specimen(test_image()).await;

        assert!(classification.species.is_some());
        assert!(classification.sex.is_none());
        assert!(classification.abdomen_status.is_some());
        assert_eq!(classification.missing(), vec![LabelCategory::Sex]);
        assert_eq!(repository.metrics().snapshot().classifier_failures, 1);
    }

    #[tokio::test]
    async fn test_classify_empty_output_is_none() {
        let mocks = MockProviders::healthy().with_sex(MockClassifier::empty("sex"));
        let repository = InferenceRepository::new(mocks.provider_set());

        let classification = repository.classify_specimen(test_image()).await;
        assert!(classification.sex.is_none());
        assert_eq!(repository.metrics().snapshot().classifier_failures, 0);
    }

    #[tokio::test]
    async fn test_close_resources_closes_each_provider_once() {
        let mocks = MockProviders::healthy();
        let repository = InferenceRepository::new(mocks.provider_set());

        repository.close_resources().unwrap();

        assert!(repository.is_closed());
        assert_eq!(mocks.recognizer.closes.load(Ordering::SeqCst), 1);
        assert_eq!(mocks.detector.closes.load(Ordering::SeqCst), 1);
        assert_eq!(mocks.species.closes.load(Ordering::SeqCst), 1);
        assert_eq!(mocks.sex.closes.load(Ordering::SeqCst), 1);
        assert_eq!(mocks.abdomen_status.closes.load(Ordering::SeqCst), 1);

        // A second close is out of contract and rejected, not repeated
        assert!(matches!(
            repository.close_resources(),
            Err(InferenceError::ResourcesClosed)
        ));
        assert_eq!(mocks.detector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_calls_after_close_do_not_reach_providers() {
        let mocks = MockProviders::healthy();
        let repository = InferenceRepository::new(mocks.provider_set());
        repository.close_resources().unwrap();

        assert_eq!(repository.read_specimen_id(test_image()).await, "");
        assert!(matches!(
            repository.detect_specimen(test_image()).await,
            Err(InferenceError::ResourcesClosed)
        ));
        let classification = repository.classify_specimen(test_image()).await;
        assert_eq!(classification.missing().len(), 3);

        assert_eq!(mocks.recognizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(mocks.detector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(mocks.species.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_first_non_blank_line_splits_blocks() {
        let lines = vec!["\n  \n XYZ789 \nrest".to_string()];
        assert_eq!(first_non_blank_line(&lines), "XYZ789");
        assert_eq!(first_non_blank_line(&[]), "");
    }
}
