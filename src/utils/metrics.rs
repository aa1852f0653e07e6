use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::labels::LabelCategory;

/// Latency samples kept per series; older samples are dropped first
pub const LATENCY_WINDOW: usize = 1024;

/// Pipeline metrics collector.
///
/// Tracks frame throughput, capture outcomes, provider failures and
/// per-classifier latency. Cheap to clone; clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    live_frames_processed: AtomicUsize,
    captures_succeeded: AtomicUsize,
    captures_failed: AtomicUsize,
    detection_failures: AtomicUsize,
    ocr_failures: AtomicUsize,
    classifier_failures: AtomicUsize,

    // Rolling latency windows, diagnostic only
    detection_latency_ms: RwLock<VecDeque<u64>>,
    species_latency_ms: RwLock<VecDeque<u64>>,
    sex_latency_ms: RwLock<VecDeque<u64>>,
    abdomen_status_latency_ms: RwLock<VecDeque<u64>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                live_frames_processed: AtomicUsize::new(0),
                captures_succeeded: AtomicUsize::new(0),
                captures_failed: AtomicUsize::new(0),
                detection_failures: AtomicUsize::new(0),
                ocr_failures: AtomicUsize::new(0),
                classifier_failures: AtomicUsize::new(0),
                detection_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                species_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                sex_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                abdomen_status_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_live_frame(&self) {
        self.inner.live_frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture(&self, success: bool) {
        if success {
            self.inner.captures_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.captures_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_detection(&self, success: bool, duration: Duration) {
        if !success {
            self.inner.detection_failures.fetch_add(1, Ordering::Relaxed);
        }
        push_sample(&self.inner.detection_latency_ms, duration);
    }

    pub fn record_ocr_failure(&self) {
        self.inner.ocr_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_failure(&self) {
        self.inner.classifier_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_latency(&self, category: LabelCategory, duration: Duration) {
        let samples = match category {
            LabelCategory::Species => &self.inner.species_latency_ms,
            LabelCategory::Sex => &self.inner.sex_latency_ms,
            LabelCategory::AbdomenStatus => &self.inner.abdomen_status_latency_ms,
        };
        push_sample(samples, duration);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let detection = self.inner.detection_latency_ms.read();
        let detection_avg = avg(&detection);
        let detection_p95 = percentile(&detection, 0.95);
        let detection_samples = detection.len();
        drop(detection);

        MetricsSnapshot {
            live_frames_processed: self.inner.live_frames_processed.load(Ordering::Relaxed),
            captures_succeeded: self.inner.captures_succeeded.load(Ordering::Relaxed),
            captures_failed: self.inner.captures_failed.load(Ordering::Relaxed),
            detection_failures: self.inner.detection_failures.load(Ordering::Relaxed),
            ocr_failures: self.inner.ocr_failures.load(Ordering::Relaxed),
            classifier_failures: self.inner.classifier_failures.load(Ordering::Relaxed),
            detection_latency_avg_ms: detection_avg,
            detection_latency_p95_ms: detection_p95,
            detection_latency_samples: detection_samples,
            classifier_latency_samples: self.inner.species_latency_ms.read().len()
                + self.inner.sex_latency_ms.read().len()
                + self.inner.abdomen_status_latency_ms.read().len(),
            species_latency_avg_ms: avg(&self.inner.species_latency_ms.read()),
            sex_latency_avg_ms: avg(&self.inner.sex_latency_ms.read()),
            abdomen_status_latency_avg_ms: avg(&self.inner.abdomen_status_latency_ms.read()),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP live_frames_processed_total Live preview frames processed
# TYPE live_frames_processed_total counter
live_frames_processed_total {{}} {}

# HELP captures_total Captured frames by outcome
# TYPE captures_total counter
captures_total {{outcome="success"}} {}
captures_total {{outcome="failure"}} {}

# HELP provider_failures_total Provider failures by provider
# TYPE provider_failures_total counter
provider_failures_total {{provider="detector"}} {}
provider_failures_total {{provider="ocr"}} {}
provider_failures_total {{provider="classifier"}} {}

# HELP detection_latency_avg_ms Average detection latency in milliseconds
# TYPE detection_latency_avg_ms gauge
detection_latency_avg_ms {{}} {}

# HELP classifier_latency_avg_ms Average classifier latency in milliseconds
# TYPE classifier_latency_avg_ms gauge
classifier_latency_avg_ms {{category="species"}} {}
classifier_latency_avg_ms {{category="sex"}} {}
classifier_latency_avg_ms {{category="abdomen_status"}} {}

# HELP uptime_seconds Pipeline uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.live_frames_processed,
            snapshot.captures_succeeded,
            snapshot.captures_failed,
            snapshot.detection_failures,
            snapshot.ocr_failures,
            snapshot.classifier_failures,
            snapshot.detection_latency_avg_ms,
            snapshot.species_latency_avg_ms,
            snapshot.sex_latency_avg_ms,
            snapshot.abdomen_status_latency_avg_ms,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub live_frames_processed: usize,
    pub captures_succeeded: usize,
    pub captures_failed: usize,
    pub detection_failures: usize,
    pub ocr_failures: usize,
    pub classifier_failures: usize,
    pub detection_latency_avg_ms: u64,
    pub detection_latency_p95_ms: u64,
    pub detection_latency_samples: usize,
    pub classifier_latency_samples: usize,
    pub species_latency_avg_ms: u64,
    pub sex_latency_avg_ms: u64,
    pub abdomen_status_latency_avg_ms: u64,
    pub uptime_seconds: u64,
}

fn push_sample(samples: &RwLock<VecDeque<u64>>, duration: Duration) {
    let mut samples = samples.write();
    if samples.len() == LATENCY_WINDOW {
        samples.pop_front();
    }
    samples.push_back(duration.as_millis() as u64);
}

fn percentile(values: &VecDeque<u64>, p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = values.iter().copied().collect();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &VecDeque<u64>) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
