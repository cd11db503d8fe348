use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use nerv_core::observer::{EnrichmentBatchEvent, PipelineObserver, SynthesisCycleEvent};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

pub const ENRICHMENT_DOCUMENTS_TOTAL: &str = "enrichment.documents.total";
pub const ENRICHMENT_BATCH_DURATION: &str = "enrichment.batch.duration_seconds";
pub const SYNTHESIS_CYCLES_TOTAL: &str = "synthesis.cycles.total";
pub const SYNTHESIS_CYCLE_DURATION: &str = "synthesis.cycle.duration_seconds";
pub const SYNTHESIS_DOCUMENTS_TOTAL: &str = "synthesis.documents.total";

/// In-memory counter. Monotonically increasing.
struct Counter {
    value: AtomicU64,
}

impl Counter {
    fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }
    fn increment(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }
    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// In-memory histogram. Stores all observations for percentile computation.
struct Histogram {
    observations: Mutex<Vec<f64>>,
}

impl Histogram {
    fn new() -> Self {
        Self { observations: Mutex::new(Vec::new()) }
    }
    fn observe(&self, value: f64) {
        self.observations.lock().push(value);
    }
    fn summary(&self) -> HistogramSummary {
        let mut obs = self.observations.lock();
        if obs.is_empty() {
            return HistogramSummary::default();
        }
        obs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = obs.len();
        let sum: f64 = obs.iter().sum();
        let p50 = obs[count / 2];
        let p95 = obs[((count as f64 * 0.95) as usize).min(count - 1)];
        HistogramSummary { count: count as u64, sum, p50, p95, max: obs[count - 1] }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub p50: f64,
    pub p95: f64,
    pub max: f64,
}

/// Metric key: name + labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: impl Into<String>, labels: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(String, String)> =
            labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        Self { name: name.into(), labels: sorted }
    }
}

/// Thread-safe in-process metrics for pipeline runs.
///
/// Also remembers the most recent event of each kind so callers (and tests)
/// can inspect the last batch or cycle without scraping counters.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: RwLock<HashMap<MetricKey, Counter>>,
    histograms: RwLock<HashMap<MetricKey, Histogram>>,
    last_enrichment: Mutex<Option<EnrichmentBatchEvent>>,
    last_synthesis: Mutex<Option<SynthesisCycleEvent>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by n.
    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = MetricKey::new(name, labels);
        let counters = self.counters.read();
        if let Some(c) = counters.get(&key) {
            c.increment(n);
            return;
        }
        drop(counters);
        let mut counters = self.counters.write();
        let c = counters.entry(key).or_insert_with(Counter::new);
        c.increment(n);
    }

    /// Record a histogram observation.
    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        let histograms = self.histograms.read();
        if let Some(h) = histograms.get(&key) {
            h.observe(value);
            return;
        }
        drop(histograms);
        let mut histograms = self.histograms.write();
        let h = histograms.entry(key).or_insert_with(Histogram::new);
        h.observe(value);
    }

    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = MetricKey::new(name, labels);
        self.counters.read().get(&key).map_or(0, |c| c.get())
    }

    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        let key = MetricKey::new(name, labels);
        self.histograms.read().get(&key).map(|h| h.summary()).unwrap_or_default()
    }

    pub fn last_enrichment(&self) -> Option<EnrichmentBatchEvent> {
        self.last_enrichment.lock().clone()
    }

    pub fn last_synthesis(&self) -> Option<SynthesisCycleEvent> {
        self.last_synthesis.lock().clone()
    }

    /// Clear the remembered last events. Counters are untouched.
    pub fn reset(&self) {
        *self.last_enrichment.lock() = None;
        *self.last_synthesis.lock() = None;
    }
}

impl PipelineObserver for MetricsRecorder {
    fn record_enrichment_batch(&self, event: &EnrichmentBatchEvent) {
        if event.successes > 0 {
            self.counter_inc(ENRICHMENT_DOCUMENTS_TOTAL, &[("result", "success")], event.successes as u64);
        }
        if event.failures > 0 {
            self.counter_inc(ENRICHMENT_DOCUMENTS_TOTAL, &[("result", "failure")], event.failures as u64);
        }
        self.histogram_observe(ENRICHMENT_BATCH_DURATION, &[], event.duration_seconds);
        *self.last_enrichment.lock() = Some(event.clone());
    }

    fn record_synthesis_cycle(&self, event: &SynthesisCycleEvent) {
        let status = event.status.as_str();
        self.counter_inc(SYNTHESIS_CYCLES_TOTAL, &[("status", status)], 1);
        self.histogram_observe(SYNTHESIS_CYCLE_DURATION, &[("status", status)], event.duration_seconds);
        if event.document_count > 0 {
            self.counter_inc(
                SYNTHESIS_DOCUMENTS_TOTAL,
                &[("status", status)],
                event.document_count as u64,
            );
        }
        *self.last_synthesis.lock() = Some(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nerv_core::synthesis::SynthesisStatus;

    #[test]
    fn counter_basic() {
        let recorder = MetricsRecorder::new();
        recorder.counter_inc("requests.total", &[("method", "GET")], 1);
        recorder.counter_inc("requests.total", &[("method", "GET")], 1);
        recorder.counter_inc("requests.total", &[("method", "POST")], 1);

        assert_eq!(recorder.counter_get("requests.total", &[("method", "GET")]), 2);
        assert_eq!(recorder.counter_get("requests.total", &[("method", "POST")]), 1);
        assert_eq!(recorder.counter_get("requests.total", &[("method", "PUT")]), 0);
    }

    #[test]
    fn histogram_observations() {
        let recorder = MetricsRecorder::new();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0] {
            recorder.histogram_observe("cycle.seconds", &[], v);
        }
        let summary = recorder.histogram_summary("cycle.seconds", &[]);
        assert_eq!(summary.count, 10);
        assert_eq!(summary.sum, 55.0);
        assert_eq!(summary.max, 10.0);
        assert!(summary.p95 >= 9.0);
    }

    #[test]
    fn histogram_empty() {
        let summary = MetricsRecorder::new().histogram_summary("nonexistent", &[]);
        assert_eq!(summary, HistogramSummary::default());
    }

    #[test]
    fn label_ordering_independent() {
        let recorder = MetricsRecorder::new();
        recorder.counter_inc("test", &[("a", "1"), ("b", "2")], 1);
        recorder.counter_inc("test", &[("b", "2"), ("a", "1")], 1);
        assert_eq!(recorder.counter_get("test", &[("a", "1"), ("b", "2")]), 2);
    }

    #[test]
    fn enrichment_batch_updates_counters_and_last_event() {
        let recorder = MetricsRecorder::new();
        let event = EnrichmentBatchEvent { attempted: 3, successes: 2, failures: 1, duration_seconds: 1.5 };
        recorder.record_enrichment_batch(&event);

        assert_eq!(recorder.counter_get(ENRICHMENT_DOCUMENTS_TOTAL, &[("result", "success")]), 2);
        assert_eq!(recorder.counter_get(ENRICHMENT_DOCUMENTS_TOTAL, &[("result", "failure")]), 1);
        assert_eq!(recorder.histogram_summary(ENRICHMENT_BATCH_DURATION, &[]).count, 1);
        assert_eq!(recorder.last_enrichment(), Some(event));
    }

    #[test]
    fn synthesis_cycle_labels_by_status() {
        let recorder = MetricsRecorder::new();
        recorder.record_synthesis_cycle(&SynthesisCycleEvent {
            document_count: 4,
            duration_seconds: 12.0,
            status: SynthesisStatus::Completed,
        });
        recorder.record_synthesis_cycle(&SynthesisCycleEvent {
            document_count: 0,
            duration_seconds: 0.5,
            status: SynthesisStatus::Error,
        });

        assert_eq!(recorder.counter_get(SYNTHESIS_CYCLES_TOTAL, &[("status", "completed")]), 1);
        assert_eq!(recorder.counter_get(SYNTHESIS_CYCLES_TOTAL, &[("status", "error")]), 1);
        assert_eq!(recorder.counter_get(SYNTHESIS_DOCUMENTS_TOTAL, &[("status", "completed")]), 4);
        assert_eq!(recorder.counter_get(SYNTHESIS_DOCUMENTS_TOTAL, &[("status", "error")]), 0);
        assert_eq!(recorder.last_synthesis().map(|e| e.status), Some(SynthesisStatus::Error));

        recorder.reset();
        assert!(recorder.last_synthesis().is_none());
        assert_eq!(recorder.counter_get(SYNTHESIS_CYCLES_TOTAL, &[("status", "error")]), 1);
    }
}
