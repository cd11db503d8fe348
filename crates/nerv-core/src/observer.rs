use serde::Serialize;

use crate::synthesis::SynthesisStatus;

/// Aggregate outcome of one enrichment batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EnrichmentBatchEvent {
    pub attempted: usize,
    pub successes: usize,
    pub failures: usize,
    pub duration_seconds: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SynthesisCycleEvent {
    pub document_count: usize,
    pub duration_seconds: f64,
    pub status: SynthesisStatus,
}

/// Side-channel sink for pipeline outcomes. Never required for correctness.
pub trait PipelineObserver: Send + Sync {
    fn record_enrichment_batch(&self, event: &EnrichmentBatchEvent);
    fn record_synthesis_cycle(&self, event: &SynthesisCycleEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn record_enrichment_batch(&self, _event: &EnrichmentBatchEvent) {}
    fn record_synthesis_cycle(&self, _event: &SynthesisCycleEvent) {}
}
