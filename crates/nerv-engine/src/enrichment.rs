use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use nerv_core::contract::{PromptContract, PromptVars};
use nerv_core::document::{coerce_confidence, coerce_text, Annotations, Document};
use nerv_core::ids::DocumentId;
use nerv_core::observer::{EnrichmentBatchEvent, PipelineObserver};
use nerv_llm::StructuredGenerator;
use nerv_store::DocumentStore;

use crate::budget::ContextBudgetFitter;
use crate::error::EngineError;
use crate::prompts;

/// Attempt ceiling for the reduced-input retry after a failed annotation call.
const FALLBACK_ATTEMPTS: u32 = 2;

/// Outcome of one `enrich` call. Already-enriched documents are skipped
/// and count toward neither successes nor failures.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub attempted: usize,
    pub successes: usize,
    pub failures: usize,
    pub skipped: usize,
    pub duration_seconds: f64,
}

/// The independent annotation passes run against each document, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AnnotationPass {
    Location,
    Topic,
    Category,
    Brief,
}

impl AnnotationPass {
    const ALL: [AnnotationPass; 4] = [Self::Location, Self::Topic, Self::Category, Self::Brief];

    fn contract(self) -> &'static PromptContract {
        match self {
            Self::Location => &prompts::LOCATION,
            Self::Topic => &prompts::TOPIC,
            Self::Category => &prompts::CATEGORY,
            Self::Brief => &prompts::BRIEF,
        }
    }

    fn annotations(self, payload: &Map<String, Value>) -> Annotations {
        let text = |key: &str| coerce_text(payload.get(key));
        let label = |key: &str| text(key).map(|s| s.trim().to_owned());
        let confidence = || coerce_confidence(payload.get("confidence"));
        match self {
            Self::Location => Annotations {
                location_name: label("location_name"),
                location_country: label("country"),
                location_confidence: confidence(),
                location_justification: text("justification"),
                ..Annotations::default()
            },
            Self::Topic => Annotations {
                topic: label("topic"),
                topic_confidence: confidence(),
                topic_supporting_points: text("supporting_points"),
                ..Annotations::default()
            },
            Self::Category => Annotations {
                category: label("category"),
                subcategory: label("subcategory"),
                category_confidence: confidence(),
                category_rationale: text("rationale"),
                ..Annotations::default()
            },
            Self::Brief => Annotations {
                brief_summary: text("brief"),
                ..Annotations::default()
            },
        }
    }
}

/// Annotates documents one at a time. A failing document never aborts the batch.
pub struct EnrichmentPipeline {
    generator: Arc<dyn StructuredGenerator>,
    store: Arc<dyn DocumentStore>,
    observer: Arc<dyn PipelineObserver>,
    fitter: ContextBudgetFitter,
}

impl EnrichmentPipeline {
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        store: Arc<dyn DocumentStore>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            generator,
            store,
            observer,
            fitter: ContextBudgetFitter::default(),
        }
    }

    /// Enrich the given documents. Only a failure to load the batch is an error.
    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    pub async fn enrich(&self, ids: &[DocumentId]) -> Result<BatchResult, EngineError> {
        if ids.is_empty() {
            return Ok(BatchResult::default());
        }

        let started = Instant::now();
        let documents = self.store.documents_by_ids(ids)?;
        let mut result = BatchResult::default();

        for doc in &documents {
            if doc.is_enriched() {
                debug!(document_id = %doc.id, "already enriched, skipping");
                result.skipped += 1;
                continue;
            }
            result.attempted += 1;
            match self.enrich_document(doc).await {
                Ok(()) => result.successes += 1,
                Err(err) => {
                    warn!(document_id = %doc.id, error = %err, "document enrichment failed");
                    result.failures += 1;
                }
            }
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        if result.attempted > 0 {
            self.observer.record_enrichment_batch(&EnrichmentBatchEvent {
                attempted: result.attempted,
                successes: result.successes,
                failures: result.failures,
                duration_seconds: result.duration_seconds,
            });
        }

        if result.successes > 0 {
            info!(
                attempted = result.attempted,
                successes = result.successes,
                failures = result.failures,
                skipped = result.skipped,
                duration_seconds = result.duration_seconds,
                avg_seconds = result.duration_seconds / result.successes as f64,
                "enrichment batch completed"
            );
        } else {
            warn!(
                attempted = result.attempted,
                failures = result.failures,
                skipped = result.skipped,
                duration_seconds = result.duration_seconds,
                "no documents enriched in batch"
            );
        }
        Ok(result)
    }

    /// Run every annotation pass for one document. Passes that succeeded
    /// before a failure are still written, without the enrichment timestamp.
    #[instrument(skip(self, doc), fields(document_id = %doc.id))]
    async fn enrich_document(&self, doc: &Document) -> Result<(), EngineError> {
        if !doc.has_text() {
            return Err(EngineError::NoTextContent(doc.id));
        }

        let started = Instant::now();
        let vars = doc.prompt_vars();
        let mut annotations = Annotations::default();

        for pass in AnnotationPass::ALL {
            match self.invoke(pass.contract(), &vars).await {
                Ok(payload) => annotations.merge(pass.annotations(&payload)),
                Err(err) => {
                    if !annotations.is_empty() {
                        self.store.apply_enrichment(doc.id, &annotations, None)?;
                    }
                    return Err(err);
                }
            }
        }

        self.store.apply_enrichment(doc.id, &annotations, Some(Utc::now()))?;
        info!(
            duration_seconds = started.elapsed().as_secs_f64(),
            topic = annotations.topic.as_deref().unwrap_or_default(),
            topic_confidence = annotations.topic_confidence.unwrap_or_default(),
            category = annotations.category.as_deref().unwrap_or_default(),
            subcategory = annotations.subcategory.as_deref().unwrap_or_default(),
            location_confidence = annotations.location_confidence.unwrap_or_default(),
            "document enriched"
        );
        Ok(())
    }

    /// One annotation call, fitted to the context window. On failure the
    /// long-form field is replaced by the summary (or title) and the call is
    /// retried once with a reduced attempt ceiling.
    async fn invoke(
        &self,
        contract: &PromptContract,
        vars: &PromptVars,
    ) -> Result<Map<String, Value>, EngineError> {
        let budget = self.generator.context_window() as usize;
        let fitted = self.fitter.fit(contract, vars, budget);
        match self.generator.generate(contract, &fitted.vars, None).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                warn!(
                    contract = %contract.name,
                    attempts = err.attempts,
                    error_kind = err.error_kind(),
                    "primary annotation call failed, retrying with reduced input"
                );
                let mut reduced = vars.clone();
                let replacement = if vars.has_text("summary") {
                    vars.text("summary")
                } else {
                    vars.text("title")
                };
                reduced.set("content", replacement);
                let fitted = self.fitter.fit(contract, &reduced, budget);
                Ok(self
                    .generator
                    .generate(contract, &fitted.vars, Some(FALLBACK_ATTEMPTS))
                    .await?)
            }
        }
    }
}
