use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use nerv_core::contract::PromptVars;
use nerv_core::document::Document;
use nerv_core::ids::SynthesisId;
use nerv_core::observer::{PipelineObserver, SynthesisCycleEvent};
use nerv_core::synthesis::{SynthesisRecord, SynthesisStatus, SynthesisWindow};
use nerv_llm::StructuredGenerator;
use nerv_store::{DocumentStore, SynthesisStore, TopicQuery};

use crate::digest::{combined_digest, render_digest, DigestBudget};
use crate::error::EngineError;
use crate::prompts;

/// Tunables for one orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub struct SummarizationConfig {
    pub interval: Duration,
    pub context_window_chars: usize,
    /// Writer passes per cycle. Must be at least 1.
    pub max_iterations: u32,
    pub historical_days: u32,
    pub max_recent_documents: usize,
    pub max_historical_per_topic: usize,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::hours(1),
            context_window_chars: 6000,
            max_iterations: 3,
            historical_days: 7,
            max_recent_documents: 15,
            max_historical_per_topic: 3,
        }
    }
}

/// Where a cycle is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePhase {
    Selecting,
    Drafting,
    Critiquing,
    Completed,
    Error,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Selecting => "selecting",
            Self::Drafting => "drafting",
            Self::Critiquing => "critiquing",
            Self::Completed => "completed",
            Self::Error => "error",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Nothing was enriched inside the window; no record was created.
    Skipped { window: SynthesisWindow },
    Completed { record_id: SynthesisId, iterations: u32 },
    /// A generation call failed for good; the record is marked `error`.
    Failed { record_id: SynthesisId, error: String },
}

/// Writer output as used for the critic prompt.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DraftPayload {
    pub headline: String,
    pub summary: String,
    pub key_points: Vec<String>,
}

impl DraftPayload {
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let text = |key: &str| match payload.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self {
            headline: text("headline"),
            summary: text("summary"),
            key_points: key_points(payload.get("key_points")),
        }
    }

    /// One `- point` line per key point, or `None` when there are none.
    pub fn render_key_points(&self) -> Option<String> {
        render_points(&self.key_points)
    }
}

pub(crate) fn key_points(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub(crate) fn render_points(points: &[String]) -> Option<String> {
    (!points.is_empty()).then(|| {
        points
            .iter()
            .map(|point| format!("- {point}"))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// Critic verdict on one draft.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CriticReview {
    pub should_revise: bool,
    pub strengths: String,
    pub issues: String,
    pub revision_guidance: String,
}

impl CriticReview {
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_owned()
        };
        Self {
            should_revise: payload.get("should_revise").is_some_and(truthy),
            strengths: text("strengths"),
            issues: text("issues"),
            revision_guidance: text("revision_guidance"),
        }
    }

    /// Issues and guidance for the next writer pass; blank parts are omitted.
    pub fn feedback_note(&self) -> String {
        [self.issues.as_str(), self.revision_guidance.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

struct Digests {
    recent: String,
    historical: String,
    combined: String,
}

/// Runs one writer/critic synthesis cycle per call.
///
/// Callers must not run two cycles concurrently against the same store:
/// window selection reads the last completed record and writes a new one
/// without any lock.
pub struct SummarizationOrchestrator {
    generator: Arc<dyn StructuredGenerator>,
    documents: Arc<dyn DocumentStore>,
    records: Arc<dyn SynthesisStore>,
    observer: Arc<dyn PipelineObserver>,
    config: SummarizationConfig,
}

impl SummarizationOrchestrator {
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        documents: Arc<dyn DocumentStore>,
        records: Arc<dyn SynthesisStore>,
        observer: Arc<dyn PipelineObserver>,
        config: SummarizationConfig,
    ) -> Result<Self, EngineError> {
        if config.max_iterations == 0 {
            return Err(EngineError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        Ok(Self {
            generator,
            documents,
            records,
            observer,
            config,
        })
    }

    pub fn config(&self) -> &SummarizationConfig {
        &self.config
    }

    pub async fn run_cycle(&self) -> Result<CycleOutcome, EngineError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle whose window ends at `now`.
    ///
    /// Generation failures end the cycle with [`CycleOutcome::Failed`]; store
    /// failures are returned as errors after the record is marked `error`.
    #[instrument(skip(self))]
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome, EngineError> {
        let started = Instant::now();
        debug!(phase = %CyclePhase::Selecting, "selecting window");
        let window = self.select_window(now)?;
        let recent = self
            .documents
            .enriched_in_window(&window, self.config.max_recent_documents)?;
        if recent.is_empty() {
            info!(%window, "no enriched documents in window, skipping cycle");
            return Ok(CycleOutcome::Skipped { window });
        }

        let mut record = SynthesisRecord::open(window, recent.iter().map(|d| d.id).collect(), now);
        self.records.insert_synthesis(&record)?;
        info!(record_id = %record.id, %window, documents = recent.len(), "synthesis cycle started");

        let result = match self.historical_context(&window, &recent) {
            Ok(historical) => {
                let digests = self.digests(&recent, &historical);
                self.refine(&mut record, &digests).await
            }
            Err(err) => Err(err),
        };

        let document_count = recent.len();
        match result {
            Ok(()) => {
                self.finish(&mut record, SynthesisStatus::Completed)?;
                info!(
                    phase = %CyclePhase::Completed,
                    record_id = %record.id,
                    documents = document_count,
                    iterations = record.iteration_count,
                    "synthesis completed"
                );
                self.emit(document_count, started, SynthesisStatus::Completed);
                Ok(CycleOutcome::Completed {
                    record_id: record.id,
                    iterations: record.iteration_count,
                })
            }
            Err(EngineError::Generation(err)) => {
                error!(
                    record_id = %record.id,
                    phase = %CyclePhase::Error,
                    contract = %err.contract,
                    attempts = err.attempts,
                    error = %err,
                    "synthesis cycle failed on generation"
                );
                self.finish(&mut record, SynthesisStatus::Error)?;
                self.emit(document_count, started, SynthesisStatus::Error);
                Ok(CycleOutcome::Failed {
                    record_id: record.id,
                    error: err.to_string(),
                })
            }
            Err(err) => {
                error!(record_id = %record.id, error = %err, "synthesis cycle aborted");
                if let Err(mark_err) = self.finish(&mut record, SynthesisStatus::Error) {
                    warn!(record_id = %record.id, error = %mark_err, "could not mark record as error");
                }
                self.emit(document_count, started, SynthesisStatus::Error);
                Err(err)
            }
        }
    }

    /// `[max(last completed end, now - interval), now)`.
    fn select_window(&self, now: DateTime<Utc>) -> Result<SynthesisWindow, EngineError> {
        let default_start = now - self.config.interval;
        let start = match self.records.last_completed_synthesis()? {
            Some(last) => last.window.end.max(default_start),
            None => default_start,
        };
        Ok(SynthesisWindow::new(start, now))
    }

    fn historical_context(
        &self,
        window: &SynthesisWindow,
        recent: &[Document],
    ) -> Result<Vec<Document>, EngineError> {
        let topics: Vec<String> = recent
            .iter()
            .filter_map(Document::topic)
            .map(str::to_owned)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if topics.is_empty() || self.config.historical_days == 0 {
            return Ok(Vec::new());
        }

        let exclude: Vec<_> = recent.iter().map(|d| d.id).collect();
        let historical = self.documents.related_by_topic(&TopicQuery {
            topics: &topics,
            before: window.start,
            since: window.start - Duration::days(i64::from(self.config.historical_days)),
            exclude: &exclude,
            per_topic: self.config.max_historical_per_topic,
        })?;
        debug!(topics = topics.len(), documents = historical.len(), "historical context loaded");
        Ok(historical)
    }

    fn digests(&self, recent: &[Document], historical: &[Document]) -> Digests {
        let budget = DigestBudget::split(self.config.context_window_chars);
        let recent = render_digest(recent, budget.recent);
        let historical = render_digest(historical, budget.historical);
        let combined = combined_digest(&recent, &historical, self.config.context_window_chars);
        Digests {
            recent,
            historical,
            combined,
        }
    }

    /// Writer/critic loop. Each draft and review is persisted as it arrives;
    /// the last draft becomes final once the critic approves it or the
    /// iteration cap is reached.
    async fn refine(&self, record: &mut SynthesisRecord, digests: &Digests) -> Result<(), EngineError> {
        let max_iterations = self.config.max_iterations;
        let time_window = record.window.describe();
        let mut feedback = String::new();

        for iteration in 1..=max_iterations {
            debug!(record_id = %record.id, iteration, phase = %CyclePhase::Drafting, "requesting draft");
            let draft = self.write_draft(&time_window, digests, &feedback).await?;
            record.draft = Some(Value::Object(draft.clone()));
            record.iteration_count = iteration;
            record.updated_at = Utc::now();
            self.records.update_synthesis(record)?;

            debug!(record_id = %record.id, iteration, phase = %CyclePhase::Critiquing, "requesting review");
            let review_payload = self
                .review_draft(&time_window, &DraftPayload::from_payload(&draft), &digests.combined)
                .await?;
            let review = CriticReview::from_payload(&review_payload);
            record.feedback = Some(Value::Object(review_payload));
            record.updated_at = Utc::now();
            self.records.update_synthesis(record)?;

            if !review.should_revise || iteration >= max_iterations {
                record.final_payload = Some(Value::Object(draft));
                return Ok(());
            }
            feedback = review.feedback_note();
            info!(record_id = %record.id, iteration, "critic requested revision");
        }
        Ok(())
    }

    async fn write_draft(
        &self,
        time_window: &str,
        digests: &Digests,
        feedback: &str,
    ) -> Result<Map<String, Value>, EngineError> {
        let vars = PromptVars::new()
            .with("time_window", time_window)
            .with("recent_context", or_placeholder(&digests.recent, "(no new coverage)"))
            .with("historical_context", or_placeholder(&digests.historical, "(no notable history)"))
            .with("feedback", or_placeholder(feedback, "(none)"));
        Ok(self.generator.generate(&prompts::WRITER, &vars, None).await?)
    }

    async fn review_draft(
        &self,
        time_window: &str,
        draft: &DraftPayload,
        context_digest: &str,
    ) -> Result<Map<String, Value>, EngineError> {
        let vars = PromptVars::new()
            .with("time_window", time_window)
            .with("draft_headline", draft.headline.as_str())
            .with("draft_summary", draft.summary.as_str())
            .with(
                "draft_key_points",
                draft.render_key_points().unwrap_or_else(|| "(no key points)".to_owned()),
            )
            .with("context_digest", or_placeholder(context_digest, "(no context)"));
        Ok(self.generator.generate(&prompts::CRITIC, &vars, None).await?)
    }

    fn finish(&self, record: &mut SynthesisRecord, status: SynthesisStatus) -> Result<(), EngineError> {
        record.status = status;
        record.updated_at = Utc::now();
        self.records.update_synthesis(record)?;
        Ok(())
    }

    fn emit(&self, document_count: usize, started: Instant, status: SynthesisStatus) {
        self.observer.record_synthesis_cycle(&SynthesisCycleEvent {
            document_count,
            duration_seconds: started.elapsed().as_secs_f64(),
            status,
        });
    }
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.is_empty() {
        placeholder
    } else {
        text
    }
}
