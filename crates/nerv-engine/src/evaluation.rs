use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument};

use nerv_core::contract::PromptVars;
use nerv_core::document::coerce_confidence;
use nerv_core::ids::EvaluationId;
use nerv_core::synthesis::{SynthesisEvaluation, SynthesisRecord, SynthesisStatus};
use nerv_llm::StructuredGenerator;
use nerv_store::EvaluationStore;

use crate::error::EngineError;
use crate::prompts;
use crate::summarization::{key_points, render_points};

/// Audience a synthesis is rated against.
#[derive(Clone, Debug, PartialEq)]
pub struct AudienceProfile {
    pub title: String,
    pub content: String,
}

impl AudienceProfile {
    fn render(&self) -> String {
        let title = self.title.trim();
        let content = self.content.trim();
        if title.is_empty() {
            content.to_owned()
        } else {
            format!("{title}\n{content}")
        }
    }
}

/// Rates a completed synthesis for an audience. Runs outside the
/// summarization loop, on demand.
pub struct RelevanceEvaluator {
    generator: Arc<dyn StructuredGenerator>,
    store: Arc<dyn EvaluationStore>,
}

impl RelevanceEvaluator {
    pub fn new(generator: Arc<dyn StructuredGenerator>, store: Arc<dyn EvaluationStore>) -> Self {
        Self { generator, store }
    }

    #[instrument(skip(self, record, profile), fields(record_id = %record.id, profile = %profile.title))]
    pub async fn evaluate(
        &self,
        record: &SynthesisRecord,
        profile: &AudienceProfile,
    ) -> Result<SynthesisEvaluation, EngineError> {
        let contract = &*prompts::RELEVANCE;
        let final_payload = match (&record.status, &record.final_payload) {
            (SynthesisStatus::Completed, Some(Value::Object(payload))) => payload,
            _ => {
                return Err(EngineError::InvalidPayload {
                    contract: contract.name.clone(),
                    detail: format!("record {} has no completed final payload", record.id),
                })
            }
        };

        let text = |key: &str| final_payload.get(key).and_then(Value::as_str).unwrap_or_default();
        let points = key_points(final_payload.get("key_points"));
        let vars = PromptVars::new()
            .with("profile", profile.render())
            .with("headline", text("headline"))
            .with("summary", text("summary"))
            .with(
                "key_points",
                render_points(&points).unwrap_or_else(|| "(no key points)".to_owned()),
            );

        let ratings = self.generator.generate(contract, &vars, None).await?;
        let evaluation = SynthesisEvaluation {
            id: EvaluationId::new(),
            synthesis_id: record.id.clone(),
            profile_title: profile.title.clone(),
            overall_relevance: overall_score(ratings.get("overall_relevance")),
            overall_criticality: overall_score(ratings.get("overall_criticality")),
            ratings: Value::Object(ratings),
            created_at: Utc::now(),
        };
        self.store.insert_evaluation(&evaluation)?;

        info!(
            evaluation_id = %evaluation.id,
            relevance = evaluation.overall_relevance.unwrap_or_default(),
            criticality = evaluation.overall_criticality.unwrap_or_default(),
            "synthesis evaluated"
        );
        Ok(evaluation)
    }
}

/// `{"score": 4, ...}` or a bare number.
fn overall_score(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Object(rating) => coerce_confidence(rating.get("score")),
        other => coerce_confidence(Some(other)),
    }
}
