//! Enrichment and summarization pipelines built on structured generation.

pub mod budget;
pub mod digest;
pub mod enrichment;
pub mod error;
pub mod evaluation;
pub mod prompts;
pub mod summarization;

#[cfg(test)]
pub(crate) mod testing;

pub use budget::{CompactionTier, ContextBudgetFitter, FittedPrompt};
pub use enrichment::{BatchResult, EnrichmentPipeline};
pub use error::EngineError;
pub use evaluation::{AudienceProfile, RelevanceEvaluator};
pub use summarization::{CycleOutcome, SummarizationConfig, SummarizationOrchestrator};
