use nerv_core::errors::GenerationError;
use nerv_core::ids::DocumentId;
use nerv_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("document {0} has no text to enrich")]
    NoTextContent(DocumentId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid {contract} payload: {detail}")]
    InvalidPayload { contract: String, detail: String },
}
