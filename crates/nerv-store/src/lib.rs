pub mod database;
pub mod documents;
pub mod error;
pub mod evaluations;
pub mod row_helpers;
pub mod schema;
pub mod synthesis;

pub use database::Database;
pub use documents::{DocumentRepo, DocumentStore, TopicQuery};
pub use error::StoreError;
pub use evaluations::{EvaluationRepo, EvaluationStore};
pub use synthesis::{SynthesisRepo, SynthesisStore};
