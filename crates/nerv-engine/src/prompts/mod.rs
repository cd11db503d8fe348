//! Prompt contracts for enrichment, synthesis and relevance rating.

mod enrichment;
mod relevance;
mod synthesis;

pub use enrichment::{BRIEF, CATEGORY, LOCATION, TOPIC};
pub use relevance::RELEVANCE;
pub use synthesis::{CRITIC, WRITER};
