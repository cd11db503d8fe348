pub mod client;
pub mod json;
pub mod mock;
pub mod ollama;
pub mod redact;

pub use client::{BackendFactory, FormatSupport, GenerationClient, OllamaFactory, StructuredGenerator};
pub use mock::{MockBackend, MockResponse};
pub use ollama::OllamaBackend;
