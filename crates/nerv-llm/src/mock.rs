use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use nerv_core::backend::{ChatRequest, ChatResponse, GenerationBackend};
use nerv_core::errors::BackendError;

/// Pre-programmed responses for deterministic testing without a model runtime.
pub enum MockResponse {
    /// Reply with this assistant text.
    Text(String),
    /// Fail the exchange.
    Error(BackendError),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    /// Reply with `value` serialized as JSON.
    pub fn json(value: Value) -> Self {
        Self::Text(value.to_string())
    }
}

/// Backend that replays responses in order and records every request.
pub struct MockBackend {
    responses: Vec<MockResponse>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self { responses, call_count: AtomicUsize::new(0), requests: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn endpoint(&self) -> String {
        "mock://backend/api/chat".to_string()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        self.requests.lock().push(request.clone());
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);

        match self.responses.get(idx) {
            Some(MockResponse::Text(text)) => Ok(ChatResponse {
                content: text.trim().to_string(),
                raw_body: text.clone(),
            }),
            Some(MockResponse::Error(e)) => Err(e.clone()),
            None => Err(BackendError::Transport(format!(
                "MockBackend: no response configured for call {idx}"
            ))),
        }
    }
}
