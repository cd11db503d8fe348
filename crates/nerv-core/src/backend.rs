use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::BackendError;

/// Sampling parameters forwarded to the backend with every request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub repeat_penalty: f64,
    pub num_predict: u32,
    pub num_ctx: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// One non-streaming chat exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: SamplingOptions,
    /// Structured-output hint; `None` sends plain text.
    pub format: Option<Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, system: &str, user: &str, options: SamplingOptions) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            options,
            format: None,
        }
    }

    pub fn with_format(mut self, format: Option<Value>) -> Self {
        self.format = format;
        self
    }

    pub fn without_format(&self) -> Self {
        Self { format: None, ..self.clone() }
    }

    fn content_of(&self, role: ChatRole) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn system_text(&self) -> &str {
        self.content_of(ChatRole::System)
    }

    pub fn user_text(&self) -> &str {
        self.content_of(ChatRole::User)
    }

    /// JSON body as sent on the wire.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.messages,
            "stream": false,
            "options": self.options,
        });
        if let Some(format) = &self.format {
            body["format"] = format.clone();
        }
        body
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatResponse {
    /// Assistant reply text, trimmed.
    pub content: String,
    /// Raw response body, kept for diagnostics.
    pub raw_body: String,
}

/// A text-generation runtime reachable over some transport.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Address requests are sent to, for diagnostics.
    fn endpoint(&self) -> String;

    /// Headers attached to every request, before redaction.
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError>;
}
