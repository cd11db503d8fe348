use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::backend::SamplingOptions;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Immutable generation settings. A configuration change produces a new
/// value that replaces the old one wholesale.
#[derive(Clone)]
pub struct RuntimeConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub repeat_penalty: f64,
    pub max_retries: u32,
    pub context_window: u32,
    pub request_timeout: Duration,
    pub debug_payloads: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            max_output_tokens: 256,
            temperature: 0.2,
            top_p: 0.95,
            repeat_penalty: 1.1,
            max_retries: 3,
            context_window: 4096,
            request_timeout: Duration::from_secs(120),
            debug_payloads: false,
        }
    }
}

impl RuntimeConfig {
    /// Sampling options for one request at the given temperature.
    pub fn sampling(&self, temperature: f64) -> SamplingOptions {
        SamplingOptions {
            temperature,
            top_p: self.top_p,
            repeat_penalty: self.repeat_penalty,
            num_predict: self.max_output_tokens,
            num_ctx: self.context_window,
        }
    }

    /// Attempt ceiling for a call; zero overrides and a zero config both mean one attempt.
    pub fn attempts(&self, retry_override: Option<u32>) -> u32 {
        retry_override
            .filter(|n| *n > 0)
            .unwrap_or(self.max_retries)
            .max(1)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.api_key.as_ref().map(|key| key.expose_secret())
    }
}

impl PartialEq for RuntimeConfig {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.model == other.model
            && self.base_url == other.base_url
            && self.bearer_token() == other.bearer_token()
            && self.max_output_tokens == other.max_output_tokens
            && self.temperature == other.temperature
            && self.top_p == other.top_p
            && self.repeat_penalty == other.repeat_penalty
            && self.max_retries == other.max_retries
            && self.context_window == other.context_window
            && self.request_timeout == other.request_timeout
            && self.debug_payloads == other.debug_payloads
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("repeat_penalty", &self.repeat_penalty)
            .field("max_retries", &self.max_retries)
            .field("context_window", &self.context_window)
            .field("request_timeout", &self.request_timeout)
            .field("debug_payloads", &self.debug_payloads)
            .finish()
    }
}
