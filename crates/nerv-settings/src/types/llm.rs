use std::time::Duration;

use nerv_core::config::{RuntimeConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Generation backend settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// Backend flavour. Only `ollama` is wired up.
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Bearer token for authenticated gateways.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model input limit, in tokens.
    pub context_window: u32,
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub repeat_penalty: f64,
    /// Attempts per structured call.
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    /// Log every request/response at DEBUG (secrets masked).
    pub debug_payloads: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            context_window: 4096,
            max_output_tokens: 256,
            temperature: 0.2,
            top_p: 0.95,
            repeat_penalty: 1.1,
            max_retries: 3,
            request_timeout_secs: 120,
            debug_payloads: false,
        }
    }
}

impl LlmSettings {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            provider: self.provider.clone(),
            model: self.model.clone(),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key: self
                .api_key
                .as_deref()
                .filter(|key| !key.is_empty())
                .map(SecretString::from),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            repeat_penalty: self.repeat_penalty,
            max_retries: self.max_retries,
            context_window: self.context_window,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            debug_payloads: self.debug_payloads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runtime_config_matches_core_default() {
        assert_eq!(LlmSettings::default().runtime_config(), RuntimeConfig::default());
    }

    #[test]
    fn runtime_config_trims_base_url_and_wraps_key() {
        let settings = LlmSettings {
            base_url: "http://gpu-box:11434/".into(),
            api_key: Some("sk-1".into()),
            ..Default::default()
        };
        let config = settings.runtime_config();
        assert_eq!(config.base_url, "http://gpu-box:11434");
        assert_eq!(config.bearer_token(), Some("sk-1"));
    }

    #[test]
    fn empty_api_key_is_ignored() {
        let settings = LlmSettings { api_key: Some(String::new()), ..Default::default() };
        assert!(settings.runtime_config().api_key.is_none());
    }
}
