use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument};

use nerv_core::backend::{ChatRequest, ChatResponse, GenerationBackend};
use nerv_core::config::RuntimeConfig;
use nerv_core::errors::BackendError;

const CHAT_PATH: &str = "/api/chat";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Non-streaming client for an Ollama-compatible `/api/chat` endpoint.
pub struct OllamaBackend {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    request_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &RuntimeConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{CHAT_PATH}", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout,
        })
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.request_timeout)
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
        if let Some(key) = &self.api_key {
            headers.push(("authorization".to_string(), format!("Bearer {}", key.expose_secret())));
        }
        headers
    }

    #[instrument(skip_all, fields(model = %request.model, format = request.format.is_some()))]
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        let mut req = self.client.post(&self.endpoint).json(&request.to_json());
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }

        let resp = req.send().await.map_err(|e| self.classify(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify(e))?;
        debug!(status = status.as_u16(), bytes = body.len(), "chat response received");

        if !status.is_success() {
            return Err(BackendError::from_status(status.as_u16(), body, request.format.is_some()));
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| BackendError::Decode(format!("response body is not JSON: {e}")))?;
        if let Some(error) = parsed.get("error").and_then(Value::as_str) {
            return Err(BackendError::from_status(status.as_u16(), error.to_string(), request.format.is_some()));
        }
        let content = parsed
            .pointer("/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Decode("response has no message.content".into()))?;

        Ok(ChatResponse { content: content.trim().to_string(), raw_body: body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> RuntimeConfig {
        RuntimeConfig { base_url: base_url.to_string(), ..Default::default() }
    }

    fn request() -> ChatRequest {
        ChatRequest::new("llama3.1:8b", "sys", "hello", RuntimeConfig::default().sampling(0.2))
    }

    #[tokio::test]
    async fn posts_chat_body_and_reads_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3.1:8b",
                "stream": false,
                "options": {"num_ctx": 4096, "num_predict": 256}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "  {\"ok\": true}\n"},
                "done": true
            })))
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(&config(&server.uri())).unwrap();
        let reply = backend.chat(&request()).await.unwrap();
        assert_eq!(reply.content, "{\"ok\": true}");
        assert!(reply.raw_body.contains("assistant"));
        assert!(backend.endpoint().ends_with("/api/chat"));
    }

    #[tokio::test]
    async fn sends_bearer_token_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"content": "pong"}
            })))
            .mount(&server)
            .await;

        let cfg = RuntimeConfig {
            api_key: Some(SecretString::from("sk-test")),
            ..config(&server.uri())
        };
        let backend = OllamaBackend::new(&cfg).unwrap();
        assert_eq!(backend.chat(&request()).await.unwrap().content, "pong");
    }

    #[tokio::test]
    async fn format_rejection_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid format: json_schema"))
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(&config(&server.uri())).unwrap();
        let with_format = request().with_format(Some(json!({"type": "json_schema"})));
        let err = backend.chat(&with_format).await.unwrap_err();
        assert!(matches!(err, BackendError::FormatUnsupported(_)));

        let err = backend.chat(&request()).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn server_error_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(&config(&server.uri())).unwrap();
        let err = backend.chat(&request()).await.unwrap_err();
        assert_eq!(err.response_body(), Some("model not loaded"));
    }

    #[tokio::test]
    async fn missing_content_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(&config(&server.uri())).unwrap();
        let err = backend.chat(&request()).await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let backend = OllamaBackend::new(&config("http://127.0.0.1:1")).unwrap();
        let err = backend.chat(&request()).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[test]
    fn headers_include_authorization_only_with_key() {
        let plain = OllamaBackend::new(&RuntimeConfig::default()).unwrap();
        assert!(plain.headers().iter().all(|(k, _)| k != "authorization"));

        let keyed = OllamaBackend::new(&RuntimeConfig {
            api_key: Some(SecretString::from("k")),
            ..Default::default()
        })
        .unwrap();
        assert!(keyed.headers().iter().any(|(k, v)| k == "authorization" && v == "Bearer k"));
    }
}
