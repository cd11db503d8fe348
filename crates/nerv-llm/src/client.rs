use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use nerv_core::backend::{ChatRequest, ChatResponse, GenerationBackend};
use nerv_core::config::RuntimeConfig;
use nerv_core::contract::{PromptContract, PromptVars};
use nerv_core::errors::{AttemptError, BackendError, Diagnostic, GenerationError};
use nerv_core::tokens::estimate_tokens;

use crate::json::parse_json_object;
use crate::ollama::OllamaBackend;
use crate::redact::{redact_header, redact_value};

const PING_SYSTEM_PROMPT: &str = "You are a status probe for nerv. Reply concisely.";
pub const DEFAULT_PING_PROMPT: &str = "Hello, are you there?";

/// Builds a backend handle for a runtime config.
pub trait BackendFactory: Send + Sync {
    fn build(&self, config: &RuntimeConfig) -> Result<Arc<dyn GenerationBackend>, BackendError>;
}

impl<F> BackendFactory for F
where
    F: Fn(&RuntimeConfig) -> Result<Arc<dyn GenerationBackend>, BackendError> + Send + Sync,
{
    fn build(&self, config: &RuntimeConfig) -> Result<Arc<dyn GenerationBackend>, BackendError> {
        self(config)
    }
}

/// Default factory: an Ollama-compatible HTTP backend.
pub struct OllamaFactory;

impl BackendFactory for OllamaFactory {
    fn build(&self, config: &RuntimeConfig) -> Result<Arc<dyn GenerationBackend>, BackendError> {
        Ok(Arc::new(OllamaBackend::new(config)?))
    }
}

/// Whether the backend accepts the structured-output hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatSupport {
    Unknown,
    Supported,
    Unsupported,
}

/// Schema-constrained generation, as seen by the pipelines.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    /// Model input limit in tokens for the active configuration.
    fn context_window(&self) -> u32;

    /// Generate a JSON object satisfying `contract`. `max_attempts`
    /// overrides the configured ceiling when positive.
    async fn generate(
        &self,
        contract: &PromptContract,
        vars: &PromptVars,
        max_attempts: Option<u32>,
    ) -> Result<Map<String, Value>, GenerationError>;
}

struct ClientState {
    config: Arc<RuntimeConfig>,
    backend: Option<Arc<dyn GenerationBackend>>,
    format_support: FormatSupport,
}

/// One exchange as it actually went over the wire.
struct Exchange {
    request: ChatRequest,
    result: Result<ChatResponse, BackendError>,
}

/// Structured-output client with bounded retries and format-hint negotiation.
///
/// Configuration is an immutable [`RuntimeConfig`]; [`replace_config`]
/// swaps it wholesale and drops the cached backend handle and capability
/// result so both are rebuilt on next use.
///
/// [`replace_config`]: GenerationClient::replace_config
pub struct GenerationClient {
    state: RwLock<ClientState>,
    factory: Arc<dyn BackendFactory>,
}

impl GenerationClient {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_factory(config, OllamaFactory)
    }

    pub fn with_factory(config: RuntimeConfig, factory: impl BackendFactory + 'static) -> Self {
        Self {
            state: RwLock::new(ClientState {
                config: Arc::new(config),
                backend: None,
                format_support: FormatSupport::Unknown,
            }),
            factory: Arc::new(factory),
        }
    }

    /// Client that always talks to `backend`, whatever the config says.
    pub fn with_backend(config: RuntimeConfig, backend: Arc<dyn GenerationBackend>) -> Self {
        Self::with_factory(
            config,
            move |_: &RuntimeConfig| -> Result<Arc<dyn GenerationBackend>, BackendError> {
                Ok(backend.clone())
            },
        )
    }

    pub fn config(&self) -> Arc<RuntimeConfig> {
        self.state.read().config.clone()
    }

    pub fn format_support(&self) -> FormatSupport {
        self.state.read().format_support
    }

    /// Swap in a new configuration. Returns `false` when `config` equals
    /// the current one and nothing was reset.
    pub fn replace_config(&self, config: RuntimeConfig) -> bool {
        let mut state = self.state.write();
        if *state.config == config {
            return false;
        }
        info!(
            provider = %config.provider,
            model = %config.model,
            previous_model = %state.config.model,
            "replacing generation client configuration"
        );
        *state = ClientState {
            config: Arc::new(config),
            backend: None,
            format_support: FormatSupport::Unknown,
        };
        true
    }

    /// Current config with its backend, building the backend on first use.
    fn acquire(&self) -> Result<(Arc<RuntimeConfig>, Arc<dyn GenerationBackend>), BackendError> {
        {
            let state = self.state.read();
            if let Some(backend) = &state.backend {
                return Ok((state.config.clone(), backend.clone()));
            }
        }

        let mut state = self.state.write();
        if let Some(backend) = &state.backend {
            return Ok((state.config.clone(), backend.clone()));
        }
        info!(base_url = %state.config.base_url, model = %state.config.model, "connecting to generation backend");
        let backend = self.factory.build(&state.config)?;
        state.backend = Some(backend.clone());
        Ok((state.config.clone(), backend))
    }

    /// Record the capability result, unless the config changed meanwhile.
    fn note_format_support(&self, config: &Arc<RuntimeConfig>, support: FormatSupport) {
        let mut state = self.state.write();
        if Arc::ptr_eq(&state.config, config) && state.format_support != support {
            state.format_support = support;
        }
    }

    #[instrument(skip_all, fields(contract = %contract.name))]
    pub async fn generate(
        &self,
        contract: &PromptContract,
        vars: &PromptVars,
        max_attempts: Option<u32>,
    ) -> Result<Map<String, Value>, GenerationError> {
        let attempts = self.config().attempts(max_attempts);
        let mut attempt = 1;

        loop {
            match self.attempt_once(contract, vars, attempt).await {
                Ok(payload) => return Ok(payload),
                Err((error, diagnostic)) => {
                    warn!(
                        contract = %contract.name,
                        attempt,
                        attempts,
                        error_kind = error.error_kind(),
                        error = %error,
                        "structured generation attempt failed"
                    );
                    if attempt >= attempts {
                        return Err(GenerationError {
                            contract: contract.name.clone(),
                            attempts: attempt,
                            source: error,
                            diagnostic: Box::new(diagnostic),
                        });
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        contract: &PromptContract,
        vars: &PromptVars,
        attempt: u32,
    ) -> Result<Map<String, Value>, (AttemptError, Diagnostic)> {
        let user = contract.render_user_prompt(vars);
        let (config, backend) = match self.acquire() {
            Ok(pair) => pair,
            Err(e) => {
                let config = self.config();
                let request = build_request(&config, contract, &user, attempt, false);
                let diagnostic = Diagnostic {
                    method: "POST".into(),
                    url: config.base_url.clone(),
                    payload: redact_value(&request.to_json()),
                    error: Some(e.to_string()),
                    ..Default::default()
                };
                return Err((e.into(), diagnostic));
            }
        };

        warn_if_oversize(contract, &config, &user);

        let with_format =
            contract.has_schema() && self.format_support() != FormatSupport::Unsupported;
        let request = build_request(&config, contract, &user, attempt, with_format);
        let exchange = self.exchange(&config, backend.as_ref(), request).await;

        let response_body = match &exchange.result {
            Ok(resp) => Some(resp.raw_body.clone()),
            Err(e) => e.response_body().map(str::to_owned),
        };
        let mut diagnostic = diagnose(backend.as_ref(), &exchange.request, response_body);
        if config.debug_payloads {
            debug!(contract = %contract.name, attempt, payload = %diagnostic, "llm debug payload");
        }

        let outcome = exchange
            .result
            .map_err(AttemptError::from)
            .and_then(|resp| {
                if resp.content.is_empty() {
                    Err(AttemptError::EmptyResponse)
                } else {
                    parse_json_object(&resp.content)
                }
            })
            .and_then(|payload| {
                contract.validate(&payload)?;
                Ok(payload)
            });

        outcome.map_err(|e| {
            diagnostic.error = Some(e.to_string());
            (e, diagnostic)
        })
    }

    /// Send `request`; on a format-hint rejection, cache the result and
    /// resend once as plain text.
    async fn exchange(
        &self,
        config: &Arc<RuntimeConfig>,
        backend: &dyn GenerationBackend,
        request: ChatRequest,
    ) -> Exchange {
        let result = backend.chat(&request).await;
        if request.format.is_none() {
            return Exchange { request, result };
        }

        match result {
            Err(e) if e.is_format_rejection() => {
                warn!(
                    backend = backend.name(),
                    error = %e,
                    "backend rejected structured output hint; retrying as plain text"
                );
                self.note_format_support(config, FormatSupport::Unsupported);
                let plain = request.without_format();
                let result = backend.chat(&plain).await;
                Exchange { request: plain, result }
            }
            Ok(resp) => {
                self.note_format_support(config, FormatSupport::Supported);
                Exchange { request, result: Ok(resp) }
            }
            Err(e) => Exchange { request, result: Err(e) },
        }
    }

    /// Lightweight connectivity check. Returns the backend's reply text.
    #[instrument(skip_all)]
    pub async fn ping(&self, prompt: Option<&str>) -> Result<String, AttemptError> {
        let (config, backend) = self.acquire()?;
        let mut options = config.sampling(0.0);
        options.num_predict = config.max_output_tokens.min(64);
        let request = ChatRequest::new(
            config.model.clone(),
            PING_SYSTEM_PROMPT,
            prompt.unwrap_or(DEFAULT_PING_PROMPT),
            options,
        );

        let reply = backend.chat(&request).await?;
        if reply.content.is_empty() {
            return Err(AttemptError::EmptyResponse);
        }
        info!(backend = backend.name(), model = %config.model, "generation backend reachable");
        Ok(reply.content)
    }
}

#[async_trait]
impl StructuredGenerator for GenerationClient {
    fn context_window(&self) -> u32 {
        self.config().context_window
    }

    async fn generate(
        &self,
        contract: &PromptContract,
        vars: &PromptVars,
        max_attempts: Option<u32>,
    ) -> Result<Map<String, Value>, GenerationError> {
        GenerationClient::generate(self, contract, vars, max_attempts).await
    }
}

/// First attempt samples at the configured temperature, retries at zero.
fn build_request(
    config: &RuntimeConfig,
    contract: &PromptContract,
    user: &str,
    attempt: u32,
    with_format: bool,
) -> ChatRequest {
    let temperature = if attempt == 1 { config.temperature } else { 0.0 };
    debug!(
        contract = %contract.name,
        attempt,
        temperature,
        max_tokens = config.max_output_tokens,
        "invoking generation backend"
    );
    ChatRequest::new(config.model.clone(), &contract.system_prompt, user, config.sampling(temperature))
        .with_format(with_format.then(|| contract.response_format()))
}

fn warn_if_oversize(contract: &PromptContract, config: &RuntimeConfig, user: &str) {
    let chars = contract.system_prompt.chars().count() + user.chars().count();
    let prompt_tokens = estimate_tokens(chars);
    if prompt_tokens > config.context_window as usize {
        warn!(
            contract = %contract.name,
            prompt_tokens,
            context_window = config.context_window,
            "prompt likely exceeds model context window"
        );
    }
}

fn diagnose(
    backend: &dyn GenerationBackend,
    request: &ChatRequest,
    response_body: Option<String>,
) -> Diagnostic {
    let headers: BTreeMap<String, String> = backend
        .headers()
        .into_iter()
        .map(|(name, value)| {
            let masked = redact_header(&name, &value);
            (name, masked)
        })
        .collect();
    Diagnostic {
        method: "POST".into(),
        url: backend.endpoint(),
        headers,
        payload: redact_value(&request.to_json()),
        response_body,
        error: None,
    }
}
