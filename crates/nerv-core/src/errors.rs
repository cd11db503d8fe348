use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Failure reported by a generation backend for a single exchange.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    /// The backend refused the structured-output hint. Recovered by the client.
    #[error("structured output format not supported: {0}")]
    FormatUnsupported(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("could not decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::FormatUnsupported(_) => "format_unsupported",
            Self::Timeout(_) => "timeout",
            Self::Decode(_) => "decode",
        }
    }

    /// Whether this error looks like the backend rejecting the format hint.
    pub fn is_format_rejection(&self) -> bool {
        match self {
            Self::FormatUnsupported(_) => true,
            Self::Status { body, .. } => mentions_format_rejection(body),
            Self::Transport(msg) | Self::Decode(msg) => mentions_format_rejection(msg),
            Self::Timeout(_) => false,
        }
    }

    /// Classify a non-success HTTP status. `format_sent` says whether the
    /// request carried a structured-output hint.
    pub fn from_status(status: u16, body: String, format_sent: bool) -> Self {
        if format_sent && (400..500).contains(&status) && mentions_format_rejection(&body) {
            Self::FormatUnsupported(body)
        } else {
            Self::Status { status, body }
        }
    }

    /// Response body attached to the error, if the backend produced one.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } | Self::FormatUnsupported(body) => Some(body),
            _ => None,
        }
    }
}

/// Capability-error heuristic: the word "format" together with a rejection token.
pub fn mentions_format_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("format")
        && ["unsupported", "not supported", "unknown", "invalid"]
            .iter()
            .any(|token| lower.contains(token))
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required fields in response: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("required fields contained empty strings: {}", .0.join(", "))]
    BlankFields(Vec<String>),
}

/// Why one generation attempt failed. Absorbed by the retry loop.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("empty response from backend")]
    EmptyResponse,
    #[error("no JSON object found in response: {0}")]
    Parse(String),
    #[error("response was not a JSON object")]
    NotAnObject,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl AttemptError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Backend(e) => e.error_kind(),
            Self::EmptyResponse => "empty_response",
            Self::Parse(_) => "parse",
            Self::NotAnObject => "not_an_object",
            Self::Validation(_) => "validation",
        }
    }
}

/// Redacted trace of the last exchange of a failed generation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Diagnostic {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{} {}", self.method, self.url),
        }
    }
}

/// Terminal failure after the retry ceiling was exhausted.
#[derive(Clone, Debug, thiserror::Error)]
#[error("failed to generate structured response for {contract} after {attempts} attempt(s): {source}")]
pub struct GenerationError {
    pub contract: String,
    pub attempts: u32,
    #[source]
    pub source: AttemptError,
    pub diagnostic: Box<Diagnostic>,
}

impl GenerationError {
    pub fn error_kind(&self) -> &'static str {
        self.source.error_kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_rejection_heuristic() {
        assert!(mentions_format_rejection("unsupported response format"));
        assert!(mentions_format_rejection("Invalid FORMAT value"));
        assert!(mentions_format_rejection("format json_schema is not supported"));
        assert!(mentions_format_rejection("unknown field: format"));
        assert!(!mentions_format_rejection("invalid model name"));
        assert!(!mentions_format_rejection("format ok"));
    }

    #[test]
    fn from_status_detects_format_rejection_only_with_hint() {
        let err = BackendError::from_status(400, "unsupported format".into(), true);
        assert!(matches!(err, BackendError::FormatUnsupported(_)));

        let err = BackendError::from_status(400, "unsupported format".into(), false);
        assert!(matches!(err, BackendError::Status { status: 400, .. }));

        let err = BackendError::from_status(500, "invalid format".into(), true);
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
    }

    #[test]
    fn status_body_counts_as_rejection() {
        let err = BackendError::Status { status: 400, body: "invalid format specified".into() };
        assert!(err.is_format_rejection());
        assert!(!BackendError::Timeout(Duration::from_secs(1)).is_format_rejection());
    }

    #[test]
    fn validation_messages_list_fields() {
        let err = ValidationError::MissingFields(vec!["topic".into(), "confidence".into()]);
        assert_eq!(err.to_string(), "missing required fields in response: topic, confidence");
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(AttemptError::EmptyResponse.error_kind(), "empty_response");
        assert_eq!(
            AttemptError::Backend(BackendError::Transport("refused".into())).error_kind(),
            "transport"
        );
        assert_eq!(
            AttemptError::Validation(ValidationError::BlankFields(vec![])).error_kind(),
            "validation"
        );
    }

    #[test]
    fn generation_error_display_names_contract() {
        let err = GenerationError {
            contract: "article_brief".into(),
            attempts: 3,
            source: AttemptError::EmptyResponse,
            diagnostic: Box::default(),
        };
        let msg = err.to_string();
        assert!(msg.contains("article_brief"));
        assert!(msg.contains("3 attempt"));
    }

    #[test]
    fn diagnostic_display_is_json() {
        let diag = Diagnostic {
            method: "POST".into(),
            url: "http://localhost:11434/api/chat".into(),
            payload: serde_json::json!({"model": "m"}),
            ..Default::default()
        };
        let parsed: Value = serde_json::from_str(&diag.to_string()).unwrap();
        assert_eq!(parsed["method"], "POST");
        assert!(parsed.get("headers").is_none());
    }
}
