//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.

mod llm;
mod logging;
mod pipeline;

pub use llm::*;
pub use logging::*;
pub use pipeline::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "database": { "path": "/var/lib/nerv/nerv.db" },
///   "llm": { "model": "qwen2.5:7b", "contextWindow": 8192 },
///   "summarization": { "intervalSeconds": 1800 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NervSettings {
    pub database: DatabaseSettings,
    pub llm: LlmSettings,
    pub summarization: SummarizationSettings,
    pub logging: LoggingSettings,
    /// Audience profile for relevance evaluation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileSettings>,
}

impl NervSettings {
    /// Clamp values that have a hard floor.
    pub fn normalize(&mut self) {
        self.summarization.normalize();
        if self.llm.context_window == 0 {
            self.llm.context_window = LlmSettings::default().context_window;
        }
        if self.profile.as_ref().is_some_and(|p| p.content.trim().is_empty()) {
            self.profile = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(NervSettings::default()).unwrap();
        assert!(json["llm"].get("contextWindow").is_some());
        assert!(json["summarization"].get("maxRecentDocuments").is_some());
        assert!(json.get("profile").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: NervSettings =
            serde_json::from_str(r#"{"llm": {"model": "mistral"}}"#).unwrap();
        assert_eq!(settings.llm.model, "mistral");
        assert_eq!(settings.llm.max_retries, 3);
        assert_eq!(settings.summarization.interval_seconds, 3600);
    }

    #[test]
    fn normalize_drops_blank_profile() {
        let mut settings = NervSettings {
            profile: Some(ProfileSettings { title: "Desk".into(), content: "  ".into() }),
            ..Default::default()
        };
        settings.normalize();
        assert!(settings.profile.is_none());
    }
}
