use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// SQLite file path. `:memory:` opens a throwaway database.
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: "nerv.db".to_string() }
    }
}

/// Summarization cycle settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarizationSettings {
    /// Nominal cycle length; the window never reaches further back than this.
    pub interval_seconds: u64,
    /// Character allowance shared by the recent and historical digests.
    pub context_window_chars: usize,
    pub max_iterations: u32,
    /// Historical lookback. Zero disables historical context.
    pub historical_days: u32,
    pub max_recent_documents: usize,
    pub max_historical_per_topic: usize,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
            context_window_chars: 6000,
            max_iterations: 3,
            historical_days: 7,
            max_recent_documents: 15,
            max_historical_per_topic: 3,
        }
    }
}

impl SummarizationSettings {
    pub fn normalize(&mut self) {
        self.max_iterations = self.max_iterations.max(1);
        self.max_recent_documents = self.max_recent_documents.max(1);
        self.max_historical_per_topic = self.max_historical_per_topic.max(1);
    }
}

/// Audience profile used when rating a synthesis for relevance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileSettings {
    pub title: String,
    pub content: String,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self { title: "Default Audience".to_string(), content: String::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_enforces_floors() {
        let mut s = SummarizationSettings {
            max_iterations: 0,
            max_recent_documents: 0,
            max_historical_per_topic: 0,
            historical_days: 0,
            ..Default::default()
        };
        s.normalize();
        assert_eq!(s.max_iterations, 1);
        assert_eq!(s.max_recent_documents, 1);
        assert_eq!(s.max_historical_per_topic, 1);
        assert_eq!(s.historical_days, 0);
    }
}
