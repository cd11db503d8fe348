use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::PromptVars;
use crate::ids::DocumentId;

/// Structured annotations written by enrichment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    pub location_name: Option<String>,
    pub location_country: Option<String>,
    pub location_confidence: Option<f64>,
    pub location_justification: Option<String>,
    pub topic: Option<String>,
    pub topic_confidence: Option<f64>,
    pub topic_supporting_points: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub category_confidence: Option<f64>,
    pub category_rationale: Option<String>,
    pub brief_summary: Option<String>,
}

impl Annotations {
    /// Copy every field set in `other` over this one.
    pub fn merge(&mut self, other: Annotations) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            location_name,
            location_country,
            location_confidence,
            location_justification,
            topic,
            topic_confidence,
            topic_supporting_points,
            category,
            subcategory,
            category_confidence,
            category_rationale,
            brief_summary
        );
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An ingested text document with its enrichment state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub url: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
    pub enriched_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub annotations: Annotations,
}

impl Document {
    pub fn is_enriched(&self) -> bool {
        self.enriched_at.is_some()
    }

    pub fn prompt_vars(&self) -> PromptVars {
        PromptVars::new()
            .with_opt("title", self.title.as_deref())
            .with_opt("summary", self.summary.as_deref())
            .with_opt("content", self.content.as_deref())
    }

    /// Whether any of title, summary or content carries text.
    pub fn has_text(&self) -> bool {
        [&self.title, &self.summary, &self.content]
            .into_iter()
            .flatten()
            .any(|text| !text.trim().is_empty())
    }

    /// Publication time, else enrichment time, else ingestion time.
    pub fn best_timestamp(&self) -> DateTime<Utc> {
        self.published_at.or(self.enriched_at).unwrap_or(self.ingested_at)
    }

    pub fn display_title(&self) -> &str {
        non_blank(self.title.as_deref()).unwrap_or(&self.url)
    }

    /// Short blurb for digests: the brief, else the source summary.
    pub fn blurb(&self) -> &str {
        non_blank(self.annotations.brief_summary.as_deref())
            .or_else(|| non_blank(self.summary.as_deref()))
            .unwrap_or_default()
    }

    pub fn topic(&self) -> Option<&str> {
        non_blank(self.annotations.topic.as_deref())
    }
}

/// Fields supplied by the ingestion collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub url: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Lenient numeric coercion for model-reported confidences.
pub fn coerce_confidence(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Text field from a model payload; lists are joined one item per line.
pub fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let lines: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc() -> Document {
        Document {
            id: DocumentId(1),
            url: "https://example.com/a".into(),
            title: None,
            summary: None,
            content: None,
            published_at: None,
            ingested_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            enriched_at: None,
            annotations: Annotations::default(),
        }
    }

    #[test]
    fn has_text_ignores_blank_fields() {
        let mut d = doc();
        assert!(!d.has_text());
        d.summary = Some("   ".into());
        assert!(!d.has_text());
        d.content = Some("body".into());
        assert!(d.has_text());
    }

    #[test]
    fn best_timestamp_priority() {
        let mut d = doc();
        assert_eq!(d.best_timestamp(), d.ingested_at);
        let enriched = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        d.enriched_at = Some(enriched);
        assert_eq!(d.best_timestamp(), enriched);
        let published = Utc.with_ymd_and_hms(2024, 4, 30, 22, 0, 0).unwrap();
        d.published_at = Some(published);
        assert_eq!(d.best_timestamp(), published);
    }

    #[test]
    fn display_title_falls_back_to_url() {
        let mut d = doc();
        assert_eq!(d.display_title(), "https://example.com/a");
        d.title = Some("Headline".into());
        assert_eq!(d.display_title(), "Headline");
    }

    #[test]
    fn blurb_prefers_brief() {
        let mut d = doc();
        d.summary = Some("feed summary".into());
        assert_eq!(d.blurb(), "feed summary");
        d.annotations.brief_summary = Some("model brief".into());
        assert_eq!(d.blurb(), "model brief");
    }

    #[test]
    fn prompt_vars_blank_for_missing_fields() {
        let mut d = doc();
        d.title = Some("T".into());
        let vars = d.prompt_vars();
        assert_eq!(vars.text("title"), "T");
        assert_eq!(vars.get("content"), Some(""));
    }

    #[test]
    fn merge_keeps_existing_when_absent() {
        let mut a = Annotations { topic: Some("Weather".into()), ..Default::default() };
        a.merge(Annotations { category: Some("Science".into()), ..Default::default() });
        assert_eq!(a.topic.as_deref(), Some("Weather"));
        assert_eq!(a.category.as_deref(), Some("Science"));
    }

    #[test]
    fn confidence_coercion_is_lenient() {
        assert_eq!(coerce_confidence(Some(&json!(0.7))), Some(0.7));
        assert_eq!(coerce_confidence(Some(&json!(" 0.25 "))), Some(0.25));
        assert_eq!(coerce_confidence(Some(&json!("high"))), None);
        assert_eq!(coerce_confidence(Some(&json!(null))), None);
        assert_eq!(coerce_confidence(None), None);
    }

    #[test]
    fn text_coercion_joins_lists() {
        assert_eq!(coerce_text(Some(&json!(["a", "b"]))).as_deref(), Some("a\nb"));
        assert_eq!(coerce_text(Some(&json!("x"))).as_deref(), Some("x"));
        assert_eq!(coerce_text(Some(&json!([]))), None);
        assert_eq!(coerce_text(Some(&json!(3))).as_deref(), Some("3"));
    }
}
