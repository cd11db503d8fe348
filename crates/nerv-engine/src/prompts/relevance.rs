use std::sync::LazyLock;

use nerv_core::contract::PromptContract;
use serde_json::json;

pub static RELEVANCE: LazyLock<PromptContract> = LazyLock::new(|| {
    let overall = json!({
        "type": "object",
        "properties": {
            "score": {"type": "integer"},
            "label": {"type": "string"},
            "explanation": {"type": "string"},
        },
        "required": ["score", "label", "explanation"],
    });
    let rating = json!({
        "type": "object",
        "properties": {
            "score": {"type": "integer"},
            "label": {"type": "string"},
        },
        "required": ["score", "label"],
    });

    PromptContract::new(
        "summary_relevance_rating",
        "You are an intelligence editor tasked with evaluating newsroom summaries for a \
         specific audience profile. Rate each key point on relevance to the profile and \
         operational criticality. Use calibrated language and justify the ratings with \
         concise reasoning.",
        r#"Audience profile:
{profile}

Summary headline: {headline}
Summary paragraph: {summary}

Key points:
{key_points}

Produce JSON containing:
- overall_relevance: {{"score": 0-5 integer, "label": string, "explanation": string}}
- overall_criticality: same schema as overall_relevance
- items: list matching key_points order with objects containing:
    * key_point: string (copied)
    * relevance: {{"score": 0-5 integer, "label": string}}
    * criticality: {{"score": 0-5 integer, "label": string}}
    * explanation: string giving 1-2 sentence rationale
    * escalation: string with guidance ("monitor", "escalate", or "inform")
Use "High", "Medium", or "Low" as labels. Default to score 0 and label "Low"
when information is insufficient. Ensure list lengths match."#,
        json!({
            "type": "object",
            "properties": {
                "overall_relevance": overall,
                "overall_criticality": overall,
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "key_point": {"type": "string"},
                            "relevance": rating,
                            "criticality": rating,
                            "explanation": {"type": "string"},
                            "escalation": {"type": "string"},
                        },
                        "required": ["key_point", "relevance", "criticality", "explanation", "escalation"],
                    },
                },
            },
            "required": ["overall_relevance", "overall_criticality", "items"],
        }),
    )
});
