use std::sync::LazyLock;

use nerv_core::contract::PromptContract;
use serde_json::json;

const DOCUMENT_BLOCK: &str = "Title: {title}
Summary: {summary}
Body:
{content}
";

pub static LOCATION: LazyLock<PromptContract> = LazyLock::new(|| {
    PromptContract::new(
        "article_location_extraction",
        "You are a geoparsing expert. Given article text, identify the single most relevant \
         location discussed. Respond with compact JSON following the provided schema. If no \
         location is evident, return nulls while keeping the JSON structure.",
        format!("{DOCUMENT_BLOCK}\nProvide the dominant location focus for this article.\n"),
        json!({
            "type": "object",
            "properties": {
                "location_name": {"type": ["string", "null"]},
                "country": {"type": ["string", "null"]},
                "confidence": {"type": ["number", "null"], "minimum": 0, "maximum": 1},
                "justification": {"type": ["string", "null"]},
            },
            "required": ["location_name", "confidence"],
        }),
    )
});

pub static TOPIC: LazyLock<PromptContract> = LazyLock::new(|| {
    PromptContract::new(
        "article_topic_identification",
        "You are a news analyst who summarises the central topic of an article. \
         Return structured JSON with the requested fields.",
        format!("{DOCUMENT_BLOCK}\nState the primary topic in under ten words.\n"),
        json!({
            "type": "object",
            "properties": {
                "topic": {"type": ["string", "null"]},
                "confidence": {"type": ["number", "null"], "minimum": 0, "maximum": 1},
                "supporting_points": {"type": ["string", "null"]},
            },
            "required": ["topic", "confidence"],
        }),
    )
});

const TAXONOMY: &str = "Allowed categories:
  - Politics
    - Elections
    - Policy
    - Diplomacy
  - Business
    - Markets
    - Companies
    - Economy
  - Technology
    - AI
    - Gadgets
    - Cybersecurity
  - Culture
    - Entertainment
    - Art
    - Lifestyle
  - Science
    - Space
    - Environment
    - Health
";

pub static CATEGORY: LazyLock<PromptContract> = LazyLock::new(|| {
    PromptContract::new(
        "article_category_classification",
        "You assign newsroom taxonomy labels. Choose the best matching category and \
         subcategory from the provided options. Answer strictly in JSON.",
        format!("{TAXONOMY}\n{DOCUMENT_BLOCK}\nReturn the best category and subcategory.\n"),
        json!({
            "type": "object",
            "properties": {
                "category": {"type": ["string", "null"]},
                "subcategory": {"type": ["string", "null"]},
                "confidence": {"type": ["number", "null"], "minimum": 0, "maximum": 1},
                "rationale": {"type": ["string", "null"]},
            },
            "required": ["category", "subcategory"],
        }),
    )
});

pub static BRIEF: LazyLock<PromptContract> = LazyLock::new(|| {
    PromptContract::new(
        "article_brief",
        "You are an assistant that writes concise, news-style capsules about a single article. \
         Capture the essential facts in at most three sentences while keeping neutral tone and \
         avoiding speculation.",
        "Title: {title}
Summary: {summary}
Content: {content}

Produce a 2-3 sentence brief (<= 70 words) that highlights the who, what, when,
where, and why if available.
",
        json!({
            "type": "object",
            "properties": {
                "brief": {"type": "string"},
            },
            "required": ["brief"],
        }),
    )
});
