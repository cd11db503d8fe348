use std::sync::LazyLock;

use nerv_core::contract::PromptContract;
use serde_json::json;

/// Drafts the periodic desk update from the rendered digests.
pub static WRITER: LazyLock<PromptContract> = LazyLock::new(|| {
    PromptContract::new(
        "reporter_hourly_summary",
        "You are a seasoned newsroom reporter. Compile a cohesive desk update that prioritises \
         clarity, accuracy and actionable insight for editors. Write with calm authority and \
         keep the tone factual yet vivid.",
        "Time window: {time_window}

Recent coverage:
{recent_context}

Historical background:
{historical_context}

Editor feedback to address (if any):
{feedback}

Craft an update that includes a sharp headline, a tight summary paragraph,
and a list of 3-6 bullet points covering key developments, context, and any
outstanding questions. Stay within newsroom voice guidelines and avoid repetition.
",
        json!({
            "type": "object",
            "properties": {
                "headline": {"type": "string"},
                "summary": {"type": "string"},
                "key_points": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["headline", "summary", "key_points"],
        }),
    )
});

/// Reviews a draft. Only `should_revise` is mandatory; an approving
/// reviewer often leaves the other fields blank.
pub static CRITIC: LazyLock<PromptContract> = LazyLock::new(|| {
    PromptContract::new(
        "editorial_critic_review",
        "You are a meticulous newsroom editor. Review reporter drafts, flag factual or \
         structural issues, and suggest precise improvements. Focus on accuracy, completeness \
         and narrative flow.",
        "Time window: {time_window}

Draft under review:
Headline: {draft_headline}
Summary: {draft_summary}
Key points:
{draft_key_points}

Context supplied to the reporter:
{context_digest}

Provide structured feedback. Mark should_revise true only if revisions are
necessary. Offer concise strengths, issues, and specific revision guidance.
",
        json!({
            "type": "object",
            "properties": {
                "should_revise": {"type": "boolean"},
                "strengths": {"type": "string"},
                "issues": {"type": "string"},
                "revision_guidance": {"type": "string"},
            },
            "required": ["should_revise"],
        }),
    )
});
