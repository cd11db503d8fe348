//! Plain-text digests of documents fed to the writer and critic prompts.

use nerv_core::document::Document;

const BLURB_LIMIT: usize = 320;
const ELLIPSIS: &str = "...";

/// Share of the context allowance given to the recent digest, in percent.
const RECENT_SHARE_PERCENT: usize = 60;

/// Character allowances for the recent and historical digests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DigestBudget {
    pub recent: usize,
    pub historical: usize,
}

impl DigestBudget {
    pub fn split(total_chars: usize) -> Self {
        let recent = total_chars * RECENT_SHARE_PERCENT / 100;
        Self {
            recent,
            historical: total_chars - recent,
        }
    }
}

/// Cut `text` to at most `limit` characters, marking the cut with `...`.
pub fn truncate_text(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let head: String = text.chars().take(keep).collect();
    format!("{}{ELLIPSIS}", head.trim_end())
}

/// `- [2024-05-10 09:30 UTC] (Topic) Title: blurb`
pub fn format_snippet(doc: &Document) -> String {
    format!(
        "- [{}] ({}) {}: {}",
        doc.best_timestamp().format("%Y-%m-%d %H:%M UTC"),
        doc.topic().unwrap_or("General"),
        doc.display_title(),
        truncate_text(doc.blurb(), BLURB_LIMIT),
    )
}

/// Greedy newline-joined snippets within `char_limit`. The first snippet is
/// always kept, even when it alone exceeds the limit.
pub fn render_digest(docs: &[Document], char_limit: usize) -> String {
    let mut snippets: Vec<String> = Vec::new();
    let mut remaining = char_limit;
    for doc in docs {
        let snippet = format_snippet(doc);
        let cost = snippet.chars().count() + 1;
        if cost > remaining && !snippets.is_empty() {
            break;
        }
        remaining = remaining.saturating_sub(cost);
        snippets.push(snippet);
    }
    snippets.join("\n")
}

/// Both digests joined and capped at `char_limit`, for the critic.
pub fn combined_digest(recent: &str, historical: &str, char_limit: usize) -> String {
    let joined = [recent, historical]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    truncate_text(&joined, char_limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::document;
    use chrono::{TimeZone, Utc};

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 30, 0).unwrap()
    }

    #[test]
    fn budget_split_is_sixty_forty() {
        assert_eq!(DigestBudget::split(6000), DigestBudget { recent: 3600, historical: 2400 });
        assert_eq!(DigestBudget::split(5), DigestBudget { recent: 3, historical: 2 });
        assert_eq!(DigestBudget::split(0), DigestBudget { recent: 0, historical: 0 });
    }

    #[test]
    fn truncate_marks_cut_and_respects_limit() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_text("hello brave world", 10), "hello b...");
        assert_eq!(truncate_text("hello     world", 10), "hello...");
        assert_eq!(truncate_text("abcdef", 2), "...");
    }

    #[test]
    fn snippet_uses_brief_topic_and_timestamp() {
        let mut doc = document(1, at());
        doc.annotations.topic = Some("Energy".into());
        doc.annotations.brief_summary = Some("Grid upgrade approved.".into());
        assert_eq!(
            format_snippet(&doc),
            "- [2024-05-10 09:30 UTC] (Energy) Story 1: Grid upgrade approved."
        );
    }

    #[test]
    fn snippet_falls_back_to_general_url_and_summary() {
        let mut doc = document(2, at());
        doc.title = None;
        assert_eq!(
            format_snippet(&doc),
            "- [2024-05-10 09:30 UTC] (General) https://news.example/2: Summary 2"
        );
    }

    #[test]
    fn snippet_blurb_is_capped() {
        let mut doc = document(3, at());
        doc.summary = Some("w".repeat(400));
        let snippet = format_snippet(&doc);
        assert!(snippet.ends_with("..."));
        let blurb = snippet.split(": ").nth(1).unwrap();
        assert_eq!(blurb.chars().count(), 320);
    }

    #[test]
    fn digest_stops_when_budget_exhausted() {
        let docs: Vec<_> = (1..=3).map(|id| document(id, at())).collect();
        let one = format_snippet(&docs[0]).chars().count();
        let digest = render_digest(&docs, 2 * (one + 1));
        assert_eq!(digest.lines().count(), 2);
        let digest = render_digest(&docs, 2 * (one + 1) - 1);
        assert_eq!(digest.lines().count(), 1);
    }

    #[test]
    fn digest_keeps_first_snippet_even_when_oversized() {
        let docs = vec![document(1, at()), document(2, at())];
        let digest = render_digest(&docs, 5);
        assert_eq!(digest, format_snippet(&docs[0]));
    }

    #[test]
    fn empty_digest_for_no_documents() {
        assert_eq!(render_digest(&[], 100), "");
    }

    #[test]
    fn combined_digest_skips_empty_parts() {
        assert_eq!(combined_digest("a", "", 100), "a");
        assert_eq!(combined_digest("", "b", 100), "b");
        assert_eq!(combined_digest("a", "b", 100), "a\nb");
        assert_eq!(combined_digest("", "", 100), "");
    }
}
