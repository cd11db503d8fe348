use std::fmt;

use nerv_core::contract::{PromptContract, PromptVars};
use nerv_core::tokens::{budget_chars, estimate_tokens};
use tracing::warn;

/// How far a prompt had to be degraded to fit its token budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactionTier {
    None,
    SummarySubstitution,
    Empty,
    Truncated,
}

impl CompactionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SummarySubstitution => "summary",
            Self::Empty => "empty",
            Self::Truncated => "truncated",
        }
    }
}

impl fmt::Display for CompactionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FittedPrompt {
    pub vars: PromptVars,
    pub tier: CompactionTier,
    /// Rendered character cost after fitting.
    pub prompt_chars: usize,
}

/// Keeps a document prompt inside a token budget by degrading its
/// long-form field: summary substitution, then truncation, and as a last
/// resort an empty body.
#[derive(Clone, Debug)]
pub struct ContextBudgetFitter {
    content_key: &'static str,
    summary_key: &'static str,
    title_key: &'static str,
}

impl Default for ContextBudgetFitter {
    fn default() -> Self {
        Self {
            content_key: "content",
            summary_key: "summary",
            title_key: "title",
        }
    }
}

impl ContextBudgetFitter {
    /// Fit `vars` for `contract` into `token_budget`. A zero budget disables fitting.
    pub fn fit(&self, contract: &PromptContract, vars: &PromptVars, token_budget: usize) -> FittedPrompt {
        let chars = contract.rendered_chars(vars);
        let tokens = estimate_tokens(chars);
        if token_budget == 0 || tokens <= token_budget {
            return FittedPrompt {
                vars: vars.clone(),
                tier: CompactionTier::None,
                prompt_chars: chars,
            };
        }

        let content = vars.text(self.content_key);
        let summary = vars.text(self.summary_key);
        let title = vars.text(self.title_key);
        let mut fitted = vars.clone();

        if !summary.trim().is_empty() {
            fitted.set(self.content_key, summary);
            let chars = contract.rendered_chars(&fitted);
            if estimate_tokens(chars) <= token_budget {
                return self.degraded(contract, fitted, CompactionTier::SummarySubstitution, chars, tokens, token_budget);
            }
        }

        fitted.set(self.content_key, "");
        let static_chars = contract.rendered_chars(&fitted);
        if estimate_tokens(static_chars) > token_budget {
            return self.degraded(contract, fitted, CompactionTier::Empty, static_chars, tokens, token_budget);
        }

        let allowed = budget_chars(token_budget).saturating_sub(static_chars);
        let source = [content, summary, title]
            .into_iter()
            .find(|text| !text.is_empty())
            .unwrap_or_default();
        let truncated: String = source.chars().take(allowed).collect();
        fitted.set(self.content_key, truncated);
        let chars = contract.rendered_chars(&fitted);
        self.degraded(contract, fitted, CompactionTier::Truncated, chars, tokens, token_budget)
    }

    fn degraded(
        &self,
        contract: &PromptContract,
        vars: PromptVars,
        tier: CompactionTier,
        prompt_chars: usize,
        original_tokens: usize,
        token_budget: usize,
    ) -> FittedPrompt {
        warn!(
            contract = %contract.name,
            %tier,
            original_tokens,
            prompt_chars,
            prompt_tokens = estimate_tokens(prompt_chars),
            context_window = token_budget,
            field_chars = vars.text(self.content_key).chars().count(),
            "prompt compacted to fit context window"
        );
        FittedPrompt {
            vars,
            tier,
            prompt_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract() -> PromptContract {
        PromptContract::new(
            "fit_probe",
            "Sys.",
            "T:{title}\nS:{summary}\nC:{content}",
            json!({"type": "object", "required": []}),
        )
    }

    fn vars(title: &str, summary: Option<&str>, content: &str) -> PromptVars {
        PromptVars::new()
            .with("title", title)
            .with_opt("summary", summary)
            .with("content", content)
    }

    #[test]
    fn within_budget_is_untouched() {
        let input = vars("Title", Some("short"), "body");
        let fitted = ContextBudgetFitter::default().fit(&contract(), &input, 30);
        assert_eq!(fitted.tier, CompactionTier::None);
        assert_eq!(fitted.vars, input);
    }

    #[test]
    fn zero_budget_disables_fitting() {
        let input = vars("Title", None, &"x".repeat(500));
        let fitted = ContextBudgetFitter::default().fit(&contract(), &input, 0);
        assert_eq!(fitted.tier, CompactionTier::None);
        assert_eq!(fitted.vars, input);
    }

    #[test]
    fn summary_replaces_oversized_content() {
        let input = vars("Title", Some("A short summary."), &"x".repeat(500));
        let fitted = ContextBudgetFitter::default().fit(&contract(), &input, 30);
        assert_eq!(fitted.tier, CompactionTier::SummarySubstitution);
        assert_eq!(fitted.vars.text("content"), "A short summary.");
        assert_eq!(fitted.vars.text("summary"), "A short summary.");
    }

    #[test]
    fn missing_summary_truncates_to_prefix() {
        let original = "x".repeat(500);
        let input = vars("Title", None, &original);
        let fitted = ContextBudgetFitter::default().fit(&contract(), &input, 30);
        assert_eq!(fitted.tier, CompactionTier::Truncated);
        let content = fitted.vars.text("content");
        assert!(content.len() <= 120);
        assert!(!content.is_empty());
        assert!(original.starts_with(content));
        assert!(estimate_tokens(fitted.prompt_chars) <= 30);
        assert_eq!(fitted.vars.text("summary"), "");
    }

    #[test]
    fn oversized_summary_falls_through_to_truncation() {
        let summary = "s".repeat(300);
        let content = "c".repeat(500);
        let input = vars("Title", Some(&summary), &content);
        let fitted = ContextBudgetFitter::default().fit(&contract(), &input, 100);
        assert_eq!(fitted.tier, CompactionTier::Truncated);
        assert!(content.starts_with(fitted.vars.text("content")));
        assert!(fitted.vars.text("content").len() < content.len());
    }

    #[test]
    fn static_overflow_blanks_content() {
        let input = vars(&"t".repeat(400), None, &"x".repeat(500));
        let fitted = ContextBudgetFitter::default().fit(&contract(), &input, 30);
        assert_eq!(fitted.tier, CompactionTier::Empty);
        assert_eq!(fitted.vars.text("content"), "");
        assert_eq!(fitted.vars.text("title"), "t".repeat(400));
    }

    #[test]
    fn caller_input_is_not_mutated() {
        let input = vars("Title", Some("short"), &"x".repeat(500));
        let before = input.clone();
        let _ = ContextBudgetFitter::default().fit(&contract(), &input, 30);
        assert_eq!(input, before);
    }

    #[test]
    fn multibyte_content_truncates_on_char_boundary() {
        let original = "é".repeat(500);
        let input = vars("Title", None, &original);
        let fitted = ContextBudgetFitter::default().fit(&contract(), &input, 30);
        assert_eq!(fitted.tier, CompactionTier::Truncated);
        assert!(original.starts_with(fitted.vars.text("content")));
    }
}
