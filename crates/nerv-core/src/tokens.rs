/// Characters per token used by every budget estimate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximate token cost of `chars` characters, rounded up.
pub fn estimate_tokens(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Character allowance for a token budget.
pub fn budget_chars(tokens: usize) -> usize {
    tokens.saturating_mul(CHARS_PER_TOKEN)
}
