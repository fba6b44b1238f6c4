//! Usage counters derived from text length.
//!
//! The remote service does not report token counts, so one unit is one
//! character. This is an approximation, not a tokenizer.

use docqa_core::Usage;

/// Usage for a prompt/completion pair.
pub fn estimate(prompt_text: &str, completion_text: &str) -> Usage {
    Usage::new(units(prompt_text), units(completion_text))
}

fn units(text: &str) -> u64 {
    text.chars().count() as u64
}
