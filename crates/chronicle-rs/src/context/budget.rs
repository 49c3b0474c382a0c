//! Token budget decisions: when a history counts as bloated, and which of
//! the two candidate prompts a turn returns.
//!
//! Both are pure functions of token counts; the counts themselves come from
//! the model's token oracle.

use serde::{Deserialize, Serialize};

use crate::Message;

/// Bloat threshold for a session's prompt.
///
/// A history is bloated when its token count is strictly greater than the
/// threshold. Exactly at the threshold is fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    threshold: usize,
}

impl TokenBudget {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_bloated(&self, tokens: usize) -> bool {
        tokens > self.threshold
    }
}

/// Which candidate a turn returned.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// The hydrated prompt built from compact state.
    Smart,
    /// The raw history plus the new message, untouched.
    Naive,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smart => "smart",
            Self::Naive => "naive",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The winning prompt and its token count.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub messages: Vec<Message>,
    pub strategy: Strategy,
    pub tokens: usize,
}

/// Pick the hydrated prompt unless it costs more than the naive one.
///
/// Ties go to the hydrated prompt, so a turn never returns more tokens than
/// doing nothing would have.
pub fn select_best(
    hydrated: Vec<Message>,
    hydrated_tokens: usize,
    naive: Vec<Message>,
    naive_tokens: usize,
) -> Selection {
    if hydrated_tokens > naive_tokens {
        Selection {
            messages: naive,
            strategy: Strategy::Naive,
            tokens: naive_tokens,
        }
    } else {
        Selection {
            messages: hydrated,
            strategy: Strategy::Smart,
            tokens: hydrated_tokens,
        }
    }
}

/// Tokens saved relative to the naive prompt. Never negative.
pub fn tokens_saved(original_tokens: usize, final_tokens: usize) -> usize {
    original_tokens.saturating_sub(final_tokens)
}
