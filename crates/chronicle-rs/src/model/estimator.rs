//! Character-based token estimation.
//!
//! A fast, provider-agnostic stand-in for a real tokenizer. Most tokenizers
//! average 3-4 characters per token on English text; the default of 4 matches
//! the usual rule of thumb. Each message also pays a fixed overhead for its
//! role and delimiters, which is what makes an extra system message visible
//! when comparing candidate prompts.

use crate::Message;

/// Default characters per token.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Tokens charged per message for role and framing.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Estimates token counts from character counts.
#[derive(Debug, Clone, Copy)]
pub struct CharEstimator {
    chars_per_token: f64,
    message_overhead: usize,
}

impl Default for CharEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            message_overhead: MESSAGE_OVERHEAD_TOKENS,
        }
    }
}

impl CharEstimator {
    /// Create an estimator with a calibrated chars-per-token ratio. Pass
    /// `None` to use the default. Non-positive ratios fall back to the default.
    pub fn with_calibration(calibrated_cpt: Option<f64>) -> Self {
        let cpt = calibrated_cpt
            .filter(|c| *c > 0.0)
            .unwrap_or(DEFAULT_CHARS_PER_TOKEN);
        Self {
            chars_per_token: cpt,
            ..Self::default()
        }
    }

    /// Override the per-message overhead.
    pub fn with_message_overhead(mut self, tokens: usize) -> Self {
        self.message_overhead = tokens;
        self
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// Estimate tokens for a piece of text, rounding up.
    pub fn estimate_text(&self, text: &str) -> usize {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as usize
    }

    /// Estimate tokens for a message sequence.
    pub fn estimate(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate_text(&m.content) + self.message_overhead)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sequence_is_zero() {
        assert_eq!(CharEstimator::default().estimate(&[]), 0);
    }

    #[test]
    fn rounds_up_partial_tokens() {
        let est = CharEstimator::default();
        assert_eq!(est.estimate_text("abcd"), 1);
        assert_eq!(est.estimate_text("abcde"), 2);
        assert_eq!(est.estimate_text(""), 0);
    }

    #[test]
    fn charges_overhead_per_message() {
        let est = CharEstimator::default();
        let messages = vec![Message::user("abcd"), Message::assistant("abcdefgh")];
        assert_eq!(est.estimate(&messages), 1 + 4 + 2 + 4);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let est = CharEstimator::default();
        assert_eq!(est.estimate_text("éééé"), 1);
    }

    #[test]
    fn calibrated_estimator_uses_custom_ratio() {
        let default = CharEstimator::default();
        let calibrated = CharEstimator::with_calibration(Some(8.0));
        let text = "a".repeat(400);
        assert_eq!(default.estimate_text(&text), 100);
        assert_eq!(calibrated.estimate_text(&text), 50);
    }

    #[test]
    fn invalid_calibration_falls_back() {
        let est = CharEstimator::with_calibration(Some(0.0));
        assert_eq!(est.chars_per_token(), DEFAULT_CHARS_PER_TOKEN);
    }

    #[test]
    fn overhead_override() {
        let est = CharEstimator::default().with_message_overhead(0);
        assert_eq!(est.estimate(&[Message::user("abcd")]), 1);
    }
}
