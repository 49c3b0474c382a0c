//! Model capabilities consumed by the engine: chat completion and token
//! counting.
//!
//! The engine never talks to a provider directly. It needs two oracles:
//!
//! - a **token counter** to detect bloat and compare candidate prompts, and
//! - a **completion** call, used by the
//!   [`Compressor`](crate::context::compressor::Compressor) in JSON mode.
//!
//! Both live on [`LanguageModel`]. Providers that can also complete without
//! an async runtime implement [`BlockingLanguageModel`], which is what
//! [`Engine::process_turn_blocking`](crate::engine::Engine::process_turn_blocking)
//! requires.
//!
//! - [`estimator`]: [`CharEstimator`], a characters-per-token heuristic.
//! - [`openrouter`]: [`OpenRouterModel`], the bundled provider.

pub mod estimator;
pub mod openrouter;

pub use estimator::CharEstimator;
pub use openrouter::OpenRouterModel;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::Message;
use crate::error::ModelError;

/// Boxed future returned by async model operations.
pub type ModelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ModelError>> + Send + 'a>>;

/// A single completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    pub messages: Vec<Message>,
    /// Ask the provider for a JSON object response.
    pub structured_output: bool,
    /// Upper bound on generated tokens. `0` leaves it to the provider.
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Completion and token-count oracle.
///
/// Implementors only need [`count_tokens`](Self::count_tokens) and
/// [`complete`](Self::complete). Providers whose tokenizer is remote should
/// also override [`count_tokens_async`](Self::count_tokens_async).
pub trait LanguageModel: Send + Sync {
    /// Count the tokens `messages` would occupy in a prompt for `model`.
    fn count_tokens(&self, messages: &[Message], model: &str) -> Result<usize, ModelError>;

    /// Async token count. Defaults to the synchronous count.
    fn count_tokens_async<'a>(
        &'a self,
        messages: &'a [Message],
        model: &'a str,
    ) -> ModelFuture<'a, usize> {
        Box::pin(std::future::ready(self.count_tokens(messages, model)))
    }

    /// Count bare text as a single user message.
    fn count_text(&self, text: &str, model: &str) -> Result<usize, ModelError> {
        self.count_tokens(&[Message::user(text)], model)
    }

    /// Generate a completion and return its text.
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> ModelFuture<'a, String>;
}

/// A [`LanguageModel`] that can also complete on the calling thread.
pub trait BlockingLanguageModel: LanguageModel {
    fn complete_blocking(&self, request: &CompletionRequest) -> Result<String, ModelError>;
}

impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    fn count_tokens(&self, messages: &[Message], model: &str) -> Result<usize, ModelError> {
        (**self).count_tokens(messages, model)
    }

    fn count_tokens_async<'a>(
        &'a self,
        messages: &'a [Message],
        model: &'a str,
    ) -> ModelFuture<'a, usize> {
        (**self).count_tokens_async(messages, model)
    }

    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> ModelFuture<'a, String> {
        (**self).complete(request)
    }
}

impl<T: BlockingLanguageModel + ?Sized> BlockingLanguageModel for Arc<T> {
    fn complete_blocking(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        (**self).complete_blocking(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WordCounter;

    impl LanguageModel for WordCounter {
        fn count_tokens(&self, messages: &[Message], _model: &str) -> Result<usize, ModelError> {
            Ok(messages
                .iter()
                .map(|m| m.content.split_whitespace().count())
                .sum())
        }

        fn complete<'a>(&'a self, _request: &'a CompletionRequest) -> ModelFuture<'a, String> {
            Box::pin(async { Ok("done".to_string()) })
        }
    }

    #[test]
    fn count_text_counts_as_one_user_message() {
        assert_eq!(WordCounter.count_text("three short words", "m").unwrap(), 3);
    }

    #[tokio::test]
    async fn async_count_defaults_to_sync_count() {
        let messages = vec![Message::user("a b"), Message::assistant("c")];
        let model = WordCounter;
        assert_eq!(model.count_tokens_async(&messages, "m").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn arc_delegates() {
        let model: Arc<dyn LanguageModel> = Arc::new(WordCounter);
        assert_eq!(model.count_text("x y", "m").unwrap(), 2);
        let request = CompletionRequest {
            model: "m".into(),
            messages: vec![],
            structured_output: false,
            max_tokens: 0,
            temperature: 0.0,
        };
        assert_eq!(model.complete(&request).await.unwrap(), "done");
    }
}
