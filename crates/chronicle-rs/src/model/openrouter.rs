//! OpenRouter-backed [`LanguageModel`].
//!
//! Completions go through [`OpenRouterClient`]; token counts come from a
//! local [`CharEstimator`], since OpenRouter exposes no tokenizer endpoint.

use tracing::debug;

use super::{BlockingLanguageModel, CharEstimator, CompletionRequest, LanguageModel, ModelFuture};
use crate::error::{ConfigError, ModelError};
use crate::{ChatCompletion, ChatRequest, Message, OpenRouterClient, ResponseFormat};

/// The bundled completion and token-count provider.
pub struct OpenRouterModel {
    client: OpenRouterClient,
    estimator: CharEstimator,
}

impl OpenRouterModel {
    /// Build a provider for the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let client = OpenRouterClient::new(api_key).map_err(ConfigError::HttpClient)?;
        Ok(Self::from_client(client))
    }

    /// Wrap an existing client.
    pub fn from_client(client: OpenRouterClient) -> Self {
        Self {
            client,
            estimator: CharEstimator::default(),
        }
    }

    /// Use a different token estimator.
    pub fn with_estimator(mut self, estimator: CharEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn client(&self) -> &OpenRouterClient {
        &self.client
    }
}

/// Translate a provider-neutral request into the OpenRouter wire format.
fn to_chat_request(request: &CompletionRequest) -> ChatRequest {
    ChatRequest {
        model: Some(request.model.clone()),
        messages: request.messages.clone(),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        response_format: request
            .structured_output
            .then(ResponseFormat::json_object),
    }
}

fn completion_text(completion: ChatCompletion) -> Result<String, ModelError> {
    match completion.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ModelError::EmptyResponse),
    }
}

impl LanguageModel for OpenRouterModel {
    fn count_tokens(&self, messages: &[Message], model: &str) -> Result<usize, ModelError> {
        let tokens = self.estimator.estimate(messages);
        debug!("Estimated {tokens} tokens for {} message(s) on {model}", messages.len());
        Ok(tokens)
    }

    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> ModelFuture<'a, String> {
        Box::pin(async move {
            let body = to_chat_request(request);
            let completion = self.client.chat(&body).await.map_err(ModelError::Request)?;
            completion_text(completion)
        })
    }
}

impl BlockingLanguageModel for OpenRouterModel {
    fn complete_blocking(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let body = to_chat_request(request);
        let completion = self
            .client
            .chat_blocking(&body)
            .map_err(ModelError::Request)?;
        completion_text(completion)
    }
}
