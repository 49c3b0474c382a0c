//! LLM-backed compression of raw history into a summary and fact ledger.
//!
//! One request per call, no retries: the current summary, the current facts,
//! and the new raw turns go in; a JSON object with exactly `summary` and
//! `fact_ledger` comes out. The model is told to merge rather than replace
//! prior facts. Anything that goes wrong (oracle error, invalid JSON, wrong
//! shape) is logged and reported as `None`, so the caller keeps its prior
//! state. Timeouts are the caller's business.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::Message;
use crate::error::ModelError;
use crate::model::{BlockingLanguageModel, CompletionRequest, LanguageModel};
use crate::store::FactLedger;

/// System message for every compression request.
const SYSTEM_PROMPT: &str = "You are a precise JSON state manager.";

/// Instructions leading the user message.
const COMPRESSION_PROMPT: &str = "\
You are the Chronicle engine. Compress the chat history below into a concise \
narrative summary and a structured fact ledger.

Rules:
- Output a single valid JSON object with exactly two keys: \"summary\" and \"fact_ledger\".
- \"summary\": the updated narrative summary of the whole conversation so far.
- \"fact_ledger\": an object mapping fact names to values (strings or nested objects) \
  about the user or project.
- Merge new information into the current facts. Keep every prior fact unless the new \
  messages correct or supersede it.
- Do not lose important details: names, numbers, decisions, preferences, open questions.";

/// Settings for compression requests.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressorConfig {
    /// Maximum tokens for the compression response.
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 2048,
            temperature: 0.2,
        }
    }
}

/// The new compact state produced by a successful compression.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CompressionResult {
    /// Updated narrative summary.
    pub summary: String,
    /// Updated fact ledger, prior facts merged in.
    pub fact_ledger: FactLedger,
}

/// Why a compression attempt produced nothing.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response has the wrong shape: {0}")]
    Shape(String),
}

/// Builds compression requests and parses their results. Stateless.
#[derive(Debug, Clone)]
pub struct Compressor {
    config: CompressorConfig,
    schema: serde_json::Value,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressorConfig::default())
    }
}

impl Compressor {
    pub fn new(config: CompressorConfig) -> Self {
        Self {
            config,
            schema: crate::json_schema_for::<CompressionResult>(),
        }
    }

    /// JSON schema the response must satisfy.
    pub fn schema(&self) -> &serde_json::Value {
        &self.schema
    }

    /// Build the (system, user) request for one compression.
    pub fn build_request(
        &self,
        model: &str,
        raw_history: &[Message],
        current_summary: &str,
        current_facts: &FactLedger,
    ) -> CompletionRequest {
        let facts = serde_json::to_string_pretty(current_facts).unwrap_or_else(|_| "{}".into());
        let history = serde_json::to_string(raw_history).unwrap_or_else(|_| "[]".into());
        let schema = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        let summary = if current_summary.is_empty() {
            "(none yet)"
        } else {
            current_summary
        };

        let mut content = String::from(COMPRESSION_PROMPT);
        content.push_str("\n\n=== CURRENT SUMMARY ===\n");
        content.push_str(summary);
        content.push_str("\n\n=== CURRENT FACTS ===\n");
        content.push_str(&facts);
        content.push_str("\n\n=== NEW CHAT HISTORY ===\n");
        content.push_str(&history);
        content.push_str("\n\n=== OUTPUT SCHEMA ===\n");
        content.push_str(&schema);

        CompletionRequest {
            model: model.to_string(),
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(content)],
            structured_output: true,
            max_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Parse and validate a completion.
    pub fn parse_response(&self, text: &str) -> Result<CompressionResult, CompressionError> {
        let value: serde_json::Value = serde_json::from_str(strip_code_fence(text))?;

        match jsonschema::validator_for(&self.schema) {
            Ok(validator) => {
                let errors: Vec<String> = validator
                    .iter_errors(&value)
                    .map(|e| format!("{}: {e}", e.instance_path()))
                    .collect();
                if !errors.is_empty() {
                    return Err(CompressionError::Shape(errors.join("; ")));
                }
            }
            Err(e) => warn!("Compression schema failed to compile, skipping validation: {e}"),
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Compress through an async model. `None` means keep the prior state.
    pub async fn compress<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        model_id: &str,
        raw_history: &[Message],
        current_summary: &str,
        current_facts: &FactLedger,
    ) -> Option<CompressionResult> {
        let request = self.build_request(model_id, raw_history, current_summary, current_facts);
        let outcome = match model.complete(&request).await {
            Ok(text) => self.parse_response(&text),
            Err(e) => Err(e.into()),
        };
        finish(outcome, raw_history.len())
    }

    /// Compress on the calling thread. `None` means keep the prior state.
    pub fn compress_blocking<M: BlockingLanguageModel + ?Sized>(
        &self,
        model: &M,
        model_id: &str,
        raw_history: &[Message],
        current_summary: &str,
        current_facts: &FactLedger,
    ) -> Option<CompressionResult> {
        let request = self.build_request(model_id, raw_history, current_summary, current_facts);
        let outcome = model
            .complete_blocking(&request)
            .map_err(CompressionError::from)
            .and_then(|text| self.parse_response(&text));
        finish(outcome, raw_history.len())
    }
}

fn finish(
    outcome: Result<CompressionResult, CompressionError>,
    history_len: usize,
) -> Option<CompressionResult> {
    match outcome {
        Ok(result) => {
            debug!(
                "Compressed {history_len} message(s) into {} chars of summary and {} fact(s)",
                result.summary.len(),
                result.fact_ledger.len()
            );
            Some(result)
        }
        Err(e) => {
            warn!("Compression failed: {e}. Keeping prior state.");
            None
        }
    }
}

/// Drop a surrounding Markdown code fence, which some models add even in
/// JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.strip_prefix("json").unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelFuture;

    fn facts(pairs: &[(&str, &str)]) -> FactLedger {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect()
    }

    /// Answers every completion with a fixed result.
    struct Canned(Result<&'static str, &'static str>);

    impl LanguageModel for Canned {
        fn count_tokens(&self, _: &[Message], _: &str) -> Result<usize, ModelError> {
            Ok(0)
        }

        fn complete<'a>(&'a self, _request: &'a CompletionRequest) -> ModelFuture<'a, String> {
            let reply = self
                .0
                .map(str::to_string)
                .map_err(|e| ModelError::Request(e.to_string()));
            Box::pin(async move { reply })
        }
    }

    impl BlockingLanguageModel for Canned {
        fn complete_blocking(&self, _request: &CompletionRequest) -> Result<String, ModelError> {
            self.0
                .map(str::to_string)
                .map_err(|e| ModelError::Request(e.to_string()))
        }
    }

    #[test]
    fn request_embeds_state_and_history() {
        let compressor = Compressor::default();
        let history = vec![
            Message::user("I moved to Lisbon."),
            Message::assistant("Noted!"),
        ];
        let request = compressor.build_request(
            "worker",
            &history,
            "User is Ada.",
            &facts(&[("name", "Ada")]),
        );

        assert_eq!(request.model, "worker");
        assert!(request.structured_output);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0], Message::system(SYSTEM_PROMPT));

        let user = &request.messages[1].content;
        assert!(user.contains("User is Ada."));
        assert!(user.contains("\"name\": \"Ada\""));
        assert!(user.contains("I moved to Lisbon."));
        assert!(user.contains("\"summary\" and \"fact_ledger\""));
        assert!(user.contains("Merge new information"));
    }

    #[test]
    fn request_marks_missing_summary() {
        let request = Compressor::default().build_request("m", &[], "", &FactLedger::new());
        assert!(request.messages[1].content.contains("(none yet)"));
    }

    #[test]
    fn request_uses_configured_limits() {
        let compressor = Compressor::new(CompressorConfig {
            max_output_tokens: 300,
            temperature: 0.0,
        });
        let request = compressor.build_request("m", &[], "", &FactLedger::new());
        assert_eq!(request.max_tokens, 300);
        assert_eq!(request.temperature, 0.0);
    }

    #[test]
    fn parses_valid_result() {
        let result = Compressor::default()
            .parse_response(r#"{"summary": "s", "fact_ledger": {"name": "X", "pets": {"cat": "Tom"}}}"#)
            .unwrap();
        assert_eq!(result.summary, "s");
        assert_eq!(result.fact_ledger["name"], "X");
        assert_eq!(result.fact_ledger["pets"]["cat"], "Tom");
    }

    #[test]
    fn parses_fenced_result() {
        let text = "```json\n{\"summary\": \"s\", \"fact_ledger\": {}}\n```";
        assert!(Compressor::default().parse_response(text).is_ok());
    }

    #[test]
    fn schema_compiles_into_a_validator() {
        let compressor = Compressor::default();
        assert!(jsonschema::validator_for(compressor.schema()).is_ok());
        assert_eq!(compressor.schema()["additionalProperties"], false);
    }

    #[test]
    fn rejects_invalid_json() {
        let err = Compressor::default().parse_response("not json").unwrap_err();
        assert!(matches!(err, CompressionError::InvalidJson(_)));
    }

    #[test]
    fn rejects_missing_key() {
        let err = Compressor::default()
            .parse_response(r#"{"summary": "s"}"#)
            .unwrap_err();
        assert!(matches!(err, CompressionError::Shape(_)));
    }

    #[test]
    fn rejects_extra_keys() {
        let err = Compressor::default()
            .parse_response(r#"{"summary": "s", "fact_ledger": {}, "mood": "happy"}"#)
            .unwrap_err();
        assert!(matches!(err, CompressionError::Shape(_)));
    }

    #[test]
    fn rejects_non_object_ledger() {
        let err = Compressor::default()
            .parse_response(r#"{"summary": "s", "fact_ledger": ["a", "b"]}"#)
            .unwrap_err();
        assert!(matches!(err, CompressionError::Shape(_)));
    }

    #[tokio::test]
    async fn compress_returns_parsed_result() {
        let model = Canned(Ok(r#"{"summary": "new", "fact_ledger": {"k": "v"}}"#));
        let result = Compressor::default()
            .compress(&model, "m", &[Message::user("hi")], "", &FactLedger::new())
            .await
            .unwrap();
        assert_eq!(result.summary, "new");
        assert_eq!(result.fact_ledger["k"], "v");
    }

    #[tokio::test]
    async fn compress_swallows_model_errors() {
        let model = Canned(Err("HTTP 503"));
        let result = Compressor::default()
            .compress(&model, "m", &[Message::user("hi")], "", &FactLedger::new())
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn blocking_compress_swallows_malformed_output() {
        let model = Canned(Ok("{\"summary\": 42}"));
        let result = Compressor::default().compress_blocking(
            &model,
            "m",
            &[Message::user("hi")],
            "",
            &FactLedger::new(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("  {}  "), "{}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}
