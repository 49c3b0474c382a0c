//! Context optimization engine for LLM conversations.
//!
//! `chronicle-rs` keeps a conversation's prompt small without losing what
//! matters. Every turn, the [`Engine`](engine::Engine) measures the raw
//! history, and when it grows past a configured token threshold it asks a
//! cheap worker model to fold the history into a compact, durable state: a
//! running narrative **summary** plus a structured **fact ledger**. That
//! state is persisted per session and re-injected as a system "memory" block
//! on later turns.
//!
//! Two prompts compete on every turn: the *hydrated* candidate (memory block
//! plus either nothing or a short recency window of raw messages) and the
//! *naive* candidate (the full raw history). The engine returns whichever is
//! smaller, so it never hands back a prompt heavier than doing nothing.
//!
//! # Getting started
//!
//! ```ignore
//! use chronicle_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENROUTER_KEY / OPENAI_API_KEY / ..., LLM_MODEL, CHRONICLE_THRESHOLD.
//!     let config = EngineConfig::from_env()?;
//!     let engine = Engine::from_config(config)?;
//!
//!     let history = vec![
//!         Message::user("My name is Ada and I work on compilers."),
//!         Message::assistant("Nice to meet you, Ada."),
//!     ];
//!     let turn = engine
//!         .process_turn("session-1", Message::user("What do I work on?"), &history, TurnOptions::default())
//!         .await?;
//!
//!     println!("{} -> {} tokens ({})", turn.meta.original_tokens, turn.meta.final_tokens, turn.meta.strategy);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Run a turn:** [`Engine::process_turn`](engine::Engine::process_turn)
//!   (suspending, with a compression timeout) or
//!   [`Engine::process_turn_blocking`](engine::Engine::process_turn_blocking).
//!   Both run the same algorithm; see [`engine`].
//! - **Plug in a model provider:** implement
//!   [`LanguageModel`](model::LanguageModel) (and
//!   [`BlockingLanguageModel`](model::BlockingLanguageModel) for blocking turns).
//!   [`OpenRouterModel`](model::openrouter::OpenRouterModel) is the bundled one.
//! - **Plug in storage:** implement [`SessionStore`](store::SessionStore)
//!   (and [`BlockingSessionStore`](store::BlockingSessionStore) if the backend
//!   has a blocking client). [`InMemoryStore`](store::memory::InMemoryStore)
//!   is the default; Redis, Postgres, and MongoDB adapters sit behind cargo features.
//! - **Tune behavior:** [`EngineConfig`](config::EngineConfig).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | Turn orchestration, best-of-two selection, metrics |
//! | [`context`] | Compressor, hydration templates, bloat detection |
//! | [`model`] | Completion and token-count capability traits, OpenRouter provider |
//! | [`store`] | Session state, store traits, in-memory/Redis/Postgres/MongoDB backends |
//! | [`config`] | Immutable engine configuration and environment resolution |
//! | [`error`] | Error types |

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod model;
pub mod prelude;
pub mod store;

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default worker model for compression calls.
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

/// Per-request HTTP timeout for the OpenRouter client.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`.
///
/// # Example
///
/// ```
/// use chronicle_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct Note {
///     title: String,
///     #[serde(default)]
///     body: Option<String>,
/// }
///
/// let schema = json_schema_for::<Note>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"title".into()));
/// ```
pub fn json_schema_for<T: schemars::JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in the conversation: a role and its text.
///
/// Sequences of messages are always kept in conversation order, oldest first.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Bare text is treated as a single user message.
impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::user(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::user(text)
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// JSON output format type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
}

/// JSON output mode.
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonObject,
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`OpenRouterClient::chat()`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// HTTP client for the OpenRouter chat completions API.
///
/// The async client is built eagerly. The blocking client is only built on
/// the first [`chat_blocking`](Self::chat_blocking) call, since
/// `reqwest::blocking` must not be constructed inside an async runtime.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    blocking: OnceLock<Result<reqwest::blocking::Client, String>>,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/chronicle-rs", "chronicle-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("chronicle-rs/0.1")
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            blocking: OnceLock::new(),
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        log_request(body);
        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        parse_chat_response(status, &text, start)
    }

    /// Send a chat completion request, blocking the current thread.
    ///
    /// Must not be called from inside an async runtime.
    pub fn chat_blocking(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        let client = self
            .blocking
            .get_or_init(|| {
                reqwest::blocking::Client::builder()
                    .user_agent("chronicle-rs/0.1")
                    .timeout(HTTP_TIMEOUT)
                    .build()
                    .map_err(|e| format!("failed to build blocking HTTP client: {e}"))
            })
            .as_ref()
            .map_err(Clone::clone)?;

        log_request(body);
        let start = Instant::now();

        let resp = client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| format!("failed to read response: {e}"))?;

        parse_chat_response(status, &text, start)
    }
}

fn log_request(body: &ChatRequest) {
    debug!(
        "LLM request: model={}, messages={}, max_tokens={}, temp={}, json_mode={}",
        body.model.as_deref().unwrap_or("(none)"),
        body.messages.len(),
        body.max_tokens,
        body.temperature,
        body.response_format.is_some(),
    );
    trace!(
        "Request payload size: {} bytes",
        serde_json::to_string(body).map_or(0, |s| s.len())
    );
}

/// Shared response handling for the async and blocking transports.
fn parse_chat_response(
    status: reqwest::StatusCode,
    text: &str,
    start: Instant,
) -> Result<ChatCompletion, String> {
    debug!(
        "LLM response: HTTP {} in {:.1}s ({} bytes)",
        status,
        start.elapsed().as_secs_f64(),
        text.len()
    );

    if !status.is_success() {
        return Err(format!("OpenRouter API HTTP {status}: {text}"));
    }

    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("OpenRouter API error: {}", err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    match parsed.choices.and_then(|c| c.into_iter().next()) {
        Some(c) => {
            debug!(
                "LLM output: {} chars",
                c.message.content.as_ref().map_or(0, |s| s.len())
            );
            Ok(ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            })
        }
        None => {
            debug!("LLM output: empty (no choices)");
            Ok(ChatCompletion {
                content: None,
                usage: parsed.usage,
                finish_reason: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let assist = Message::assistant("reply");
        assert_eq!(assist.role, MessageRole::Assistant);
        assert_eq!(assist.content, "reply");
    }

    #[test]
    fn bare_text_is_a_user_message() {
        let msg: Message = "just text".into();
        assert_eq!(msg, Message::user("just text"));
    }

    #[test]
    fn message_serializes_lowercase_role() {
        let json = serde_json::to_value(Message::assistant("ok")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "ok"}));
    }

    #[test]
    fn chat_request_default_skips_unset_fields() {
        let req = ChatRequest {
            model: Some("test-model".into()),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn chat_request_json_mode_serializes() {
        let req = ChatRequest {
            model: Some("m".into()),
            messages: vec![],
            response_format: Some(ResponseFormat::json_object()),
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn parse_response_extracts_content() {
        let body = r#"{"choices":[{"message":{"content":"{\"a\":1}"},"finish_reason":"stop"}],
                       "usage":{"prompt_tokens":10,"completion_tokens":3,"total_tokens":13}}"#;
        let completion = parse_chat_response(reqwest::StatusCode::OK, body, Instant::now()).unwrap();
        assert_eq!(completion.content.as_deref(), Some("{\"a\":1}"));
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.unwrap().total_tokens, Some(13));
    }

    #[test]
    fn parse_response_reports_http_errors() {
        let err = parse_chat_response(
            reqwest::StatusCode::UNAUTHORIZED,
            "bad key",
            Instant::now(),
        )
        .unwrap_err();
        assert!(err.contains("HTTP 401"));
    }

    #[test]
    fn parse_response_reports_api_errors() {
        let body = r#"{"error":{"message":"model not found"}}"#;
        let err = parse_chat_response(reqwest::StatusCode::OK, body, Instant::now()).unwrap_err();
        assert!(err.contains("model not found"));
    }

    #[test]
    fn parse_response_without_choices_is_empty() {
        let completion =
            parse_chat_response(reqwest::StatusCode::OK, r#"{"choices":[]}"#, Instant::now())
                .unwrap();
        assert!(completion.content.is_none());
    }
}
