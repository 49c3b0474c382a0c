//! Convenience re-exports for common `chronicle-rs` types.
//!
//! ```ignore
//! use chronicle_rs::prelude::*;
//! ```
//!
//! Covers running turns over the bundled or custom providers and stores.
//! Backend-specific stores (`RedisStore`, `PostgresStore`) and the
//! compressor internals stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageRole, OpenRouterClient};

// ── Engine ──────────────────────────────────────────────────────────
pub use crate::config::EngineConfig;
pub use crate::engine::{Engine, Strategy, TurnMeta, TurnOptions, TurnResult};
pub use crate::error::{ConfigError, EngineError, ModelError, StoreError};

// ── Extension points ────────────────────────────────────────────────
pub use crate::model::{
    BlockingLanguageModel, CharEstimator, CompletionRequest, LanguageModel, ModelFuture,
    OpenRouterModel,
};
pub use crate::store::{
    BlockingSessionStore, FactLedger, InMemoryStore, SessionState, SessionStore, StoreFuture,
};
