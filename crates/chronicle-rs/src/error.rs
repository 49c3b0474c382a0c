//! Error types.
//!
//! Only [`ConfigError`] and [`EngineError`] ever reach callers of the engine.
//! Compression failures are recovered inside the turn and only show up in
//! logs and turn metadata.

use thiserror::Error;

/// The engine configuration could not be resolved. Fatal at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No API key was passed explicitly and none of the environment variables
    /// were set.
    #[error("no API credential found (set one of: {})", searched.join(", "))]
    MissingCredential { searched: Vec<&'static str> },

    /// A token threshold override could not be parsed as an integer.
    #[error("invalid token threshold in {var}: {value:?}")]
    InvalidThreshold { var: &'static str, value: String },

    /// The HTTP client for the default provider could not be built.
    #[error("{0}")]
    HttpClient(String),
}

/// A completion or token-count oracle failed.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Transport, HTTP status, or provider-reported error.
    #[error("model request failed: {0}")]
    Request(String),

    /// The provider answered without any content.
    #[error("model returned an empty response")]
    EmptyResponse,
}

/// A session store backend failed. Distinct from "not found", which stores
/// report as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store backend error: {0}")]
    Backend(String),

    #[error("session record could not be encoded: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A turn could not be completed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Without token counts there is no bloat decision, so the turn aborts.
    #[error("token counting failed: {0}")]
    TokenCount(#[source] ModelError),

    #[error("failed to load session {session_id}: {source}")]
    Load {
        session_id: String,
        #[source]
        source: StoreError,
    },

    /// Compression succeeded but the new state could not be persisted.
    #[error("failed to save session {session_id}: {source}")]
    Save {
        session_id: String,
        #[source]
        source: StoreError,
    },
}
