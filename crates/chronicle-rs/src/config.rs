//! Engine configuration.
//!
//! [`EngineConfig`] is resolved once, before the engine is built, and is
//! immutable afterwards. Environment lookups happen in
//! [`EngineConfig::from_env`] / [`EngineConfig::with_env`] only; the turn
//! path never reads the environment.
//!
//! # Examples
//!
//! Defaults plus the process environment:
//!
//! ```ignore
//! let config = EngineConfig::from_env()?;
//! ```
//!
//! Explicit settings, no environment:
//!
//! ```
//! use chronicle_rs::config::EngineConfig;
//!
//! let config = EngineConfig::new("openai/gpt-4o-mini")
//!     .with_api_key("sk-test")
//!     .with_token_threshold(4000)
//!     .with_custom_instructions("You are a support agent for Acme.");
//! assert_eq!(config.token_threshold, 4000);
//! ```

use std::time::Duration;

use crate::DEFAULT_MODEL;
use crate::context::compressor::CompressorConfig;
use crate::context::hydration::DEFAULT_RECENT_WINDOW;
use crate::error::ConfigError;

/// Environment variables searched for an API key, highest priority first.
pub const API_KEY_VARS: [&str; 4] = [
    "OPENROUTER_KEY",
    "OPENAI_API_KEY",
    "GROQ_API_KEY",
    "ANTHROPIC_API_KEY",
];

/// Environment variable that overrides the worker model.
pub const MODEL_VAR: &str = "LLM_MODEL";

/// Environment variable that overrides the token threshold.
pub const THRESHOLD_VAR: &str = "CHRONICLE_THRESHOLD";

/// Default bloat threshold in tokens.
pub const DEFAULT_TOKEN_THRESHOLD: usize = 1000;

/// Default time a suspending turn waits for compression.
pub const DEFAULT_COMPRESSION_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Credential for the bundled provider. Only required by
    /// [`Engine::from_config`](crate::engine::Engine::from_config).
    pub api_key: Option<String>,
    /// Worker model used for token counting and compression.
    pub model: String,
    /// History larger than this many tokens (strictly) is bloated.
    pub token_threshold: usize,
    /// Text placed before the memory block in every hydrated system message.
    pub custom_instructions: Option<String>,
    /// Raw messages kept verbatim when the history is not bloated.
    pub recent_window: usize,
    /// Compression request settings.
    pub compressor: CompressorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            token_threshold: DEFAULT_TOKEN_THRESHOLD,
            custom_instructions: None,
            recent_window: DEFAULT_RECENT_WINDOW,
            compressor: CompressorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a config for the given worker model with default settings.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Defaults resolved against the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// - API key: an explicitly set key wins; otherwise the first non-empty
    ///   variable in [`API_KEY_VARS`].
    /// - Model and threshold: the variable, when set, wins over the current
    ///   value.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = API_KEY_VARS.iter().find_map(|key| non_empty(*key));
        }
        if let Some(model) = non_empty(MODEL_VAR) {
            self.model = model;
        }
        if let Some(raw) = non_empty(THRESHOLD_VAR) {
            self.token_threshold =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidThreshold {
                        var: THRESHOLD_VAR,
                        value: raw.clone(),
                    })?;
        }
        Ok(self)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_token_threshold(mut self, tokens: usize) -> Self {
        self.token_threshold = tokens;
        self
    }

    pub fn with_custom_instructions(mut self, text: impl Into<String>) -> Self {
        self.custom_instructions = Some(text.into());
        self
    }

    pub fn with_recent_window(mut self, messages: usize) -> Self {
        self.recent_window = messages;
        self
    }

    pub fn with_compressor(mut self, compressor: CompressorConfig) -> Self {
        self.compressor = compressor;
        self
    }

    /// The resolved API key, or [`ConfigError::MissingCredential`].
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingCredential {
                searched: API_KEY_VARS.to_vec(),
            })
    }
}

/// Per-call options for [`Engine::process_turn`](crate::engine::Engine::process_turn).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOptions {
    /// How long to wait for compression before keeping the prior state.
    pub timeout: Duration,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMPRESSION_TIMEOUT,
        }
    }
}

impl TurnOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn with_timeout_ms(ms: u64) -> Self {
        Self::with_timeout(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(config.api_key.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.token_threshold, 1000);
        assert_eq!(config.recent_window, 5);
        assert!(config.custom_instructions.is_none());
    }

    #[test]
    fn explicit_key_beats_environment() {
        let config = EngineConfig::default()
            .with_api_key("explicit")
            .with_env(env(&[("OPENAI_API_KEY", "from-env")]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("explicit"));
    }

    #[test]
    fn key_vars_are_searched_in_priority_order() {
        let config = EngineConfig::default()
            .with_env(env(&[
                ("ANTHROPIC_API_KEY", "anthropic"),
                ("GROQ_API_KEY", "groq"),
            ]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("groq"));

        let config = EngineConfig::default()
            .with_env(env(&[("OPENROUTER_KEY", "or"), ("OPENAI_API_KEY", "oa")]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("or"));
    }

    #[test]
    fn blank_key_vars_are_skipped() {
        let config = EngineConfig::default()
            .with_env(env(&[("OPENROUTER_KEY", "  "), ("OPENAI_API_KEY", "oa")]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("oa"));
    }

    #[test]
    fn environment_overrides_model_and_threshold() {
        let config = EngineConfig::new("configured-model")
            .with_token_threshold(50)
            .with_env(env(&[("LLM_MODEL", "env-model"), ("CHRONICLE_THRESHOLD", "2500")]))
            .unwrap();
        assert_eq!(config.model, "env-model");
        assert_eq!(config.token_threshold, 2500);
    }

    #[test]
    fn unset_environment_keeps_configured_values() {
        let config = EngineConfig::new("configured-model")
            .with_token_threshold(50)
            .with_env(env(&[]))
            .unwrap();
        assert_eq!(config.model, "configured-model");
        assert_eq!(config.token_threshold, 50);
    }

    #[test]
    fn invalid_threshold_is_a_config_error() {
        let err = EngineConfig::default()
            .with_env(env(&[("CHRONICLE_THRESHOLD", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidThreshold { var: "CHRONICLE_THRESHOLD", ref value } if value == "lots"
        ));
    }

    #[test]
    fn missing_credential() {
        let config = EngineConfig::default().with_env(env(&[])).unwrap();
        let err = config.require_api_key().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { ref searched } if searched.len() == 4));
    }

    #[test]
    fn turn_options_default_to_ten_seconds() {
        assert_eq!(TurnOptions::default().timeout, Duration::from_secs(10));
        assert_eq!(
            TurnOptions::with_timeout_ms(250).timeout,
            Duration::from_millis(250)
        );
    }
}
