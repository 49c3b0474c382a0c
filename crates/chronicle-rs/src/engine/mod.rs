//! The optimization engine: one turn, end to end.
//!
//! Each turn runs, in order:
//!
//! 1. **Load** the session's compact state (or start empty).
//! 2. **Detect bloat**: count `raw_history + [new_message]` and compare it
//!    against the threshold (strictly greater-than).
//! 3. **Compress** when bloated. Success replaces and persists the state;
//!    failure or timeout keeps the prior state and the turn carries on.
//! 4. **Hydrate**: strict when bloated, hybrid otherwise.
//! 5. **Arbitrate**: return the hydrated prompt unless it costs more tokens
//!    than the naive one.
//! 6. **Report** metrics in [`TurnMeta`].
//!
//! [`Engine::process_turn`] and [`Engine::process_turn_blocking`] run the
//! same steps; they differ only in how store and model calls are made.
//! Only the suspending variant bounds compression by
//! [`TurnOptions::timeout`].
//!
//! The engine holds no per-session state of its own, so one instance can
//! serve concurrent turns. Two concurrent turns on the same session may race
//! their saves; the later write wins.

mod dispatch;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use crate::config::TurnOptions;
pub use crate::context::budget::Strategy;

use self::dispatch::{Blocking, CompressionOutcome, Dispatch, Suspending};
use crate::Message;
use crate::config::EngineConfig;
use crate::context::budget::{TokenBudget, select_best, tokens_saved};
use crate::context::compressor::Compressor;
use crate::context::hydration::{self, HydrationMode};
use crate::error::{ConfigError, EngineError};
use crate::model::{BlockingLanguageModel, LanguageModel, OpenRouterModel};
use crate::store::{BlockingSessionStore, FactLedger, InMemoryStore, SessionState, SessionStore};

/// Metrics for one turn.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TurnMeta {
    pub strategy: Strategy,
    pub bloat_detected: bool,
    /// Compression was abandoned after the turn's timeout.
    pub timed_out: bool,
    /// Tokens in the naive prompt.
    pub original_tokens: usize,
    /// Tokens in the returned prompt.
    pub final_tokens: usize,
    pub tokens_saved: usize,
    /// Wall-clock duration of the turn, rounded to two decimals.
    pub latency_ms: f64,
    /// The ledger the hydrated prompt was built from.
    pub fact_ledger: FactLedger,
}

/// The prompt to send downstream, plus metrics.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub hydrated_messages: Vec<Message>,
    pub meta: TurnMeta,
}

/// Context optimization engine over a session store `S` and model `M`.
///
/// Construct with [`Engine::from_config`] for the bundled OpenRouter model
/// and in-memory store, or [`Engine::new`] to supply your own.
pub struct Engine<S = InMemoryStore, M = OpenRouterModel> {
    config: EngineConfig,
    store: S,
    model: M,
    compressor: Compressor,
}

impl Engine {
    /// Engine over [`OpenRouterModel`] and a default [`InMemoryStore`].
    ///
    /// Fails with [`ConfigError::MissingCredential`] when the config has no
    /// API key.
    pub fn from_config(config: EngineConfig) -> Result<Self, ConfigError> {
        let model = OpenRouterModel::new(config.require_api_key()?)?;
        Ok(Self::new(config, InMemoryStore::default(), model))
    }
}

impl<S, M> Engine<S, M> {
    pub fn new(config: EngineConfig, store: S, model: M) -> Self {
        let compressor = Compressor::new(config.compressor.clone());
        Self {
            config,
            store,
            model,
            compressor,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<S: SessionStore, M: LanguageModel> Engine<S, M> {
    /// Run one turn, awaiting the store and model.
    ///
    /// Compression is abandoned after `options.timeout`; the turn then uses
    /// the prior state and reports `timed_out`.
    pub async fn process_turn(
        &self,
        session_id: &str,
        new_message: Message,
        raw_history: &[Message],
        options: TurnOptions,
    ) -> Result<TurnResult, EngineError> {
        let dispatch = Suspending {
            store: &self.store,
            model: &self.model,
            compressor: &self.compressor,
            timeout: options.timeout,
        };
        self.run_turn(&dispatch, session_id, new_message, raw_history)
            .await
    }
}

impl<S: BlockingSessionStore, M: BlockingLanguageModel> Engine<S, M> {
    /// Run one turn on the calling thread.
    ///
    /// Compression is not time-bounded here. Must not be called from inside
    /// an async runtime worker.
    ///
    /// Only available when the store implements [`BlockingSessionStore`].
    /// Over an async-only store this does not compile:
    ///
    /// ```compile_fail
    /// use chronicle_rs::prelude::*;
    ///
    /// struct AsyncOnly;
    ///
    /// impl SessionStore for AsyncOnly {
    ///     fn get<'a>(&'a self, _id: &'a str) -> StoreFuture<'a, Option<SessionState>> {
    ///         Box::pin(async { Ok(None) })
    ///     }
    ///
    ///     fn save<'a>(
    ///         &'a self,
    ///         _id: &'a str,
    ///         _summary: &'a str,
    ///         _facts: &'a FactLedger,
    ///     ) -> StoreFuture<'a, ()> {
    ///         Box::pin(async { Ok(()) })
    ///     }
    /// }
    ///
    /// fn run(engine: &Engine<AsyncOnly, OpenRouterModel>) {
    ///     let _ = engine.process_turn_blocking("s", Message::user("hi"), &[]);
    /// }
    /// ```
    pub fn process_turn_blocking(
        &self,
        session_id: &str,
        new_message: Message,
        raw_history: &[Message],
    ) -> Result<TurnResult, EngineError> {
        let dispatch = Blocking {
            store: &self.store,
            model: &self.model,
            compressor: &self.compressor,
        };
        futures::executor::block_on(self.run_turn(&dispatch, session_id, new_message, raw_history))
    }
}

impl<S, M> Engine<S, M> {
    async fn run_turn<D: Dispatch>(
        &self,
        io: &D,
        session_id: &str,
        new_message: Message,
        raw_history: &[Message],
    ) -> Result<TurnResult, EngineError> {
        let start = Instant::now();
        let model_id = self.config.model.as_str();

        let state = match io.load(session_id).await {
            Ok(Some(state)) => {
                debug!(
                    "Loaded session {session_id} ({} fact(s), summary {} chars)",
                    state.fact_ledger.len(),
                    state.summary.len()
                );
                state
            }
            Ok(None) => {
                debug!("No stored state for session {session_id}, starting fresh");
                SessionState::empty()
            }
            Err(source) => {
                return Err(EngineError::Load {
                    session_id: session_id.to_string(),
                    source,
                });
            }
        };
        let SessionState {
            mut summary,
            mut fact_ledger,
            ..
        } = state;

        let naive = hydration::naive(raw_history, &new_message);
        let original_tokens = io
            .count(&naive, model_id)
            .await
            .map_err(EngineError::TokenCount)?;

        let budget = TokenBudget::new(self.config.token_threshold);
        let bloat_detected = budget.is_bloated(original_tokens);
        let mut timed_out = false;

        if bloat_detected {
            info!(
                "Bloat detected for session {session_id}: {original_tokens} tokens > {} threshold",
                budget.threshold()
            );
            let outcome = io
                .compress(model_id, raw_history, &summary, &fact_ledger)
                .await;
            match outcome {
                CompressionOutcome::Compressed(result) => {
                    summary = result.summary;
                    fact_ledger = result.fact_ledger;
                    io.save(session_id, &summary, &fact_ledger)
                        .await
                        .map_err(|source| EngineError::Save {
                            session_id: session_id.to_string(),
                            source,
                        })?;
                }
                CompressionOutcome::Failed => {}
                CompressionOutcome::TimedOut(after) => {
                    warn!(
                        "Compression for session {session_id} timed out after {}ms, keeping prior state",
                        after.as_millis()
                    );
                    timed_out = true;
                }
            }
        }

        let memory = hydration::render_memory(
            &summary,
            &fact_ledger,
            self.config.custom_instructions.as_deref(),
        );
        let hydrated = hydration::hydrate(
            HydrationMode::for_bloat(bloat_detected),
            &memory,
            raw_history,
            &new_message,
            self.config.recent_window,
        );
        let hydrated_tokens = io
            .count(&hydrated, model_id)
            .await
            .map_err(EngineError::TokenCount)?;

        let selection = select_best(hydrated, hydrated_tokens, naive, original_tokens);
        debug!(
            "Strategy {}: hydrated {hydrated_tokens} vs naive {original_tokens} tokens",
            selection.strategy
        );

        let meta = TurnMeta {
            strategy: selection.strategy,
            bloat_detected,
            timed_out,
            original_tokens,
            final_tokens: selection.tokens,
            tokens_saved: tokens_saved(original_tokens, selection.tokens),
            latency_ms: round_ms(start.elapsed().as_secs_f64() * 1000.0),
            fact_ledger,
        };
        info!(
            "Turn for session {session_id}: {} ({} -> {} tokens, {:.2}ms)",
            meta.strategy, meta.original_tokens, meta.final_tokens, meta.latency_ms
        );

        Ok(TurnResult {
            hydrated_messages: selection.messages,
            meta,
        })
    }
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
