//! Context optimization building blocks.
//!
//! 1. **[`budget`]**: bloat detection against a token threshold and the
//!    best-of-two arbitration between a hydrated and a naive prompt.
//!
//! 2. **[`compressor`]**: one LLM call that folds raw history into a running
//!    summary plus a fact ledger.
//!
//! 3. **[`hydration`]**: rebuilds a prompt from compact state, either alone
//!    (strict) or with a short window of raw messages (hybrid).
//!
//! The [`Engine`](crate::engine::Engine) wires them together once per turn.

pub mod budget;
pub mod compressor;
pub mod hydration;

pub use budget::{Selection, Strategy, TokenBudget, select_best};
pub use compressor::{CompressionResult, Compressor, CompressorConfig};
pub use hydration::{DEFAULT_RECENT_WINDOW, HydrationMode, hydrate, render_memory};
