//! Durable per-session state and the storage contract.
//!
//! A session's compact state is a triple: the running summary, the fact
//! ledger, and the time it was last written. Stores persist exactly that
//! record shape (`{summary, fact_ledger, updated_at}`), whatever the backend.
//!
//! Storage capability is split in two traits:
//!
//! - [`SessionStore`]: async get/save. Every backend implements it.
//! - [`BlockingSessionStore`]: get/save on the calling thread. Only backends
//!   with a blocking client implement it, and only engines over such stores
//!   expose [`process_turn_blocking`](crate::engine::Engine::process_turn_blocking).
//!   Calling the blocking path on an async-only store is a compile error.
//!
//! Backends:
//!
//! - [`memory`]: [`InMemoryStore`], a TTL'd map. Supports both traits.
//! - `redis` (feature `redis`): key/value store, async only.
//! - `postgres` (feature `postgres`): relational table with a JSONB ledger,
//!   async only.
//! - `mongo` (feature `mongo`): one document per session, async only.

pub mod memory;
#[cfg(feature = "mongo")]
pub mod mongo;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::InMemoryStore;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Fact key to value. Values are strings or nested JSON.
pub type FactLedger = serde_json::Map<String, serde_json::Value>;

/// Boxed future returned by async store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Compact state of one session.
///
/// An empty summary means no compression has happened yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionState {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub fact_ledger: FactLedger,
    /// Unix epoch seconds, fractional.
    pub updated_at: f64,
}

impl SessionState {
    /// Fresh state stamped with the current time.
    pub fn new(summary: impl Into<String>, fact_ledger: FactLedger) -> Self {
        Self {
            summary: summary.into(),
            fact_ledger,
            updated_at: now_epoch_secs(),
        }
    }

    /// The state of a session that has never been compressed.
    pub fn empty() -> Self {
        Self::new(String::new(), FactLedger::new())
    }

    /// Seconds since this state was written.
    pub fn age_secs(&self) -> f64 {
        now_epoch_secs() - self.updated_at
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Current time as fractional Unix epoch seconds.
pub fn now_epoch_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Async session persistence.
///
/// `get` returns `Ok(None)` when the session is unknown or expired; `Err` is
/// reserved for backend failures, which the engine propagates.
pub trait SessionStore: Send + Sync {
    fn get<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<SessionState>>;

    /// Overwrite the session's state, stamping it with the current time.
    fn save<'a>(
        &'a self,
        session_id: &'a str,
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> StoreFuture<'a, ()>;
}

/// A [`SessionStore`] that can also be used from blocking code.
pub trait BlockingSessionStore: SessionStore {
    fn get_blocking(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;

    fn save_blocking(
        &self,
        session_id: &str,
        summary: &str,
        fact_ledger: &FactLedger,
    ) -> Result<(), StoreError>;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn get<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<SessionState>> {
        (**self).get(session_id)
    }

    fn save<'a>(
        &'a self,
        session_id: &'a str,
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> StoreFuture<'a, ()> {
        (**self).save(session_id, summary, fact_ledger)
    }
}

impl<T: BlockingSessionStore + ?Sized> BlockingSessionStore for Arc<T> {
    fn get_blocking(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        (**self).get_blocking(session_id)
    }

    fn save_blocking(
        &self,
        session_id: &str,
        summary: &str,
        fact_ledger: &FactLedger,
    ) -> Result<(), StoreError> {
        (**self).save_blocking(session_id, summary, fact_ledger)
    }
}
