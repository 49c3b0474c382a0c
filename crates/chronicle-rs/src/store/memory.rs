//! In-process session store with time-to-live expiry.
//!
//! Expired entries are evicted lazily on read. The check-then-evict and
//! the overwrite on save each run under the map's mutex, so the store is safe
//! to share across threads.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, trace};

use super::{BlockingSessionStore, FactLedger, SessionState, SessionStore, StoreFuture};
use crate::error::StoreError;

/// Default time-to-live for a session.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Session store backed by a `HashMap`.
#[derive(Debug)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, SessionState>>,
    ttl: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl InMemoryStore {
    /// Create a store whose entries expire `ttl` after their last write.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored sessions, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionState>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, state: &SessionState) -> bool {
        state.age_secs() > self.ttl.as_secs_f64()
    }

    fn read(&self, session_id: &str) -> Option<SessionState> {
        let mut entries = self.lock();
        let state = entries.get(session_id)?;
        if self.is_expired(state) {
            debug!("Evicting expired session {session_id}");
            entries.remove(session_id);
            return None;
        }
        Some(state.clone())
    }

    fn write(&self, session_id: &str, summary: &str, fact_ledger: &FactLedger) {
        trace!("Saving session {session_id} ({} facts)", fact_ledger.len());
        self.lock().insert(
            session_id.to_string(),
            SessionState::new(summary, fact_ledger.clone()),
        );
    }

    #[cfg(test)]
    fn insert_state(&self, session_id: &str, state: SessionState) {
        self.lock().insert(session_id.to_string(), state);
    }
}

impl SessionStore for InMemoryStore {
    fn get<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<SessionState>> {
        Box::pin(async move { Ok(self.read(session_id)) })
    }

    fn save<'a>(
        &'a self,
        session_id: &'a str,
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.write(session_id, summary, fact_ledger);
            Ok(())
        })
    }
}

impl BlockingSessionStore for InMemoryStore {
    fn get_blocking(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.read(session_id))
    }

    fn save_blocking(
        &self,
        session_id: &str,
        summary: &str,
        fact_ledger: &FactLedger,
    ) -> Result<(), StoreError> {
        self.write(session_id, summary, fact_ledger);
        Ok(())
    }
}
