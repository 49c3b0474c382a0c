//! Redis session store.
//!
//! Each session is one JSON string under `chronicle:session:{id}`, written
//! with `SETEX` so Redis handles expiry. Async only.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use super::{FactLedger, SessionState, SessionStore, StoreFuture};
use crate::error::StoreError;

/// Key prefix for session records.
pub const KEY_PREFIX: &str = "chronicle:session:";

/// Default expiry for session keys.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(format!("redis: {e}"))
}

/// Session store backed by Redis. Connects lazily on first use.
pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    ttl: Duration,
}

impl RedisStore {
    /// Create a store for the given `redis://` URL. Does not connect yet.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            ttl: DEFAULT_TTL,
        })
    }

    /// Override the key expiry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Redis key for a session.
    pub fn key(session_id: &str) -> String {
        format!("{KEY_PREFIX}{session_id}")
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                debug!("Connecting to Redis session store");
                ConnectionManager::new(self.client.clone()).await
            })
            .await
            .map_err(backend)?;
        Ok(manager.clone())
    }
}

impl SessionStore for RedisStore {
    fn get<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<SessionState>> {
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let raw: Option<String> = conn.get(Self::key(session_id)).await.map_err(backend)?;
            match raw {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
    }

    fn save<'a>(
        &'a self,
        session_id: &'a str,
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let state = SessionState::new(summary, fact_ledger.clone());
            let json = serde_json::to_string(&state)?;
            trace!("Saving session {session_id} to Redis ({} bytes)", json.len());

            let mut conn = self.connection().await?;
            let _: () = conn
                .set_ex(Self::key(session_id), json, self.ttl.as_secs().max(1))
                .await
                .map_err(backend)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(RedisStore::key("abc"), "chronicle:session:abc");
    }

    #[test]
    fn invalid_url_is_a_backend_error() {
        assert!(matches!(
            RedisStore::new("not a url"),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn ttl_override() {
        let store = RedisStore::new("redis://127.0.0.1/")
            .unwrap()
            .with_ttl(Duration::from_secs(60));
        assert_eq!(store.ttl, Duration::from_secs(60));
    }
}
