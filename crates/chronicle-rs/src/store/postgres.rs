//! PostgreSQL session store.
//!
//! Sessions live in one table, with the fact ledger as a JSONB column:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS chronicle_sessions (
//!     id          TEXT PRIMARY KEY,
//!     summary     TEXT,
//!     fact_ledger JSONB,
//!     updated_at  DOUBLE PRECISION
//! );
//! ```
//!
//! Async only. [`PostgresStore::connect`] creates the table if it is missing.

use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, trace};

use super::{FactLedger, SessionState, SessionStore, StoreFuture, now_epoch_secs};
use crate::error::StoreError;

const CREATE_TABLE: &str = r#"CREATE TABLE IF NOT EXISTS chronicle_sessions (
    id TEXT PRIMARY KEY,
    summary TEXT,
    fact_ledger JSONB,
    updated_at DOUBLE PRECISION
)"#;

const SELECT_SESSION: &str =
    r#"SELECT summary, fact_ledger, updated_at FROM chronicle_sessions WHERE id = $1"#;

const UPSERT_SESSION: &str = r#"INSERT INTO chronicle_sessions (id, summary, fact_ledger, updated_at)
   VALUES ($1, $2, $3, $4)
   ON CONFLICT (id) DO UPDATE
   SET summary = EXCLUDED.summary,
       fact_ledger = EXCLUDED.fact_ledger,
       updated_at = EXCLUDED.updated_at"#;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("postgres: {e}"))
}

/// Session store backed by a Postgres connection pool.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to `dsn` and make sure the sessions table exists.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        debug!("Connecting to Postgres session store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(dsn)
            .await
            .map_err(backend)?;
        Self::from_pool(pool).await
    }

    /// Use an existing pool. Creates the sessions table if missing.
    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(backend)?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl SessionStore for PostgresStore {
    fn get<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<SessionState>> {
        Box::pin(async move {
            let row = sqlx::query(SELECT_SESSION)
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

            let Some(row) = row else {
                return Ok(None);
            };
            let summary: Option<String> = row.try_get("summary").map_err(backend)?;
            let fact_ledger: Option<Json<FactLedger>> =
                row.try_get("fact_ledger").map_err(backend)?;
            let updated_at: Option<f64> = row.try_get("updated_at").map_err(backend)?;

            Ok(Some(SessionState {
                summary: summary.unwrap_or_default(),
                fact_ledger: fact_ledger.map(|j| j.0).unwrap_or_default(),
                updated_at: updated_at.unwrap_or_else(now_epoch_secs),
            }))
        })
    }

    fn save<'a>(
        &'a self,
        session_id: &'a str,
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            trace!("Saving session {session_id} to Postgres");
            sqlx::query(UPSERT_SESSION)
                .bind(session_id)
                .bind(summary)
                .bind(Json(fact_ledger))
                .bind(now_epoch_secs())
                .execute(&self.pool)
                .await
                .map_err(backend)?;
            Ok(())
        })
    }
}
