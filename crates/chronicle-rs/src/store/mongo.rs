//! MongoDB session store.
//!
//! One document per session in `chronicle.sessions` (both names
//! configurable), keyed by `_id`:
//!
//! ```text
//! { _id: <session id>, summary: <string>, fact_ledger: <document>, updated_at: <double> }
//! ```
//!
//! Saves are upserts of a `$set` over the three fields. Async only.

use mongodb::bson::{Bson, Document, doc};
use mongodb::{Client, Collection};
use tracing::{debug, trace};

use super::{FactLedger, SessionState, SessionStore, StoreFuture, now_epoch_secs};
use crate::error::StoreError;

/// Default database name.
pub const DEFAULT_DATABASE: &str = "chronicle";

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "sessions";

fn backend(e: mongodb::error::Error) -> StoreError {
    StoreError::Backend(format!("mongodb: {e}"))
}

/// Session store backed by a MongoDB collection.
pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    /// Parse `uri` and use the default database and collection. The driver
    /// connects on first use.
    pub async fn connect(uri: &str) -> Result<Self, StoreError> {
        debug!("Creating MongoDB session store client");
        let client = Client::with_uri_str(uri).await.map_err(backend)?;
        Ok(Self::from_client(&client, DEFAULT_DATABASE, DEFAULT_COLLECTION))
    }

    /// Use an existing client with explicit database and collection names.
    pub fn from_client(client: &Client, database: &str, collection: &str) -> Self {
        Self {
            collection: client.database(database).collection(collection),
        }
    }
}

/// `$set` body written on save.
fn session_update(
    summary: &str,
    fact_ledger: &FactLedger,
    updated_at: f64,
) -> Result<Document, StoreError> {
    let ledger = mongodb::bson::to_bson(fact_ledger)
        .map_err(|e| StoreError::Backend(format!("mongodb: fact ledger not encodable: {e}")))?;
    Ok(doc! {
        "summary": summary,
        "fact_ledger": ledger,
        "updated_at": updated_at,
    })
}

/// Read a stored document, defaulting any missing field.
fn state_from_document(doc: &Document) -> SessionState {
    let fact_ledger = match doc.get("fact_ledger") {
        Some(Bson::Document(ledger)) => {
            match Bson::Document(ledger.clone()).into_relaxed_extjson() {
                serde_json::Value::Object(map) => map,
                _ => FactLedger::new(),
            }
        }
        _ => FactLedger::new(),
    };
    SessionState {
        summary: doc.get_str("summary").unwrap_or_default().to_string(),
        fact_ledger,
        updated_at: doc.get_f64("updated_at").unwrap_or_else(|_| now_epoch_secs()),
    }
}

impl SessionStore for MongoStore {
    fn get<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<SessionState>> {
        Box::pin(async move {
            let found = self
                .collection
                .find_one(doc! { "_id": session_id })
                .await
                .map_err(backend)?;
            Ok(found.as_ref().map(state_from_document))
        })
    }

    fn save<'a>(
        &'a self,
        session_id: &'a str,
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let fields = session_update(summary, fact_ledger, now_epoch_secs())?;
            trace!("Saving session {session_id} to MongoDB");
            self.collection
                .update_one(doc! { "_id": session_id }, doc! { "$set": fields })
                .upsert(true)
                .await
                .map_err(backend)?;
            Ok(())
        })
    }
}
