//! How a turn reaches the store and the model.
//!
//! The turn algorithm is written once, against [`Dispatch`]. [`Blocking`]
//! calls the synchronous store and model methods and hands back ready
//! futures, so the whole turn can be driven by `block_on` without a runtime.
//! [`Suspending`] awaits the async methods and bounds compression with a
//! timeout.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::Message;
use crate::context::compressor::{CompressionResult, Compressor};
use crate::model::{BlockingLanguageModel, LanguageModel, ModelFuture};
use crate::store::{BlockingSessionStore, FactLedger, SessionState, SessionStore, StoreFuture};

/// Boxed future for a compression attempt.
pub(crate) type CompressFuture<'a> = Pin<Box<dyn Future<Output = CompressionOutcome> + Send + 'a>>;

/// What came of a compression attempt.
#[derive(Debug)]
pub(crate) enum CompressionOutcome {
    Compressed(CompressionResult),
    /// The compressor failed; it has already logged why.
    Failed,
    /// Gave up waiting after the given duration.
    TimedOut(Duration),
}

impl From<Option<CompressionResult>> for CompressionOutcome {
    fn from(result: Option<CompressionResult>) -> Self {
        match result {
            Some(result) => Self::Compressed(result),
            None => Self::Failed,
        }
    }
}

/// Store, model, and compressor access for one turn.
pub(crate) trait Dispatch {
    fn load<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<SessionState>>;

    fn save<'a>(
        &'a self,
        session_id: &'a str,
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> StoreFuture<'a, ()>;

    fn count<'a>(&'a self, messages: &'a [Message], model: &'a str) -> ModelFuture<'a, usize>;

    fn compress<'a>(
        &'a self,
        model: &'a str,
        raw_history: &'a [Message],
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> CompressFuture<'a>;
}

/// Runs every call to completion on the calling thread.
pub(crate) struct Blocking<'e, S: ?Sized, M: ?Sized> {
    pub store: &'e S,
    pub model: &'e M,
    pub compressor: &'e Compressor,
}

impl<S, M> Dispatch for Blocking<'_, S, M>
where
    S: BlockingSessionStore + ?Sized,
    M: BlockingLanguageModel + ?Sized,
{
    fn load<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<SessionState>> {
        Box::pin(std::future::ready(self.store.get_blocking(session_id)))
    }

    fn save<'a>(
        &'a self,
        session_id: &'a str,
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> StoreFuture<'a, ()> {
        Box::pin(std::future::ready(
            self.store.save_blocking(session_id, summary, fact_ledger),
        ))
    }

    fn count<'a>(&'a self, messages: &'a [Message], model: &'a str) -> ModelFuture<'a, usize> {
        Box::pin(std::future::ready(self.model.count_tokens(messages, model)))
    }

    fn compress<'a>(
        &'a self,
        model: &'a str,
        raw_history: &'a [Message],
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> CompressFuture<'a> {
        let result =
            self.compressor
                .compress_blocking(self.model, model, raw_history, summary, fact_ledger);
        Box::pin(std::future::ready(result.into()))
    }
}

/// Awaits the async store and model; compression gets `timeout`.
pub(crate) struct Suspending<'e, S: ?Sized, M: ?Sized> {
    pub store: &'e S,
    pub model: &'e M,
    pub compressor: &'e Compressor,
    pub timeout: Duration,
}

impl<S, M> Dispatch for Suspending<'_, S, M>
where
    S: SessionStore + ?Sized,
    M: LanguageModel + ?Sized,
{
    fn load<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<SessionState>> {
        self.store.get(session_id)
    }

    fn save<'a>(
        &'a self,
        session_id: &'a str,
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> StoreFuture<'a, ()> {
        self.store.save(session_id, summary, fact_ledger)
    }

    fn count<'a>(&'a self, messages: &'a [Message], model: &'a str) -> ModelFuture<'a, usize> {
        self.model.count_tokens_async(messages, model)
    }

    fn compress<'a>(
        &'a self,
        model: &'a str,
        raw_history: &'a [Message],
        summary: &'a str,
        fact_ledger: &'a FactLedger,
    ) -> CompressFuture<'a> {
        Box::pin(async move {
            let attempt = self
                .compressor
                .compress(self.model, model, raw_history, summary, fact_ledger);
            // Dropping the attempt on expiry discards any late result.
            match tokio::time::timeout(self.timeout, attempt).await {
                Ok(result) => result.into(),
                Err(_) => CompressionOutcome::TimedOut(self.timeout),
            }
        })
    }
}
