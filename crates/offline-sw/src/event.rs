//! Event lifetimes.
//!
//! Work started on behalf of an event (cache writes after a response has
//! been returned, a `CACHE_URLS` batch) is spawned as a detached task and
//! recorded on the event. The host keeps the event alive until
//! [`ExtendableEvent::settled`] returns. Dropping an event aborts whatever
//! is still outstanding.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use offline_net::Request;
use tokio::task::JoinSet;
use tracing::warn;

/// Lifetime token shared by every worker event.
#[derive(Debug, Default)]
pub struct ExtendableEvent {
    pending: Mutex<JoinSet<()>>,
}

impl ExtendableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the event's lifetime until `future` completes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn wait_until<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(future);
    }

    /// Number of tasks recorded and not yet settled.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait for every recorded task, including ones added while waiting.
    /// Returns how many tasks were awaited.
    pub async fn settled(&self) -> usize {
        let mut awaited = 0;
        loop {
            let mut tasks = std::mem::take(
                &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if tasks.is_empty() {
                return awaited;
            }
            while let Some(result) = tasks.join_next().await {
                awaited += 1;
                if let Err(e) = result {
                    warn!(error = %e, "Background task did not complete");
                }
            }
        }
    }
}

/// A request from a controlled page.
#[derive(Debug)]
pub struct FetchEvent {
    pub request: Request,
    /// Page that issued the request, if known.
    pub client_id: Option<String>,
    lifetime: ExtendableEvent,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            client_id: None,
            lifetime: ExtendableEvent::new(),
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// The event's lifetime token.
    pub fn lifetime(&self) -> &ExtendableEvent {
        &self.lifetime
    }

    /// Extend the event's lifetime until `future` completes.
    pub fn wait_until<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.lifetime.wait_until(future);
    }

    /// Wait for all background work started for this request.
    pub async fn settled(&self) -> usize {
        self.lifetime.settled().await
    }
}
