//! The network seam used by the worker.

use async_trait::async_trait;
use tracing::trace;

use crate::{NetError, Request, Response};

/// Issues a request and resolves to a response or a network failure.
///
/// Any HTTP status counts as success; only transport failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// A fetcher with no network: every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        trace!(url = %request.url, "Offline fetcher rejecting request");
        Err(NetError::Offline(request.url.to_string()))
    }
}
