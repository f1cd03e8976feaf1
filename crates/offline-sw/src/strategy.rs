//! Fetch interceptor: Network-First for CDN URLs, Cache-First for the rest.

use std::sync::Arc;

use http::StatusCode;
use offline_net::{Request, Response};
use tracing::{debug, error, trace, warn};

use crate::event::FetchEvent;
use crate::worker::OfflineWorker;

/// Body returned when a CDN resource is neither reachable nor cached.
pub const CDN_UNAVAILABLE_BODY: &str = "Network error and no cache available";

/// Body returned when a static resource is neither cached nor reachable.
pub const STATIC_UNAVAILABLE_BODY: &str = "Offline";

/// How an intercepted request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Matches a CDN pattern: Network-First, cached into the runtime store.
    Cdn,
    /// Everything else: Cache-First, cached into the static store.
    Static,
}

/// Where a supplied response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Synthesized,
}

/// A response supplied by the interceptor.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub response: Response,
    pub source: ResponseSource,
}

impl FetchResponse {
    fn network(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    fn cache(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
        }
    }

    fn unavailable(body: &'static str) -> Self {
        Self {
            response: Response::new(StatusCode::SERVICE_UNAVAILABLE, body)
                .with_status_text("Service Unavailable"),
            source: ResponseSource::Synthesized,
        }
    }

    pub fn from_cache(&self) -> bool {
        self.source == ResponseSource::Cache
    }
}

impl OfflineWorker {
    /// Decide how to serve a request. `None` means the request passes through.
    pub fn classify(&self, request: &Request) -> Option<RequestClass> {
        if !request.is_get() {
            return None;
        }
        if self.config.bypasses(&request.url) {
            return None;
        }
        if self.cdn_patterns.matches(&request.url) {
            Some(RequestClass::Cdn)
        } else {
            Some(RequestClass::Static)
        }
    }

    /// Intercept a request. `None` declines and lets it proceed untouched.
    ///
    /// Cache writes are registered on the event and never delay the response.
    pub async fn handle_fetch(&self, event: &FetchEvent) -> Option<FetchResponse> {
        let class = self.classify(&event.request)?;
        trace!(id = %event.request.id, url = %event.request.url, ?class, "Intercepting request");

        Some(match class {
            RequestClass::Cdn => self.network_first(event).await,
            RequestClass::Static => self.cache_first(event).await,
        })
    }

    async fn network_first(&self, event: &FetchEvent) -> FetchResponse {
        let request = &event.request;

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.cache_in_background(event, &self.config.runtime_cache_name, &response);
                }
                FetchResponse::network(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "CDN fetch failed, trying cache");
                match self.lookup(request).await {
                    Some(cached) => {
                        debug!(url = %request.url, "Serving CDN resource from cache");
                        FetchResponse::cache(cached)
                    }
                    None => FetchResponse::unavailable(CDN_UNAVAILABLE_BODY),
                }
            }
        }
    }

    async fn cache_first(&self, event: &FetchEvent) -> FetchResponse {
        let request = &event.request;

        if let Some(cached) = self.lookup(request).await {
            trace!(url = %request.url, "Cache hit");
            return FetchResponse::cache(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.cache_in_background(event, &self.config.static_cache_name, &response);
                }
                FetchResponse::network(response)
            }
            Err(e) => {
                error!(url = %request.url, error = %e, "Fetch failed");
                FetchResponse::unavailable(STATIC_UNAVAILABLE_BODY)
            }
        }
    }

    /// Look a request up across every store; a failing lookup counts as a miss.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.storage.match_request(request).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    /// Store a clone of `response` as detached work on the event's lifetime.
    fn cache_in_background(&self, event: &FetchEvent, cache_name: &str, response: &Response) {
        let storage = Arc::clone(&self.storage);
        let cache_name = cache_name.to_string();
        let request = event.request.clone();
        let response = response.clone();

        event.wait_until(async move {
            if let Err(e) = storage.put(&cache_name, &request, &response).await {
                warn!(cache = %cache_name, url = %request.url, error = %e, "Cache write failed");
            }
        });
    }
}
