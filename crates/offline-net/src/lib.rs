//! # Offline Net
//!
//! Request and response types plus the network side of the offline worker.
//!
//! ## Design Goals
//!
//! 1. **Owned snapshots**: responses carry their full body so they can be cloned
//!    into a cache store while the original is returned to the page
//! 2. **Pluggable transport**: everything above this crate talks to a [`Fetcher`]
//! 3. **Real network**: [`HttpFetcher`] issues requests through reqwest

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;

pub use url::Url;

pub mod fetcher;
pub mod loader;

pub use fetcher::{Fetcher, OfflineFetcher};
pub use loader::{HttpFetcher, LoaderConfig};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Network unavailable for {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// An outgoing request as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a request with an arbitrary method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse `url` and create a GET request for it.
    pub fn parse_get(url: &str) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|e| NetError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::get(url))
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this is a GET request.
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Identity used for cache lookups: the URL without its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL, when the response came from the network.
    pub url: Option<Url>,
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Create a response with the canonical status text.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url: None,
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Override the status text.
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Record the URL the response was served from.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Check if the response status is 2xx.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get content-type from headers.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com/app.js").unwrap();
        let request = Request::get(url.clone()).header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("application/javascript"),
        );

        assert_eq!(request.url, url);
        assert!(request.is_get());
        assert!(request.headers.contains_key("accept"));
    }

    #[test]
    fn test_request_id_uniqueness() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("req-"));
    }

    #[test]
    fn test_cache_key_strips_fragment() {
        let request = Request::parse_get("https://example.com/index.html#top").unwrap();
        assert_eq!(request.cache_key(), "https://example.com/index.html");

        let post = Request::new(Method::POST, Url::parse("https://example.com/api").unwrap());
        assert!(!post.is_get());
    }

    #[test]
    fn test_parse_get_rejects_garbage() {
        assert!(matches!(
            Request::parse_get("not a url"),
            Err(NetError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_response_defaults() {
        let response = Response::new(StatusCode::SERVICE_UNAVAILABLE, "Offline");
        assert_eq!(response.status_text, "Service Unavailable");
        assert!(!response.ok());
        assert_eq!(response.text().unwrap(), "Offline");

        let ok = Response::new(StatusCode::OK, Bytes::new()).with_header(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("text/html"),
        );
        assert!(ok.ok());
        assert_eq!(ok.content_type(), Some("text/html"));
    }
}
