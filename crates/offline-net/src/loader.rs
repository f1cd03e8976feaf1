//! reqwest-backed fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, trace};

use crate::{Fetcher, NetError, Request, Response};

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout. `None` lets a request run until the transport gives up.
    pub timeout: Option<Duration>,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("offline-sw/{}", env!("CARGO_PKG_VERSION")),
            timeout: None,
            max_redirects: 10,
        }
    }
}

/// Fetches requests over the real network.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        info!(user_agent = %config.user_agent, "HttpFetcher initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        match request.url.scheme() {
            "http" | "https" => {}
            other => return Err(NetError::UnsupportedScheme(other.to_string())),
        }

        debug!(id = %request.id, url = %request.url, method = %request.method, "Fetching resource");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        let mut response = Response::new(status, body).with_url(url);
        response.headers = headers;
        Ok(response)
    }
}
