//! Message handler: commands posted by controlled pages.

use std::sync::Arc;

use futures::future::join_all;
use offline_net::{NetError, Request};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::event::ExtendableEvent;
use crate::worker::OfflineWorker;
use crate::WorkerError;

/// A command from a page, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// `{"type": "SKIP_WAITING"}`
    SkipWaiting,
    /// `{"type": "CACHE_URLS", "urls": [...]}`
    CacheUrls { urls: Vec<String> },
}

impl WorkerMessage {
    /// Parse a message payload. Anything unrecognised yields `None`.
    pub fn parse(data: &Value) -> Option<Self> {
        match serde_json::from_value(data.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognised message");
                None
            }
        }
    }
}

/// Outcome of a `CACHE_URLS` batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheUrlsReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

impl OfflineWorker {
    /// Dispatch a message. `CACHE_URLS` work runs in the background on
    /// `event`; nothing is reported back to the sender.
    pub fn handle_message(
        self: &Arc<Self>,
        event: &ExtendableEvent,
        data: &Value,
    ) -> Option<WorkerMessage> {
        let message = WorkerMessage::parse(data)?;

        match &message {
            WorkerMessage::SkipWaiting => self.skip_waiting(),
            WorkerMessage::CacheUrls { urls } => {
                let worker = Arc::clone(self);
                let urls = urls.clone();
                event.wait_until(async move {
                    worker.cache_urls(&urls).await;
                });
            }
        }

        Some(message)
    }

    /// Fetch each URL and store it in the runtime store. Failures are
    /// logged per URL and never abort the rest of the batch.
    pub async fn cache_urls(&self, urls: &[String]) -> CacheUrlsReport {
        let cache_name = self.config.runtime_cache_name.as_str();
        let mut report = CacheUrlsReport::default();

        if let Err(e) = self.storage.open(cache_name).await {
            warn!(cache = cache_name, error = %e, "Failed to open runtime cache");
            report.failed = urls.to_vec();
            return report;
        }

        let results = join_all(urls.iter().map(|url| self.cache_url(cache_name, url))).await;

        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(()) => report.cached.push(url.clone()),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to cache");
                    report.failed.push(url.clone());
                }
            }
        }

        info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            "CACHE_URLS batch finished"
        );
        report
    }

    async fn cache_url(&self, cache_name: &str, url: &str) -> Result<(), WorkerError> {
        let resolved = self
            .config
            .resolve(url)
            .map_err(|e| NetError::InvalidUrl(format!("{url}: {e}")))?;
        let request = Request::get(resolved);
        let response = self.fetcher.fetch(&request).await?;
        self.storage.put(cache_name, &request, &response).await?;
        Ok(())
    }
}
