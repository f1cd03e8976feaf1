//! Install handler: populate the static store.

use futures::future::try_join_all;
use offline_net::{Request, Response};
use tracing::{debug, error, info, warn};

use crate::worker::OfflineWorker;
use crate::WorkerError;

impl OfflineWorker {
    /// Fetch every static asset and store it in the static store.
    ///
    /// All-or-nothing: a rejected fetch or a non-2xx status fails the whole
    /// install and nothing is written. On success the worker requests
    /// skip-waiting. Returns the number of assets cached.
    ///
    /// Writes start only after every fetch succeeded. When the static store
    /// already exists (a reinstall of the same version) and a write fails
    /// part way, the store is kept and may hold a mix of old and new
    /// entries. A store created by this install is deleted on failure.
    pub async fn install(&self) -> Result<usize, WorkerError> {
        info!(
            worker = %self.id,
            cache = %self.config.static_cache_name,
            "Installing"
        );

        match self.populate_static_cache().await {
            Ok(count) => {
                info!(worker = %self.id, assets = count, "Static assets cached, skip waiting");
                self.skip_waiting();
                Ok(count)
            }
            Err(e) => {
                error!(worker = %self.id, error = %e, "Cache installation failed");
                Err(e)
            }
        }
    }

    async fn populate_static_cache(&self) -> Result<usize, WorkerError> {
        let cache_name = self.config.static_cache_name.as_str();
        let requests: Vec<Request> = self
            .config
            .asset_urls()?
            .into_iter()
            .map(Request::get)
            .collect();

        let existed = self.storage.has(cache_name).await?;
        self.storage.open(cache_name).await?;

        let result = async {
            let responses = try_join_all(requests.iter().map(|r| self.fetch_asset(r))).await?;
            for (request, response) in requests.iter().zip(&responses) {
                self.storage.put(cache_name, request, response).await?;
            }
            Ok::<_, WorkerError>(requests.len())
        }
        .await;

        if result.is_err() && !existed {
            if let Err(e) = self.storage.delete(cache_name).await {
                warn!(cache = cache_name, error = %e, "Failed to discard partial static cache");
            }
        }
        result
    }

    async fn fetch_asset(&self, request: &Request) -> Result<Response, WorkerError> {
        let url = request.url.to_string();
        let response =
            self.fetcher
                .fetch(request)
                .await
                .map_err(|e| WorkerError::InstallFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;

        if !response.ok() {
            return Err(WorkerError::InstallFailed {
                url,
                reason: format!("unexpected status {}", response.status),
            });
        }

        debug!(url = %url, bytes = response.body.len(), "Fetched static asset");
        Ok(response)
    }
}
