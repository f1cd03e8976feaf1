//! Activate handler: drop stores from previous versions, then claim pages.

use futures::future::join_all;
use tracing::{info, warn};

use crate::worker::OfflineWorker;

/// What activation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale stores deleted.
    pub deleted: Vec<String>,
    /// Stale stores whose deletion failed.
    pub failed: Vec<String>,
    /// Clients that switched to this worker.
    pub claimed: Vec<String>,
}

impl OfflineWorker {
    /// Delete every store that is neither the static nor the runtime store,
    /// then claim all in-scope clients.
    ///
    /// Deletions run concurrently and fail independently. Cleanup always
    /// finishes before the claim.
    pub async fn activate(&self) -> ActivationReport {
        info!(worker = %self.id, "Activating");

        let mut report = self.delete_stale_caches().await;

        info!(worker = %self.id, "Claiming clients");
        report.claimed = self
            .clients
            .write()
            .await
            .claim(self.id, &self.config.scope);

        info!(
            worker = %self.id,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            claimed = report.claimed.len(),
            "Activated"
        );
        report
    }

    async fn delete_stale_caches(&self) -> ActivationReport {
        let mut report = ActivationReport::default();

        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list caches, skipping cleanup");
                return report;
            }
        };

        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| !self.config.retains(name))
            .collect();

        let results = join_all(stale.iter().map(|name| async move {
            info!(cache = %name, "Deleting old cache");
            self.storage.delete(name).await
        }))
        .await;

        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to delete old cache");
                    report.failed.push(name);
                }
            }
        }

        report
    }
}
