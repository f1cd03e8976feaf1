//! The worker instance the handlers hang off.
//!
//! Handlers live in their own modules as `impl OfflineWorker` blocks:
//! [`install`](crate::install), [`activate`](crate::activate),
//! [`strategy`](crate::strategy) and [`message`](crate::message).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use offline_net::Fetcher;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::lifecycle::{Clients, ServiceWorkerId};
use crate::pattern::CdnPatternSet;
use crate::WorkerError;

/// One version of the offline worker.
pub struct OfflineWorker {
    pub(crate) id: ServiceWorkerId,
    pub(crate) config: Arc<WorkerConfig>,
    pub(crate) cdn_patterns: CdnPatternSet,
    pub(crate) storage: Arc<dyn CacheStorage>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) clients: Arc<RwLock<Clients>>,
    skip_waiting: AtomicBool,
}

impl OfflineWorker {
    /// Create a worker. The configuration is validated and the CDN patterns
    /// compiled here, once.
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, WorkerError> {
        config.validate()?;
        let cdn_patterns = CdnPatternSet::compile(&config.cdn_patterns)?;

        let id = ServiceWorkerId::new();
        debug!(worker = %id, version = %config.static_cache_name, "Worker created");

        Ok(Self {
            id,
            config,
            cdn_patterns,
            storage,
            fetcher,
            clients: Arc::new(RwLock::new(Clients::new())),
            skip_waiting: AtomicBool::new(false),
        })
    }

    /// Share a clients registry with the host.
    pub fn with_clients(mut self, clients: Arc<RwLock<Clients>>) -> Self {
        self.clients = clients;
        self
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn clients(&self) -> &Arc<RwLock<Clients>> {
        &self.clients
    }

    /// Ask the host to activate this version without waiting for pages to close.
    pub fn skip_waiting(&self) {
        if !self.skip_waiting.swap(true, Ordering::SeqCst) {
            debug!(worker = %self.id, "Skip waiting requested");
        }
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("id", &self.id)
            .field("static_cache_name", &self.config.static_cache_name)
            .field("runtime_cache_name", &self.config.runtime_cache_name)
            .field("skip_waiting", &self.skip_waiting_requested())
            .finish_non_exhaustive()
    }
}
