//! # Offline Service Worker
//!
//! Offline availability for a web application: the application shell is
//! cached at install time and served cache-first, third-party CDN scripts
//! are served network-first with a cached fallback.
//!
//! ## Features
//!
//! - **Install**: populate the versioned static store, all-or-nothing
//! - **Activate**: delete stores from previous versions, claim open pages
//! - **Fetch**: Cache-First for static assets, Network-First for CDN URLs
//! - **Message**: `SKIP_WAITING` and `CACHE_URLS` commands from pages
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerRegistration (scope)
//!     ├── installing / waiting / active (OfflineWorker)
//!     └── Clients
//!
//! OfflineWorker
//!     ├── WorkerConfig       (store names, assets, CDN patterns)
//!     ├── dyn CacheStorage   (named stores: Request → Response)
//!     └── dyn Fetcher        (network)
//! ```

use thiserror::Error;

pub mod activate;
pub mod cache;
pub mod config;
pub mod event;
pub mod install;
pub mod lifecycle;
pub mod message;
pub mod pattern;
pub mod registration;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use activate::ActivationReport;
pub use cache::{Cache, CacheEntry, CacheError, CacheStorage, MemoryCacheStorage};
pub use config::{ConfigError, WorkerConfig};
pub use event::{ExtendableEvent, FetchEvent};
pub use lifecycle::{Client, Clients, ServiceWorker, ServiceWorkerId, ServiceWorkerState};
pub use message::{CacheUrlsReport, WorkerMessage};
pub use pattern::{CdnPatternSet, PatternType, UrlPattern};
pub use registration::{RegistrationEvent, ServiceWorkerRegistration, WorkerSlot};
pub use strategy::{FetchResponse, RequestClass, ResponseSource};
pub use worker::OfflineWorker;

pub use offline_net::{Fetcher, NetError, Request, Response};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install failed for {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    StateError(String),
}
