//! Test doubles for the network and cache storage seams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use http::StatusCode;
use offline_net::{Fetcher, NetError, Request, Response, Url};
use tokio::sync::Notify;

use crate::cache::{CacheEntry, CacheError, CacheStorage, MemoryCacheStorage};
use crate::config::WorkerConfig;
use crate::worker::OfflineWorker;

pub(crate) const SCOPE: &str = "https://app.example.com/";

/// Two-asset configuration scoped to `SCOPE`.
pub(crate) fn test_config() -> WorkerConfig {
    WorkerConfig {
        static_assets: vec!["./".to_string(), "./index.html".to_string()],
        ..WorkerConfig::for_scope(Url::parse(SCOPE).unwrap())
    }
}

pub(crate) fn worker(
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
) -> OfflineWorker {
    OfflineWorker::new(Arc::new(config), storage, fetcher).unwrap()
}

pub(crate) fn get(url: &str) -> Request {
    Request::parse_get(url).unwrap()
}

enum Route {
    Respond(StatusCode, String),
    Fail,
}

/// Fetcher answering from a fixed table. Unknown URLs fail like a dead network.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(self, url: &str, status: u16, body: &str) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.routes
            .lock()
            .unwrap()
            .insert(normalize(url), Route::Respond(status, body.to_string()));
        self
    }

    pub(crate) fn fail(self, url: &str) -> Self {
        self.routes.lock().unwrap().insert(normalize(url), Route::Fail);
        self
    }

    pub(crate) fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url).unwrap().to_string()
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline(url));
        }
        match self.routes.lock().unwrap().get(&url) {
            Some(Route::Respond(status, body)) => Ok(Response::new(*status, body.clone())
                .with_url(request.url.clone())),
            Some(Route::Fail) | None => Err(NetError::RequestFailed(format!("unreachable: {url}"))),
        }
    }
}

/// Memory storage with injectable failures.
#[derive(Default)]
pub(crate) struct FlakyStorage {
    pub(crate) inner: MemoryCacheStorage,
    pub(crate) failing_deletes: HashSet<String>,
    pub(crate) fail_keys: bool,
    pub(crate) fail_puts: bool,
    pub(crate) fail_lookups: bool,
}

fn unavailable(what: &str) -> CacheError {
    CacheError::Unavailable(format!("injected {what} failure"))
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        if self.fail_keys {
            return Err(unavailable("keys"));
        }
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        if self.failing_deletes.contains(name) {
            return Err(unavailable("delete"));
        }
        self.inner.delete(name).await
    }

    async fn put(
        &self,
        name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), CacheError> {
        if self.fail_puts {
            return Err(unavailable("put"));
        }
        self.inner.put(name, request, response).await
    }

    async fn match_in(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        if self.fail_lookups {
            return Err(unavailable("match"));
        }
        self.inner.match_in(name, request).await
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        if self.fail_lookups {
            return Err(unavailable("match"));
        }
        self.inner.match_request(request).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheEntry>, CacheError> {
        self.inner.entries(name).await
    }
}

/// Memory storage whose writes block until `release` is notified.
#[derive(Default)]
pub(crate) struct GatedStorage {
    pub(crate) inner: MemoryCacheStorage,
    pub(crate) release: Notify,
}

#[async_trait]
impl CacheStorage for GatedStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.delete(name).await
    }

    async fn put(
        &self,
        name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), CacheError> {
        self.release.notified().await;
        self.inner.put(name, request, response).await
    }

    async fn match_in(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        self.inner.match_in(name, request).await
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        self.inner.match_request(request).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheEntry>, CacheError> {
        self.inner.entries(name).await
    }
}
