//! Named cache stores mapping request identity to response snapshots.
//!
//! [`CacheStorage`] is the seam the handlers talk to. [`MemoryCacheStorage`]
//! keeps every store in memory and can be saved to and restored from a JSON
//! snapshot file.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hashbrown::HashMap;
use http::{HeaderMap, StatusCode};
use offline_net::{Request, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Errors that can occur in cache storage operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache not found: {0}")]
    NotFound(String),

    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

// ==================== Entries ====================

/// A stored response snapshot.
///
/// Status and headers are kept exactly as captured. Snapshot files with an
/// out-of-range status or an invalid header fail to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL (cache key).
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    #[serde(with = "status_code")]
    pub status: StatusCode,

    /// Response status text.
    pub status_text: String,

    /// Response headers, duplicates preserved.
    #[serde(with = "header_map")]
    pub headers: HeaderMap,

    /// Response body.
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture a response for `request`.
    pub fn capture(request: &Request, response: &Response) -> Self {
        Self {
            url: request.cache_key(),
            method: request.method.to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.body.to_vec(),
            cached_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Rebuild a response from the snapshot.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(self.status, self.body.clone())
            .with_status_text(self.status_text.clone());
        response.headers = self.headers.clone();
        response
    }
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod status_code {
    use http::StatusCode;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(status.as_u16())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StatusCode, D::Error> {
        let code = u16::deserialize(deserializer)?;
        StatusCode::from_u16(code).map_err(serde::de::Error::custom)
    }
}

/// Headers as `[name, base64(value)]` pairs, so non-UTF-8 values survive.
mod header_map {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use http::{HeaderMap, HeaderName, HeaderValue};
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(headers.len()))?;
        for (name, value) in headers {
            seq.serialize_element(&(name.as_str(), STANDARD.encode(value.as_bytes())))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HeaderMap, D::Error> {
        let pairs = Vec::<(String, String)>::deserialize(deserializer)?;
        let mut headers = HeaderMap::with_capacity(pairs.len());
        for (name, encoded) in pairs {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(D::Error::custom)?;
            let raw = STANDARD.decode(encoded).map_err(D::Error::custom)?;
            let value = HeaderValue::from_bytes(&raw).map_err(D::Error::custom)?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

// ==================== Cache ====================

/// A single named store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries keyed by request identity.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        if !request.is_get() {
            return None;
        }
        self.entries.get(&request.cache_key())
    }

    /// Store a snapshot, replacing any previous one for the same request.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    /// All keys (URLs), sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// The origin's set of named cache stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a store, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Check if a store exists.
    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    /// Names of all stores, in creation order.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a store. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Store a snapshot of `response` for `request`, creating the store if needed.
    async fn put(&self, name: &str, request: &Request, response: &Response)
        -> Result<(), CacheError>;

    /// Look up a request in one store.
    async fn match_in(&self, name: &str, request: &Request)
        -> Result<Option<Response>, CacheError>;

    /// Look up a request across every store, oldest store first.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError>;

    /// Every entry of one store, sorted by URL.
    async fn entries(&self, name: &str) -> Result<Vec<CacheEntry>, CacheError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    caches: Vec<Cache>,
}

/// In-memory cache storage.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<Cache>>,
}

impl MemoryCacheStorage {
    /// Create new, empty cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore storage from a snapshot file. A missing file yields empty storage.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No cache snapshot, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&raw)?;
        debug!(path = %path.display(), caches = snapshot.caches.len(), "Cache snapshot loaded");
        Ok(Self {
            caches: RwLock::new(snapshot.caches),
        })
    }

    /// Write every store to a snapshot file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), CacheError> {
        let path = path.as_ref();
        let raw = {
            let caches = self.caches.read().await;
            serde_json::to_vec_pretty(&Snapshot {
                caches: caches.clone(),
            })?
        };
        tokio::fs::write(path, raw).await?;
        debug!(path = %path.display(), "Cache snapshot saved");
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let mut caches = self.caches.write().await;
        if !caches.iter().any(|c| c.name == name) {
            trace!(cache = name, "Creating cache");
            caches.push(Cache::new(name));
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.read().await.iter().any(|c| c.name == name))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|c| c.name != name);
        Ok(caches.len() != before)
    }

    async fn put(
        &self,
        name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::capture(request, response);
        let mut caches = self.caches.write().await;
        let index = match caches.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                caches.push(Cache::new(name));
                caches.len() - 1
            }
        };
        trace!(cache = name, url = %entry.url, status = entry.status.as_u16(), "Cache put");
        caches[index].put(entry);
        Ok(())
    }

    async fn match_in(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.match_request(request))
            .map(CacheEntry::to_response))
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find_map(|c| c.match_request(request))
            .map(CacheEntry::to_response))
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheEntry>, CacheError> {
        let caches = self.caches.read().await;
        let cache = caches
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CacheError::NotFound(name.to_string()))?;
        Ok(cache
            .keys()
            .into_iter()
            .filter_map(|key| cache.entries.get(key).cloned())
            .collect())
    }
}
