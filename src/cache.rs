//! Keyed response cache for GET handlers.
//!
//! Entries are keyed by request path, optionally scoped to the calling user.
//! Readers go through [`ResponseCache::get_or_insert_with`]; writers evict the
//! exact key shape they affect with [`ResponseCache::invalidate`] or every
//! variant of a path with [`ResponseCache::invalidate_path`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use moka::future::Cache;
use moka::Expiry;
use serde::Serialize;
use tracing::{debug, trace};
use uuid::Uuid;

const MAX_ENTRIES: u64 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: String,
    pub user: Option<Uuid>,
}

impl CacheKey {
    /// One entry shared by every caller.
    pub fn shared(path: impl Into<String>) -> Self {
        Self { path: path.into(), user: None }
    }

    /// One entry per caller.
    pub fn for_user(path: impl Into<String>, user: Uuid) -> Self {
        Self { path: path.into(), user: Some(user) }
    }
}

#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub body: Bytes,
    ttl: Duration,
}

impl CachedResponse {
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self { status, body: Bytes::from(body), ttl: Duration::ZERO })
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            self.body,
        )
            .into_response()
    }
}

struct PerEntryTtl;

impl Expiry<CacheKey, CachedResponse> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CachedResponse,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<CacheKey, CachedResponse>,
    generations: Arc<Mutex<HashMap<String, u64>>>,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(default_ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            inner,
            generations: Arc::new(Mutex::new(HashMap::new())),
            default_ttl,
        }
    }

    fn generation(&self, path: &str) -> u64 {
        let generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        generations.get(path).copied().unwrap_or(0)
    }

    fn bump_generation(&self, path: &str) {
        let mut generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        *generations.entry(path.to_string()).or_insert(0) += 1;
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Serves `key` from the cache, or runs `produce` and stores its result
    /// for `ttl` when the status is `200 OK`.
    pub async fn get_or_insert_with<F, Fut, E>(
        &self,
        key: CacheKey,
        ttl: Duration,
        produce: F,
    ) -> Result<CachedResponse, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedResponse, E>>,
    {
        if let Some(hit) = self.inner.get(&key).await {
            trace!(path = %key.path, user = ?key.user, "Response cache hit");
            return Ok(hit);
        }

        let started = self.generation(&key.path);
        let mut fresh = produce().await?;
        if fresh.status != StatusCode::OK || ttl.is_zero() {
            return Ok(fresh);
        }
        if self.generation(&key.path) != started {
            debug!(path = %key.path, user = ?key.user, "Path invalidated while producing; not caching");
            return Ok(fresh);
        }

        fresh.ttl = ttl;
        self.inner.insert(key.clone(), fresh.clone()).await;
        // An invalidation that landed between the check and the insert may
        // have run its eviction before the entry existed.
        if self.generation(&key.path) != started {
            self.inner.invalidate(&key).await;
        }
        Ok(fresh)
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        debug!(path = %key.path, user = ?key.user, "Invalidating cached response");
        self.bump_generation(&key.path);
        self.inner.invalidate(key).await;
    }

    /// Evicts the shared entry and every per-user entry stored under `path`.
    pub async fn invalidate_path(&self, path: &str) {
        self.bump_generation(path);
        let stale: Vec<CacheKey> = self
            .inner
            .iter()
            .filter(|(key, _)| key.path == path)
            .map(|(key, _)| (*key).clone())
            .collect();
        debug!(path, entries = stale.len(), "Invalidating cached responses for path");
        for key in stale {
            self.inner.invalidate(&key).await;
        }
        self.inner.invalidate(&CacheKey::shared(path)).await;
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.inner.get(key).await.is_some()
    }
}
