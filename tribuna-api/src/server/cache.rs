//! Time-boxed memoization of rendered feed pages.
//!
//! The index feed is served from this cache for [`PAGE_CACHE_TTL`] after it
//! is rendered, keyed by the full path and query so every page number caches
//! separately. Writes do not invalidate; staleness resolves by TTL expiry or
//! an explicit administrative clear.

use axum::{
    body::{Body, Bytes, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tracing::debug;

pub const PAGE_CACHE_TTL: Duration = Duration::from_secs(20);

#[derive(Clone, Debug)]
struct CachedPage {
    stored_at: Instant,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

#[derive(Clone, Debug)]
pub struct PageCache {
    entries: Arc<Mutex<HashMap<String, CachedPage>>>,
    ttl: Duration,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(PAGE_CACHE_TTL)
    }
}

impl PageCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Drop every cached page. The administrative clear operation.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedPage>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, key: &str) -> Option<CachedPage> {
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: String, entry: CachedPage) {
        self.lock().insert(key, entry);
    }
}

/// Middleware replaying the cached bytes of a previous 200 response for the
/// same path-and-query, rendering and storing on a miss.
pub async fn serve_cached(
    State(cache): State<PageCache>,
    request: Request,
    next: Next,
) -> Response {
    let key = request.uri().to_string();

    if let Some(entry) = cache.lookup(&key) {
        debug!(%key, "Serving page from cache");

        let mut response = Response::new(Body::from(entry.body));
        *response.status_mut() = entry.status;
        *response.headers_mut() = entry.headers;
        return response;
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let Ok(bytes) = to_bytes(body, usize::MAX).await else {
        let mut failure = Response::new(Body::empty());
        *failure.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return failure;
    };

    cache.store(
        key,
        CachedPage {
            stored_at: Instant::now(),
            status: parts.status,
            headers: parts.headers.clone(),
            body: bytes.clone(),
        },
    );

    Response::from_parts(parts, Body::from(bytes))
}
