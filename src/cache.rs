use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::{ConfigDocument, StatusDocument};
use crate::Result;

struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// One remote document slot: TTL staleness plus single-flight fetching.
///
/// An entry is only ever replaced whole, so a concurrent reader observes
/// either the previous document or the new one, never a partial mix.
pub struct CacheSlot<T> {
    name: &'static str,
    entry: Mutex<Option<Entry<T>>>,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl<T: Clone> CacheSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entry: Mutex::new(None),
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn fresh(&self, ttl: Duration) -> Option<T> {
        let guard = self.entry.lock();
        guard
            .as_ref()
            .filter(|e| e.fetched_at.elapsed() <= ttl)
            .map(|e| e.value.clone())
    }

    /// Last known value regardless of age.
    pub fn peek(&self) -> Option<T> {
        self.entry.lock().as_ref().map(|e| e.value.clone())
    }

    /// Serve from cache within `ttl`, otherwise fetch. Concurrent callers
    /// on a stale slot share one fetch: whoever wins the lock fetches, the
    /// rest find a fresh entry on re-check. A failed fetch leaves the
    /// previous entry untouched and resolves to it (or `None` if this was
    /// the first fetch).
    pub async fn get_or_fetch<F, Fut>(&self, ttl: Duration, fetch: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.fresh(ttl) {
            return Some(value);
        }

        let _flight = self.fetch_lock.lock().await;
        if let Some(value) = self.fresh(ttl) {
            return Some(value);
        }

        match fetch().await {
            Ok(value) => {
                debug!(doc = self.name, "cache entry refreshed");
                *self.entry.lock() = Some(Entry {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                });
                Some(value)
            }
            Err(e) => {
                warn!(doc = self.name, error = %e, "fetch failed, keeping last known value");
                self.peek()
            }
        }
    }

    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }
}

/// The two remote documents this engine tracks.
pub struct DocumentCache {
    pub(crate) status: CacheSlot<StatusDocument>,
    pub(crate) config: CacheSlot<ConfigDocument>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self {
            status: CacheSlot::new("status"),
            config: CacheSlot::new("config"),
        }
    }

    pub fn invalidate_status(&self) {
        self.status.invalidate();
    }

    pub fn invalidate_config(&self) {
        self.config.invalidate();
    }

    pub fn clear(&self) {
        self.status.invalidate();
        self.config.invalidate();
    }
}

impl Default for DocumentCache {
    fn default() -> Self {
        Self::new()
    }
}
