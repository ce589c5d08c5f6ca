//! Cache-aside store with soft-delete tombstones.
//!
//! Read-heavy entities (website, session) are fronted by a flat keyed byte
//! store. The primary store stays the source of truth: every backend fault is
//! downgraded to a cache miss and the loader runs against the primary store.
//! A deleted key can be tombstoned so lookups short-circuit to "not found"
//! without touching the primary store at all.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// Flat string-keyed byte store. No TTL semantics required.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
}

/// In-process reference backend. Suitable for tests and single-process
/// deployments; a shared deployment would swap in a networked store behind
/// the same trait.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// On-the-wire cache entry. A tagged variant rather than a sentinel value,
/// so a legitimate payload can never collide with the tombstone marker.
#[derive(Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
enum CacheEntry<T> {
    Value(T),
    Tombstone,
}

/// Cache-aside wrapper. `None` backend means caching is unconfigured and
/// every operation degrades transparently to a direct loader call.
#[derive(Clone, Default)]
pub struct CacheStore {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A store with no backend; all operations pass through.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Read-through fetch.
    ///
    /// Tombstone ⇒ `None` without invoking the loader. Hit ⇒ cached value.
    /// Miss ⇒ invoke the loader; a present result is written back
    /// best-effort, an absent result is returned uncached (negative results
    /// are only ever cached as explicit tombstones).
    pub async fn fetch<T, F, Fut>(&self, key: &str, loader: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let Some(backend) = &self.backend else {
            return loader().await;
        };

        match backend.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
                Ok(CacheEntry::Tombstone) => return Ok(None),
                Ok(CacheEntry::Value(v)) => return Ok(Some(v)),
                Err(e) => debug!(key, error = %e, "undecodable cache entry, treating as miss"),
            },
            Ok(None) => {}
            Err(e) => debug!(key, error = %e, "cache read failed, treating as miss"),
        }

        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.write(backend, key, &CacheEntry::Value(value)).await;
        }
        Ok(loaded)
    }

    /// Unconditional write-through.
    pub async fn store<T: Serialize>(&self, key: &str, value: &T) {
        if let Some(backend) = &self.backend {
            self.write(backend, key, &CacheEntry::Value(value)).await;
        }
    }

    /// `soft` writes a tombstone so future fetches short-circuit to absent;
    /// hard delete removes the key so future fetches fall through to the
    /// primary store again.
    pub async fn delete(&self, key: &str, soft: bool) {
        let Some(backend) = &self.backend else {
            return;
        };
        if soft {
            self.write(backend, key, &CacheEntry::<()>::Tombstone).await;
        } else if let Err(e) = backend.del(key).await {
            debug!(key, error = %e, "cache delete failed");
        }
    }

    async fn write<T: Serialize>(&self, backend: &Arc<dyn CacheBackend>, key: &str, entry: &T) {
        match serde_json::to_vec(entry) {
            Ok(bytes) => {
                if let Err(e) = backend.set(key, bytes).await {
                    debug!(key, error = %e, "cache write failed");
                }
            }
            Err(e) => debug!(key, error = %e, "cache encode failed"),
        }
    }
}

/// Cache key for a website record.
pub fn website_key(id: &str) -> String {
    format!("website:{id}")
}

/// Cache key for a session record.
pub fn session_key(id: &str) -> String {
    format!("session:{id}")
}
