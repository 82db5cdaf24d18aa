//! Stale cache (C7): local in-process map, or a shared KV store in HA
//! deployments. Spec §4.7.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use sidecar_core::{cache_key, CacheEntry, ConsumerSecret};

use crate::clock::Clock;

#[async_trait]
pub trait StaleCache: Send + Sync {
    async fn get(&self, consumer_id: &str) -> Option<ConsumerSecret>;
    async fn put(&self, consumer_id: &str, secret: ConsumerSecret);
    async fn evict(&self, consumer_id: &str);

    /// Number of entries held locally, or `None` when this cache has no
    /// local map to enumerate (shared/HA mode, spec §4.7).
    fn local_len(&self) -> Option<usize>;
}

/// Default, single-process cache: a TTL-bounded map guarded by a plain
/// `RwLock`, in the style of [`crate::governor`]'s cardinality tracker.
pub struct LocalStaleCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl LocalStaleCache {
    pub fn new(ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_ms,
            clock,
        }
    }
}

#[async_trait]
impl StaleCache for LocalStaleCache {
    async fn get(&self, consumer_id: &str) -> Option<ConsumerSecret> {
        let key = cache_key(consumer_id);
        let now = self.clock.now_millis();

        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(&key) {
                Some(entry) if entry.is_fresh(now, self.ttl_ms) => {
                    return Some(entry.value.clone());
                }
                Some(_) => {} // stale, fall through to evict below
                None => return None,
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&key);
        None
    }

    async fn put(&self, consumer_id: &str, secret: ConsumerSecret) {
        let key = cache_key(consumer_id);
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, CacheEntry::new(secret, now));
    }

    async fn evict(&self, consumer_id: &str) {
        let key = cache_key(consumer_id);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&key);
    }

    fn local_len(&self) -> Option<usize> {
        Some(self.entries.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}

#[derive(Debug, Error)]
pub enum SharedCacheError {
    #[error("shared cache transport error: {0}")]
    Transport(String),
}

/// The capability a shared KV store must expose for HA mode (spec §4.7):
/// a single stale read by key. No write path — writes stay best-effort
/// local, or are owned by whatever populates the shared store out of band.
#[async_trait]
pub trait SharedKvClient: Send + Sync {
    async fn get_stale(&self, key: &str) -> Result<Option<ConsumerSecret>, SharedCacheError>;
}

/// Wraps a [`SharedKvClient`] as a [`StaleCache`]. Read failures degrade to
/// a cache miss rather than a fatal error (spec §4.7); there is no local
/// map to enumerate, so inspection endpoints see zero entries.
pub struct SharedStaleCache {
    client: Arc<dyn SharedKvClient>,
}

impl SharedStaleCache {
    pub fn new(client: Arc<dyn SharedKvClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StaleCache for SharedStaleCache {
    async fn get(&self, consumer_id: &str) -> Option<ConsumerSecret> {
        let key = cache_key(consumer_id);
        match self.client.get_stale(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "shared cache read failed, treating as miss");
                None
            }
        }
    }

    async fn put(&self, _consumer_id: &str, _secret: ConsumerSecret) {
        // Shared mode has no write path through this interface (spec §4.7).
    }

    async fn evict(&self, _consumer_id: &str) {}

    fn local_len(&self) -> Option<usize> {
        None
    }
}
