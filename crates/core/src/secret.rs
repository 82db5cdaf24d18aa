//! Consumer signing credentials and the cache entries that hold them.

use serde::{Deserialize, Serialize};

/// A signing credential for one consumer, as returned by the gateway admin
/// API's JWT-credential endpoint.
///
/// `consumer.id` is carried alongside the credential itself so every
/// reader/writer can re-check it against the consumer id it was requested
/// for — the anti-pollution invariant enforced by the resilient wrapper
/// and the stale cache on every read and write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerSecret {
    pub credential_id: String,
    /// `kid`-equivalent signing key identifier.
    pub key: String,
    pub secret: Vec<u8>,
    pub consumer_id: String,
}

impl ConsumerSecret {
    /// True iff this secret's embedded consumer id matches `requested`.
    pub fn matches_consumer(&self, requested: &str) -> bool {
        self.consumer_id == requested
    }
}

/// A cached secret plus the monotonic timestamp (milliseconds, from
/// whatever clock the owning cache uses) it was inserted at, keyed by
/// `"consumer_secret:" + consumer_id` wherever it lives.
///
/// The timestamp is a plain `u64` rather than `std::time::Instant` so
/// callers can drive it from an injected clock (real or fake) instead of
/// the process clock — the resilience crate's circuit breaker and stale
/// cache share one such clock so tests can advance time deterministically.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: ConsumerSecret,
    pub inserted_at_ms: u64,
}

impl CacheEntry {
    pub fn new(value: ConsumerSecret, now_ms: u64) -> Self {
        Self {
            value,
            inserted_at_ms: now_ms,
        }
    }

    /// True iff this entry is still within `ttl_ms` of its insertion time.
    pub fn is_fresh(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.inserted_at_ms) <= ttl_ms
    }
}

/// Build the cache key for a consumer id, per spec §3.
pub fn cache_key(consumer_id: &str) -> String {
    format!("consumer_secret:{consumer_id}")
}
