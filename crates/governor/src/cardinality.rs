//! Cardinality Governor (C2) — maps an unbounded consumer-id domain onto a
//! bounded metric-attribute domain.
//!
//! Shaped after `rustedclaw-telemetry::TelemetryEngine`: a
//! `std::sync::RwLock`-guarded struct with running counters and an
//! explicit, idempotent reset. Unlike that engine this one never holds the
//! lock across I/O — every operation here is pure bookkeeping.

use std::collections::HashSet;
use std::sync::RwLock;

use tracing::warn;

/// Number of hash buckets (`H` in spec §3) that overflow ids fall into.
pub const DEFAULT_BUCKET_COUNT: u32 = 1000;

/// Fraction of `max_unique` at which a one-time warning counter fires.
const DEFAULT_WARN_FRACTION: f64 = 0.8;

struct Inner {
    tracked: HashSet<String>,
    limit_exceeded: bool,
    warned: bool,
}

/// Thread-safe cardinality tracker. One instance per metric dimension
/// that needs bounding (e.g. one for the consumer-id label).
pub struct CardinalityGovernor {
    max_unique: usize,
    buckets: u32,
    warn_fraction: f64,
    inner: RwLock<Inner>,
    warnings_emitted: std::sync::atomic::AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CardinalityStats {
    pub tracked: usize,
    pub limit_exceeded: bool,
}

impl CardinalityGovernor {
    pub fn new(max_unique: usize) -> Self {
        Self::with_buckets(max_unique, DEFAULT_BUCKET_COUNT)
    }

    pub fn with_buckets(max_unique: usize, buckets: u32) -> Self {
        Self {
            max_unique,
            buckets: buckets.max(1),
            warn_fraction: DEFAULT_WARN_FRACTION,
            inner: RwLock::new(Inner {
                tracked: HashSet::new(),
                limit_exceeded: false,
                warned: false,
            }),
            warnings_emitted: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Bound an arbitrary consumer id to a finite-domain metric attribute
    /// (spec §4.2).
    pub fn bound(&self, id: &str) -> String {
        if id.is_empty() {
            return "unknown".into();
        }

        {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if inner.tracked.contains(id) {
                return id.to_string();
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        // Re-check under the write lock: another thread may have inserted
        // this id (or pushed us over the limit) between the two locks.
        if inner.tracked.contains(id) {
            return id.to_string();
        }

        if inner.tracked.len() < self.max_unique {
            inner.tracked.insert(id.to_string());
            self.maybe_warn(&mut inner);
            id.to_string()
        } else {
            inner.limit_exceeded = true;
            self.hash_bucket_name(id)
        }
    }

    /// Always returns the bucket form, regardless of tracked state — for
    /// callers that want uniform low cardinality unconditionally.
    pub fn hash_bucket(&self, id: &str) -> String {
        if id.is_empty() {
            return "unknown".into();
        }
        self.hash_bucket_name(id)
    }

    fn hash_bucket_name(&self, id: &str) -> String {
        let bucket = djb2(id) % self.buckets;
        format!("bucket_{bucket:03}")
    }

    fn maybe_warn(&self, inner: &mut Inner) {
        if inner.warned {
            return;
        }
        let threshold = (self.max_unique as f64 * self.warn_fraction) as usize;
        if inner.tracked.len() >= threshold {
            inner.warned = true;
            self.warnings_emitted
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            warn!(
                tracked = inner.tracked.len(),
                max_unique = self.max_unique,
                "cardinality governor crossed warning threshold"
            );
        }
    }

    /// Reset the tracked set and the limit-exceeded flag. Idempotent and
    /// atomic from the caller's point of view.
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.tracked = HashSet::new();
        inner.limit_exceeded = false;
        inner.warned = false;
    }

    pub fn stats(&self) -> CardinalityStats {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        CardinalityStats {
            tracked: inner.tracked.len(),
            limit_exceeded: inner.limit_exceeded,
        }
    }

    pub fn warnings_emitted(&self) -> u64 {
        self.warnings_emitted.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// djb2 string hash, per spec §4.2: `h=5381; h = (h*33) XOR c` for each byte,
/// returned as an unsigned 32-bit integer.
pub fn djb2(s: &str) -> u32 {
    let mut h: u32 = 5381;
    for &c in s.as_bytes() {
        h = h.wrapping_mul(33) ^ u32::from(c);
    }
    h
}
