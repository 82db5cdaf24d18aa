//! Volume Classifier (C3) — buckets a consumer into `high`/`medium`/`low`
//! by rolling request count (spec §4.3).
//!
//! Not individually cardinality-safe: `counts` is keyed by the raw
//! consumer id. Callers tagging high-cardinality metrics must pass the
//! id through [`sidecar_governor::cardinality::CardinalityGovernor`]
//! first, or use only the bucket name this classifier returns.

use std::collections::HashMap;
use std::sync::RwLock;

const HIGH_THRESHOLD: u64 = 5000;
const MEDIUM_THRESHOLD: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeBucket {
    High,
    Medium,
    Low,
}

impl VolumeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeBucket::High => "high",
            VolumeBucket::Medium => "medium",
            VolumeBucket::Low => "low",
        }
    }

    fn of_count(count: u64) -> Self {
        if count > HIGH_THRESHOLD {
            VolumeBucket::High
        } else if count > MEDIUM_THRESHOLD {
            VolumeBucket::Medium
        } else {
            VolumeBucket::Low
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct VolumeStats {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub total: u64,
}

pub struct VolumeClassifier {
    counts: RwLock<HashMap<String, u64>>,
}

impl VolumeClassifier {
    pub fn new() -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Record one request for `id`.
    pub fn increment(&self, id: &str) {
        let mut counts = self.counts.write().unwrap_or_else(|e| e.into_inner());
        *counts.entry(id.to_string()).or_insert(0) += 1;
    }

    /// Current bucket for `id`. Consumers never observed return `Low`.
    pub fn bucket_of(&self, id: &str) -> VolumeBucket {
        let counts = self.counts.read().unwrap_or_else(|e| e.into_inner());
        VolumeBucket::of_count(counts.get(id).copied().unwrap_or(0))
    }

    /// Rollup across every tracked consumer.
    pub fn stats(&self) -> VolumeStats {
        let counts = self.counts.read().unwrap_or_else(|e| e.into_inner());
        let mut stats = VolumeStats::default();
        for &count in counts.values() {
            stats.total += count;
            match VolumeBucket::of_count(count) {
                VolumeBucket::High => stats.high += 1,
                VolumeBucket::Medium => stats.medium += 1,
                VolumeBucket::Low => stats.low += 1,
            }
        }
        stats
    }

    /// Clear the counts map at the configured reset cadence.
    pub fn reset(&self) {
        let mut counts = self.counts.write().unwrap_or_else(|e| e.into_inner());
        *counts = HashMap::new();
    }
}

impl Default for VolumeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_consumer_is_low() {
        let vc = VolumeClassifier::new();
        assert_eq!(vc.bucket_of("c1").as_str(), "low");
    }

    #[test]
    fn thresholds_classify_correctly() {
        let vc = VolumeClassifier::new();
        for _ in 0..=MEDIUM_THRESHOLD {
            vc.increment("c1");
        }
        assert_eq!(vc.bucket_of("c1"), VolumeBucket::Medium);

        for _ in 0..(HIGH_THRESHOLD - MEDIUM_THRESHOLD) {
            vc.increment("c1");
        }
        assert_eq!(vc.bucket_of("c1"), VolumeBucket::High);
    }

    #[test]
    fn boundary_exactly_at_threshold_is_not_yet_next_bucket() {
        let vc = VolumeClassifier::new();
        for _ in 0..MEDIUM_THRESHOLD {
            vc.increment("c1");
        }
        assert_eq!(vc.bucket_of("c1"), VolumeBucket::Low);
    }

    #[test]
    fn reset_zeroes_stats() {
        let vc = VolumeClassifier::new();
        vc.increment("c1");
        vc.increment("c2");
        assert_eq!(vc.stats().total, 2);

        vc.reset();
        assert_eq!(vc.stats().total, 0);
    }

    #[test]
    fn stats_rollup_counts_each_bucket() {
        let vc = VolumeClassifier::new();
        vc.increment("low-consumer");
        for _ in 0..=MEDIUM_THRESHOLD {
            vc.increment("medium-consumer");
        }
        let stats = vc.stats();
        assert_eq!(stats.low, 1);
        assert_eq!(stats.medium, 1);
        assert_eq!(stats.high, 0);
    }
}
