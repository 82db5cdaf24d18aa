//! The in-process counters emitted by the token-issuance handler and
//! health aggregator (spec §4.8/§4.9).
//!
//! Shaped after `rustedclaw-telemetry::engine::TelemetryEngine`: a
//! `RwLock`-guarded struct holding running totals, with a typed snapshot
//! method for the `/metrics` endpoint rather than a push-based exporter —
//! OTLP/Prometheus export wiring is out of scope (spec §1).

use std::sync::RwLock;

use serde::Serialize;

use sidecar_governor::VolumeBucket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthResult {
    Success,
    HeaderValidationFailed,
    KongUnavailable,
    ConsumerLookupFailed,
}

impl AuthResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthResult::Success => "success",
            AuthResult::HeaderValidationFailed => "header_validation_failed",
            AuthResult::KongUnavailable => "kong_unavailable",
            AuthResult::ConsumerLookupFailed => "consumer_lookup_failed",
        }
    }
}

#[derive(Debug, Default)]
struct LatencyAccumulator {
    count: u64,
    sum_ms: u64,
}

impl LatencyAccumulator {
    fn record(&mut self, millis: u64) {
        self.count += 1;
        self.sum_ms += millis;
    }

    fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    auth_success: u64,
    auth_header_validation_failed: u64,
    auth_kong_unavailable: u64,
    auth_consumer_lookup_failed: u64,

    requests_high: u64,
    requests_medium: u64,
    requests_low: u64,

    jwt_tokens_issued: u64,

    latency_high: LatencyAccumulator,
    latency_medium: LatencyAccumulator,
    latency_low: LatencyAccumulator,
}

/// Process-wide request telemetry. One instance lives for the process
/// lifetime, constructed at startup (spec §9 "avoid module-level mutable
/// state; tests must be able to create and destroy fresh instances").
#[derive(Default)]
pub struct TelemetryEngine {
    counters: RwLock<Counters>,
}

impl TelemetryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_auth_attempt(&self, result: AuthResult) {
        let mut c = self.counters.write().unwrap_or_else(|e| e.into_inner());
        match result {
            AuthResult::Success => c.auth_success += 1,
            AuthResult::HeaderValidationFailed => c.auth_header_validation_failed += 1,
            AuthResult::KongUnavailable => c.auth_kong_unavailable += 1,
            AuthResult::ConsumerLookupFailed => c.auth_consumer_lookup_failed += 1,
        }
    }

    pub fn record_consumer_request(&self, volume: VolumeBucket) {
        let mut c = self.counters.write().unwrap_or_else(|e| e.into_inner());
        match volume {
            VolumeBucket::High => c.requests_high += 1,
            VolumeBucket::Medium => c.requests_medium += 1,
            VolumeBucket::Low => c.requests_low += 1,
        }
    }

    pub fn record_token_issued(&self) {
        let mut c = self.counters.write().unwrap_or_else(|e| e.into_inner());
        c.jwt_tokens_issued += 1;
    }

    pub fn record_consumer_latency(&self, volume: VolumeBucket, millis: u64) {
        let mut c = self.counters.write().unwrap_or_else(|e| e.into_inner());
        match volume {
            VolumeBucket::High => c.latency_high.record(millis),
            VolumeBucket::Medium => c.latency_medium.record(millis),
            VolumeBucket::Low => c.latency_low.record(millis),
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let c = self.counters.read().unwrap_or_else(|e| e.into_inner());
        TelemetrySnapshot {
            authentication_attempts: AuthAttemptCounts {
                success: c.auth_success,
                header_validation_failed: c.auth_header_validation_failed,
                kong_unavailable: c.auth_kong_unavailable,
                consumer_lookup_failed: c.auth_consumer_lookup_failed,
            },
            consumer_requests: VolumeCounts {
                high: c.requests_high,
                medium: c.requests_medium,
                low: c.requests_low,
            },
            jwt_tokens_issued: c.jwt_tokens_issued,
            consumer_latency_ms_avg: VolumeAverages {
                high: c.latency_high.avg_ms(),
                medium: c.latency_medium.avg_ms(),
                low: c.latency_low.avg_ms(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthAttemptCounts {
    pub success: u64,
    pub header_validation_failed: u64,
    pub kong_unavailable: u64,
    pub consumer_lookup_failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeAverages {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

/// Served by `GET /metrics` (spec §6, ambient `?view=` query support
/// lives in `sidecar-gateway`; this is the full, unfiltered snapshot).
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub authentication_attempts: AuthAttemptCounts,
    pub consumer_requests: VolumeCounts,
    pub jwt_tokens_issued: u64,
    pub consumer_latency_ms_avg: VolumeAverages,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_engine_has_zeroed_counters() {
        let engine = TelemetryEngine::new();
        let snap = engine.snapshot();
        assert_eq!(snap.jwt_tokens_issued, 0);
        assert_eq!(snap.authentication_attempts.success, 0);
    }

    #[test]
    fn records_auth_attempts_by_result() {
        let engine = TelemetryEngine::new();
        engine.record_auth_attempt(AuthResult::Success);
        engine.record_auth_attempt(AuthResult::Success);
        engine.record_auth_attempt(AuthResult::KongUnavailable);

        let snap = engine.snapshot();
        assert_eq!(snap.authentication_attempts.success, 2);
        assert_eq!(snap.authentication_attempts.kong_unavailable, 1);
    }

    #[test]
    fn records_consumer_requests_by_volume() {
        let engine = TelemetryEngine::new();
        engine.record_consumer_request(VolumeBucket::High);
        engine.record_consumer_request(VolumeBucket::Low);
        engine.record_consumer_request(VolumeBucket::Low);

        let snap = engine.snapshot();
        assert_eq!(snap.consumer_requests.high, 1);
        assert_eq!(snap.consumer_requests.low, 2);
    }

    #[test]
    fn latency_average_computed_per_bucket() {
        let engine = TelemetryEngine::new();
        engine.record_consumer_latency(VolumeBucket::Medium, 100);
        engine.record_consumer_latency(VolumeBucket::Medium, 200);

        let snap = engine.snapshot();
        assert!((snap.consumer_latency_ms_avg.medium - 150.0).abs() < 1e-9);
        assert_eq!(snap.consumer_latency_ms_avg.high, 0.0);
    }

    #[test]
    fn token_issued_counter_increments() {
        let engine = TelemetryEngine::new();
        engine.record_token_issued();
        engine.record_token_issued();
        assert_eq!(engine.snapshot().jwt_tokens_issued, 2);
    }
}
