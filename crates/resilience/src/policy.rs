//! Per-operation circuit breaker policy (spec §3 `OperationPolicy`, §4.6
//! defaults table).

use std::time::Duration;

/// The strategy applied when a breaker refuses a call. A closed tagged
/// variant matched exhaustively in one place (the wrapper) — adding a
/// strategy is a visible change there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Fail fast, return nothing.
    Deny,
    /// Serve a validated stale cache entry if one exists.
    Cache,
    /// Return a typed degraded response instead of failing the caller.
    GracefulDegradation,
}

const DEFAULT_VOLUME_THRESHOLD: u32 = 10;
const DEFAULT_ROLLING_COUNT_TIMEOUT: Duration = Duration::from_millis(10_000);
const DEFAULT_ROLLING_COUNT_BUCKETS: u32 = 10;

/// Static, read-only-after-construction policy for one named operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationPolicy {
    pub timeout: Duration,
    pub error_threshold_percent: u8,
    pub reset_timeout: Duration,
    pub volume_threshold: u32,
    pub rolling_count_timeout: Duration,
    pub rolling_count_buckets: u32,
    pub fallback_strategy: FallbackStrategy,
}

impl OperationPolicy {
    /// Built-in defaults for the three operations the sidecar names
    /// explicitly (spec §4.6). Any other operation name falls back to a
    /// conservative deny-on-open policy.
    pub fn defaults_for(op_name: &str) -> Self {
        match op_name {
            "getConsumerSecret" => Self {
                timeout: Duration::from_millis(3_000),
                error_threshold_percent: 50,
                reset_timeout: Duration::from_millis(60_000),
                volume_threshold: DEFAULT_VOLUME_THRESHOLD,
                rolling_count_timeout: DEFAULT_ROLLING_COUNT_TIMEOUT,
                rolling_count_buckets: DEFAULT_ROLLING_COUNT_BUCKETS,
                fallback_strategy: FallbackStrategy::Cache,
            },
            "createConsumerSecret" => Self {
                timeout: Duration::from_millis(5_000),
                error_threshold_percent: 30,
                reset_timeout: Duration::from_millis(120_000),
                volume_threshold: DEFAULT_VOLUME_THRESHOLD,
                rolling_count_timeout: DEFAULT_ROLLING_COUNT_TIMEOUT,
                rolling_count_buckets: DEFAULT_ROLLING_COUNT_BUCKETS,
                fallback_strategy: FallbackStrategy::Deny,
            },
            "healthCheck" => Self {
                timeout: Duration::from_millis(1_000),
                error_threshold_percent: 75,
                reset_timeout: Duration::from_millis(10_000),
                volume_threshold: DEFAULT_VOLUME_THRESHOLD,
                rolling_count_timeout: DEFAULT_ROLLING_COUNT_TIMEOUT,
                rolling_count_buckets: DEFAULT_ROLLING_COUNT_BUCKETS,
                fallback_strategy: FallbackStrategy::GracefulDegradation,
            },
            _ => Self {
                timeout: Duration::from_millis(3_000),
                error_threshold_percent: 50,
                reset_timeout: Duration::from_millis(60_000),
                volume_threshold: DEFAULT_VOLUME_THRESHOLD,
                rolling_count_timeout: DEFAULT_ROLLING_COUNT_TIMEOUT,
                rolling_count_buckets: DEFAULT_ROLLING_COUNT_BUCKETS,
                fallback_strategy: FallbackStrategy::Deny,
            },
        }
    }
}

/// Optional overrides merged on top of [`OperationPolicy::defaults_for`],
/// typically sourced from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyOverrides {
    pub timeout_ms: Option<u64>,
    pub error_threshold_percent: Option<u8>,
    pub reset_timeout_ms: Option<u64>,
    pub volume_threshold: Option<u32>,
    pub fallback_strategy: Option<FallbackStrategy>,
}

impl OperationPolicy {
    pub fn with_overrides(mut self, overrides: PolicyOverrides) -> Self {
        if let Some(ms) = overrides.timeout_ms {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(pct) = overrides.error_threshold_percent {
            self.error_threshold_percent = pct;
        }
        if let Some(ms) = overrides.reset_timeout_ms {
            self.reset_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = overrides.volume_threshold {
            self.volume_threshold = v;
        }
        if let Some(s) = overrides.fallback_strategy {
            self.fallback_strategy = s;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_defaults_match_spec_table() {
        let p = OperationPolicy::defaults_for("getConsumerSecret");
        assert_eq!(p.timeout, Duration::from_millis(3_000));
        assert_eq!(p.error_threshold_percent, 50);
        assert_eq!(p.reset_timeout, Duration::from_millis(60_000));
        assert_eq!(p.fallback_strategy, FallbackStrategy::Cache);

        let p = OperationPolicy::defaults_for("createConsumerSecret");
        assert_eq!(p.error_threshold_percent, 30);
        assert_eq!(p.fallback_strategy, FallbackStrategy::Deny);

        let p = OperationPolicy::defaults_for("healthCheck");
        assert_eq!(p.timeout, Duration::from_millis(1_000));
        assert_eq!(p.fallback_strategy, FallbackStrategy::GracefulDegradation);
    }

    #[test]
    fn unknown_operation_falls_back_to_deny() {
        let p = OperationPolicy::defaults_for("deleteEverything");
        assert_eq!(p.fallback_strategy, FallbackStrategy::Deny);
    }

    #[test]
    fn overrides_apply_selectively() {
        let p = OperationPolicy::defaults_for("getConsumerSecret").with_overrides(PolicyOverrides {
            error_threshold_percent: Some(90),
            ..Default::default()
        });
        assert_eq!(p.error_threshold_percent, 90);
        assert_eq!(p.timeout, Duration::from_millis(3_000));
    }
}
