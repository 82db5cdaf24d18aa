//! Resilient Gateway Wrapper (C6) — the seam between the gateway admin
//! client, the circuit breakers, and the stale cache. Spec §4.6.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use tracing::{error, warn};

use sidecar_core::ConsumerSecret;
use sidecar_gatewayclient::GatewayAdminClient;

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::cache::StaleCache;
use crate::clock::Clock;
use crate::policy::{FallbackStrategy, OperationPolicy};

/// Capability C6 depends on for the consumer-secret lookup, narrow enough
/// that tests can stub it without a real HTTP client (spec §9).
#[async_trait::async_trait]
pub trait ConsumerSecretFetcher: Send + Sync {
    async fn get_consumer_secret(&self, consumer_id: &str) -> sidecar_core::Result<ConsumerSecret>;
}

#[async_trait::async_trait]
impl ConsumerSecretFetcher for GatewayAdminClient {
    async fn get_consumer_secret(&self, consumer_id: &str) -> sidecar_core::Result<ConsumerSecret> {
        GatewayAdminClient::get_consumer_secret(self, consumer_id)
            .await
            .map_err(sidecar_core::Error::from)
    }
}

/// The three outcomes `wrapConsumerOperation` can hand back to the
/// token-issuance handler (spec §4.8 step 4): a usable secret, a clean
/// "nothing there" (consumer/credentials absent, pollution, or a
/// breaker-open call with no validated cache entry to fall back to — all
/// collapse to the same 401 at the boundary), or a transport failure on a
/// call the breaker hasn't yet opened for (503, `Retry-After`).
#[derive(Debug)]
pub enum ConsumerSecretOutcome {
    Found(ConsumerSecret),
    NotFound,
    Unavailable,
}

pub struct ResilientGatewayWrapper {
    fetcher: Arc<dyn ConsumerSecretFetcher>,
    cache: Arc<dyn StaleCache>,
    clock: Arc<dyn Clock>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    overrides: HashMap<String, OperationPolicy>,
    breaker_enabled: bool,
}

impl ResilientGatewayWrapper {
    pub fn new(
        fetcher: Arc<dyn ConsumerSecretFetcher>,
        cache: Arc<dyn StaleCache>,
        clock: Arc<dyn Clock>,
        breaker_enabled: bool,
    ) -> Self {
        Self {
            fetcher,
            cache,
            clock,
            breakers: RwLock::new(HashMap::new()),
            overrides: HashMap::new(),
            breaker_enabled,
        }
    }

    /// Install an explicit policy for an operation, overriding its
    /// built-in default (spec §3 `OperationPolicy`, user overrides merged
    /// on construction).
    pub fn with_policy(mut self, op_name: impl Into<String>, policy: OperationPolicy) -> Self {
        self.overrides.insert(op_name.into(), policy);
        self
    }

    pub fn policy_for(&self, op_name: &str) -> OperationPolicy {
        self.overrides
            .get(op_name)
            .copied()
            .unwrap_or_else(|| OperationPolicy::defaults_for(op_name))
    }

    /// Current breaker state for `op_name`, for the health aggregator and
    /// `/metrics` snapshot. Creates the breaker (in `Closed` state) if it
    /// has not yet seen a call.
    pub fn breaker_state(&self, op_name: &str) -> crate::breaker::BreakerStateKind {
        self.breaker_for(op_name).state()
    }

    fn breaker_for(&self, op_name: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(|e| e.into_inner());
            if let Some(b) = breakers.get(op_name) {
                return b.clone();
            }
        }
        let mut breakers = self.breakers.write().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(op_name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    op_name.to_string(),
                    self.policy_for(op_name),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Number of entries held in the local stale cache, for `/metrics`.
    pub fn cache_len(&self) -> Option<usize> {
        self.cache.local_len()
    }

    /// Specialized consumer-secret lookup with pollution checks and cache
    /// fallback (spec §4.6 `wrapConsumerOperation`).
    pub async fn wrap_consumer_operation(
        &self,
        op_name: &str,
        consumer_id: &str,
    ) -> ConsumerSecretOutcome {
        if !self.breaker_enabled {
            return match self.fetcher.get_consumer_secret(consumer_id).await {
                Ok(secret) if secret.matches_consumer(consumer_id) => {
                    self.cache.put(consumer_id, secret.clone()).await;
                    ConsumerSecretOutcome::Found(secret)
                }
                Ok(_mismatch) => {
                    error!(
                        op = op_name,
                        consumer_id, "cache pollution: fetched secret's consumer id disagreed"
                    );
                    ConsumerSecretOutcome::NotFound
                }
                Err(e) if e.is_not_found() => ConsumerSecretOutcome::NotFound,
                Err(_transport) => ConsumerSecretOutcome::Unavailable,
            };
        }

        let breaker = self.breaker_for(op_name);
        let fetcher = self.fetcher.clone();
        let result = breaker
            .fire(|| async move { fetcher.get_consumer_secret(consumer_id).await })
            .await;

        match result {
            Ok(secret) => {
                if !secret.matches_consumer(consumer_id) {
                    error!(
                        op = op_name,
                        consumer_id, "cache pollution: fetched secret's consumer id disagreed"
                    );
                    return ConsumerSecretOutcome::NotFound;
                }
                self.cache.put(consumer_id, secret.clone()).await;
                ConsumerSecretOutcome::Found(secret)
            }
            Err(BreakerError::NotFound) => {
                self.cache.evict(consumer_id).await;
                ConsumerSecretOutcome::NotFound
            }
            Err(_failure) => {
                if !breaker.is_open() {
                    // This call failed but did not (yet) trip the breaker —
                    // a bare transport failure, not a circuit-open fallback.
                    return ConsumerSecretOutcome::Unavailable;
                }
                match self.policy_for(op_name).fallback_strategy {
                    FallbackStrategy::Deny | FallbackStrategy::GracefulDegradation => {
                        ConsumerSecretOutcome::Unavailable
                    }
                    FallbackStrategy::Cache => match self.cache.get(consumer_id).await {
                        Some(cached) if cached.matches_consumer(consumer_id) => {
                            ConsumerSecretOutcome::Found(cached)
                        }
                        Some(_mismatch) => {
                            error!(
                                op = op_name,
                                consumer_id, "cache pollution detected on fallback read"
                            );
                            self.cache.evict(consumer_id).await;
                            ConsumerSecretOutcome::NotFound
                        }
                        None => ConsumerSecretOutcome::NotFound,
                    },
                }
            }
        }
    }

    /// General-purpose wrapper for non-consumer operations, e.g. the
    /// gateway health check (spec §4.6 `wrapOperation`). `on_degraded`
    /// supplies the typed degraded value for this operation's
    /// `graceful_degradation` fallback.
    pub async fn wrap_operation<T, F, Fut>(
        &self,
        op_name: &str,
        action: F,
        on_degraded: impl FnOnce() -> T,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = sidecar_core::Result<T>>,
    {
        if !self.breaker_enabled {
            return action().await.ok();
        }

        let breaker = self.breaker_for(op_name);
        match breaker.fire(action).await {
            Ok(v) => Some(v),
            Err(BreakerError::NotFound) => None,
            Err(_failure) => {
                if !breaker.is_open() {
                    return None;
                }
                match self.policy_for(op_name).fallback_strategy {
                    FallbackStrategy::GracefulDegradation => Some(on_degraded()),
                    FallbackStrategy::Deny => None,
                    FallbackStrategy::Cache => {
                        warn!(op = op_name, "cache fallback requested for a non-consumer operation, denying");
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalStaleCache;
    use crate::clock::test_support::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn secret(id: &str) -> ConsumerSecret {
        ConsumerSecret {
            credential_id: "cred-1".into(),
            key: "k1".into(),
            secret: b"s1".to_vec(),
            consumer_id: id.into(),
        }
    }

    struct StubFetcher {
        calls: AtomicUsize,
        behavior: fn(usize) -> sidecar_core::Result<ConsumerSecret>,
    }

    #[async_trait::async_trait]
    impl ConsumerSecretFetcher for StubFetcher {
        async fn get_consumer_secret(&self, _consumer_id: &str) -> sidecar_core::Result<ConsumerSecret> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.behavior)(n)
        }
    }

    fn wrapper(fetcher: StubFetcher, clock: Arc<ManualClock>) -> ResilientGatewayWrapper {
        let cache = Arc::new(LocalStaleCache::new(60_000, clock.clone()));
        ResilientGatewayWrapper::new(Arc::new(fetcher), cache, clock, true)
    }

    #[tokio::test]
    async fn happy_path_caches_validated_secret() {
        let clock = ManualClock::new();
        let fetcher = StubFetcher {
            calls: AtomicUsize::new(0),
            behavior: |_| Ok(secret("c1")),
        };
        let w = wrapper(fetcher, clock);
        let got = w.wrap_consumer_operation("getConsumerSecret", "c1").await;
        assert!(matches!(got, ConsumerSecretOutcome::Found(s) if s.consumer_id == "c1"));
    }

    #[tokio::test]
    async fn pollution_is_not_cached_and_returns_not_found() {
        let clock = ManualClock::new();
        let fetcher = StubFetcher {
            calls: AtomicUsize::new(0),
            behavior: |_| Ok(secret("c2")),
        };
        let w = wrapper(fetcher, clock);
        let got = w.wrap_consumer_operation("getConsumerSecret", "c1").await;
        assert!(matches!(got, ConsumerSecretOutcome::NotFound));
        assert_eq!(w.cache_len(), Some(0));
    }

    #[tokio::test]
    async fn clean_not_found_evicts_and_returns_not_found() {
        let clock = ManualClock::new();
        let fetcher = StubFetcher {
            calls: AtomicUsize::new(0),
            behavior: |_| Err(sidecar_core::Error::NotFound),
        };
        let w = wrapper(fetcher, clock);
        let got = w.wrap_consumer_operation("getConsumerSecret", "c1").await;
        assert!(matches!(got, ConsumerSecretOutcome::NotFound));
    }

    #[tokio::test]
    async fn single_transport_failure_before_breaker_opens_is_unavailable() {
        let clock = ManualClock::new();
        let fetcher = StubFetcher {
            calls: AtomicUsize::new(0),
            behavior: |_| Err(sidecar_core::Error::Transport("down".into())),
        };
        let w = wrapper(fetcher, clock);
        let got = w.wrap_consumer_operation("getConsumerSecret", "c1").await;
        assert!(matches!(got, ConsumerSecretOutcome::Unavailable));
    }

    #[tokio::test]
    async fn breaker_open_serves_validated_cache_entry() {
        let clock = ManualClock::new();
        let fetcher = StubFetcher {
            calls: AtomicUsize::new(0),
            behavior: |n| {
                if n == 0 {
                    Ok(secret("c1"))
                } else {
                    Err(sidecar_core::Error::Transport("down".into()))
                }
            },
        };
        let w = wrapper(fetcher, clock).with_policy(
            "getConsumerSecret",
            OperationPolicy {
                volume_threshold: 1,
                error_threshold_percent: 1,
                ..OperationPolicy::defaults_for("getConsumerSecret")
            },
        );

        // Seed the cache with one real, validated fetch.
        let first = w.wrap_consumer_operation("getConsumerSecret", "c1").await;
        assert!(matches!(first, ConsumerSecretOutcome::Found(_)));

        // Second call fails and should open the breaker (volume_threshold=1).
        let second = w.wrap_consumer_operation("getConsumerSecret", "c1").await;
        assert!(matches!(second, ConsumerSecretOutcome::Unavailable));

        // Third call: breaker is open, fallback is cache, c1 has a validated entry.
        let third = w.wrap_consumer_operation("getConsumerSecret", "c1").await;
        assert!(matches!(third, ConsumerSecretOutcome::Found(s) if s.consumer_id == "c1"));

        // A different consumer with no cache entry gets a 401-equivalent,
        // not a 503 — the admin API is not called again (spec §8 scenario 5).
        let other = w.wrap_consumer_operation("getConsumerSecret", "c2").await;
        assert!(matches!(other, ConsumerSecretOutcome::NotFound));
    }

    #[tokio::test]
    async fn deny_fallback_yields_unavailable_not_not_found_when_open() {
        let clock = ManualClock::new();
        let fetcher = StubFetcher {
            calls: AtomicUsize::new(0),
            behavior: |_| Err(sidecar_core::Error::Transport("down".into())),
        };
        let w = wrapper(fetcher, clock).with_policy(
            "getConsumerSecret",
            OperationPolicy {
                volume_threshold: 1,
                error_threshold_percent: 1,
                fallback_strategy: FallbackStrategy::Deny,
                ..OperationPolicy::defaults_for("getConsumerSecret")
            },
        );

        let first = w.wrap_consumer_operation("getConsumerSecret", "c1").await;
        assert!(matches!(first, ConsumerSecretOutcome::Unavailable));

        // Breaker now open, fallback is Deny: still Unavailable (503), not
        // NotFound (401) — circuit-open denial is a transport-layer
        // failure, not a credential failure.
        let second = w.wrap_consumer_operation("getConsumerSecret", "c1").await;
        assert!(matches!(second, ConsumerSecretOutcome::Unavailable));
    }

    #[tokio::test]
    async fn graceful_degradation_returns_typed_default_when_open() {
        let clock = ManualClock::new();
        let fetcher = StubFetcher {
            calls: AtomicUsize::new(0),
            behavior: |_| Err(sidecar_core::Error::Transport("down".into())),
        };
        let w = wrapper(fetcher, clock).with_policy(
            "healthCheck",
            OperationPolicy {
                volume_threshold: 1,
                error_threshold_percent: 1,
                fallback_strategy: FallbackStrategy::GracefulDegradation,
                ..OperationPolicy::defaults_for("healthCheck")
            },
        );

        let first = w
            .wrap_operation(
                "healthCheck",
                || async { Err::<u8, _>(sidecar_core::Error::Transport("down".into())) },
                || 0u8,
            )
            .await;
        assert!(first.is_none());

        let second = w
            .wrap_operation(
                "healthCheck",
                || async { Err::<u8, _>(sidecar_core::Error::Transport("down".into())) },
                || 7u8,
            )
            .await;
        assert_eq!(second, Some(7));
    }
}
