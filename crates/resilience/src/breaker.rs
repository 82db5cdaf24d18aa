//! Per-operation circuit breaker state machine (spec §4.5).
//!
//! Grounded on the `CircuitBreaker` state machine in
//! `examples/flyingrobots-ninelives/src/circuit_breaker.rs`: Closed/Open/
//! HalfOpen over a rolling window of time-bucketed outcome counts, with the
//! window driven by an injected [`crate::clock::Clock`] rather than the
//! wall clock directly.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::policy::OperationPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStateKind {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, Default)]
struct BucketCounts {
    success: u32,
    failure: u32,
    timeout: u32,
    reject: u32,
}

impl BucketCounts {
    fn total_calls(&self) -> u32 {
        self.success + self.failure + self.timeout
    }

    fn failing_calls(&self) -> u32 {
        self.failure + self.timeout
    }
}

struct Window {
    slice_ms: u64,
    span: u32,
    buckets: VecDeque<(u64, BucketCounts)>,
}

impl Window {
    fn new(policy: &OperationPolicy) -> Self {
        let span = policy.rolling_count_buckets.max(1);
        let slice_ms = (policy.rolling_count_timeout.as_millis() as u64 / span as u64).max(1);
        Self {
            slice_ms,
            span,
            buckets: VecDeque::new(),
        }
    }

    fn slot_for(&self, now_ms: u64) -> u64 {
        now_ms / self.slice_ms
    }

    fn record(&mut self, now_ms: u64, f: impl FnOnce(&mut BucketCounts)) {
        let slot = self.slot_for(now_ms);
        self.evict_stale(slot);
        match self.buckets.back_mut() {
            Some((s, counts)) if *s == slot => f(counts),
            _ => {
                let mut counts = BucketCounts::default();
                f(&mut counts);
                self.buckets.push_back((slot, counts));
            }
        }
    }

    fn evict_stale(&mut self, current_slot: u64) {
        let oldest_live = current_slot.saturating_sub(self.span as u64 - 1);
        while let Some((slot, _)) = self.buckets.front() {
            if *slot < oldest_live {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn totals(&self) -> BucketCounts {
        let mut acc = BucketCounts::default();
        for (_, c) in &self.buckets {
            acc.success += c.success;
            acc.failure += c.failure;
            acc.timeout += c.timeout;
            acc.reject += c.reject;
        }
        acc
    }

    fn reset(&mut self) {
        self.buckets.clear();
    }
}

struct Inner {
    kind: BreakerStateKind,
    opened_at_ms: Option<u64>,
    half_open_inflight: bool,
    window: Window,
}

/// A single named operation's breaker. Cheap to clone (an `Arc` handle).
pub struct CircuitBreaker {
    op_name: String,
    policy: OperationPolicy,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

#[derive(Debug, Error)]
pub enum BreakerError {
    #[error("circuit open for operation {0}")]
    Rejected(String),
    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// The action's clean not-found outcome. Not a breaker failure; the
    /// wrapper decides what this means for the caller.
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Inner(#[from] sidecar_core::Error),
}

impl CircuitBreaker {
    pub fn new(op_name: impl Into<String>, policy: OperationPolicy, clock: Arc<dyn Clock>) -> Self {
        let window = Window::new(&policy);
        Self {
            op_name: op_name.into(),
            policy,
            clock,
            inner: Mutex::new(Inner {
                kind: BreakerStateKind::Closed,
                opened_at_ms: None,
                half_open_inflight: false,
                window,
            }),
        }
    }

    pub fn policy(&self) -> &OperationPolicy {
        &self.policy
    }

    pub fn state(&self) -> BreakerStateKind {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).kind
    }

    pub fn is_open(&self) -> bool {
        self.state() == BreakerStateKind::Open
    }

    /// Admit or reject the call, run it under the policy's timeout, and
    /// record the outcome. `NotFound` counts as success for breaker
    /// bookkeeping (spec §4.5) but is still surfaced distinctly so the
    /// wrapper can treat it as a clean miss.
    pub async fn fire<T, Fut>(&self, action: impl FnOnce() -> Fut) -> Result<T, BreakerError>
    where
        Fut: Future<Output = sidecar_core::Result<T>>,
    {
        if !self.admit() {
            return Err(BreakerError::Rejected(self.op_name.clone()));
        }

        let result = tokio::time::timeout(self.policy.timeout, action()).await;

        match result {
            Err(_elapsed) => {
                self.record_outcome(Outcome::Timeout);
                Err(BreakerError::Timeout(self.policy.timeout))
            }
            Ok(Err(e)) if e.is_not_found() => {
                self.record_outcome(Outcome::Success);
                Err(BreakerError::NotFound)
            }
            Ok(Err(e)) => {
                self.record_outcome(Outcome::Failure);
                Err(BreakerError::Inner(e))
            }
            Ok(Ok(v)) => {
                self.record_outcome(Outcome::Success);
                Ok(v)
            }
        }
    }

    fn admit(&self) -> bool {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.kind {
            BreakerStateKind::Closed => true,
            BreakerStateKind::HalfOpen => {
                if inner.half_open_inflight {
                    inner.window.record(now, |c| c.reject += 1);
                    false
                } else {
                    inner.half_open_inflight = true;
                    true
                }
            }
            BreakerStateKind::Open => {
                let opened_at = inner.opened_at_ms.unwrap_or(now);
                if now.saturating_sub(opened_at) >= self.policy.reset_timeout.as_millis() as u64 {
                    info!(op = %self.op_name, "breaker reset timeout elapsed, admitting probe");
                    inner.kind = BreakerStateKind::HalfOpen;
                    inner.half_open_inflight = true;
                    true
                } else {
                    inner.window.record(now, |c| c.reject += 1);
                    false
                }
            }
        }
    }

    fn record_outcome(&self, outcome: Outcome) {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        match inner.kind {
            BreakerStateKind::HalfOpen => {
                inner.half_open_inflight = false;
                match outcome {
                    Outcome::Success => {
                        debug!(op = %self.op_name, "half-open probe succeeded, closing breaker");
                        inner.kind = BreakerStateKind::Closed;
                        inner.opened_at_ms = None;
                        inner.window.reset();
                    }
                    Outcome::Failure | Outcome::Timeout => {
                        warn!(op = %self.op_name, "half-open probe failed, reopening breaker");
                        inner.kind = BreakerStateKind::Open;
                        inner.opened_at_ms = Some(now);
                        inner.window.reset();
                    }
                }
            }
            BreakerStateKind::Closed => {
                inner.window.record(now, |c| match outcome {
                    Outcome::Success => c.success += 1,
                    Outcome::Failure => c.failure += 1,
                    Outcome::Timeout => c.timeout += 1,
                });

                let totals = inner.window.totals();
                if totals.total_calls() >= self.policy.volume_threshold {
                    let failure_pct =
                        (totals.failing_calls() as f64 / totals.total_calls() as f64) * 100.0;
                    if failure_pct >= self.policy.error_threshold_percent as f64 {
                        warn!(
                            op = %self.op_name,
                            failure_pct,
                            threshold = self.policy.error_threshold_percent,
                            "error threshold exceeded, opening breaker"
                        );
                        inner.kind = BreakerStateKind::Open;
                        inner.opened_at_ms = Some(now);
                    }
                }
            }
            BreakerStateKind::Open => {
                // A call admitted just before the state flipped out from
                // under it; count it but do not re-derive a transition.
                inner.window.record(now, |c| match outcome {
                    Outcome::Success => c.success += 1,
                    Outcome::Failure => c.failure += 1,
                    Outcome::Timeout => c.timeout += 1,
                });
            }
        }
    }
}

enum Outcome {
    Success,
    Failure,
    Timeout,
}
