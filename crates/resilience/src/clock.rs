//! Clock abstraction so breaker and cache timing can be faked in tests.
//!
//! Grounded on the `Clock` trait in the `ninelives` resilience-primitives
//! crate (an example repo in the retrieval pack, not the teacher): a
//! monotonic millisecond clock behind a trait object, so deterministic
//! tests can advance time without sleeping.

use std::sync::Arc;
use std::time::Instant;

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

pub fn default_clock() -> Arc<dyn Clock> {
    Arc::new(MonotonicClock::default())
}

#[cfg(test)]
/// A clock a test can advance by hand, used to exercise breaker window
/// expiry and `resetTimeout`/`staleToleranceMinutes` boundaries without
/// real sleeps.
pub(crate) mod test_support {
    use super::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    pub struct ManualClock {
        now: AtomicU64,
    }

    impl ManualClock {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                now: AtomicU64::new(0),
            })
        }

        pub fn advance(&self, millis: u64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.now.load(Ordering::SeqCst)
        }
    }
}
