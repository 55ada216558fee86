//! Access to the current time is always mediated through a [`Clock`], so
//! tests can drive time deterministically instead of sleeping in real time.

use jiff::Timestamp;
use std::fmt;
use std::sync::{Arc, Mutex};

/// An interface to the current wall-clock time.
///
/// Shared as a `Send + Sync` `Arc<dyn Clock>` across the `Schedule`, every
/// `JobScheduler`, and the `SchedulePing` of one schedule instance.
pub trait Clock: fmt::Debug + Send + Sync {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock driven by explicit `advance()` calls, for tests.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<Timestamp>>,
}

impl MockClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the mock clock forward by `millis` milliseconds.
    pub fn advance(&self, millis: i64) {
        let mut now = self.now.lock().expect("mock clock mutex poisoned");
        *now = now.checked_add(jiff::Span::new().milliseconds(millis)).expect("mock clock overflow");
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Timestamp::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().expect("mock clock mutex poisoned")
    }
}

/// Milliseconds elapsed from `earlier` to `later`. Negative if `later` is
/// before `earlier`.
pub fn millis_between(earlier: Timestamp, later: Timestamp) -> i64 {
    later.as_millisecond() - earlier.as_millisecond()
}
