//! Clock abstraction so interval-measuring code (the silence timeout) can run
//! against virtual time in tests.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Real-time clock used in production.
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Virtual clock advanced manually by tests.
pub struct TestClock {
    current: Mutex<Instant>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.current.lock() += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}

/// Clock handle shared across threads.
pub type SharedClock = Arc<dyn Clock>;

pub fn real_clock() -> SharedClock {
    Arc::new(RealClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_only_when_told() {
        let clock = TestClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now() - start, Duration::from_secs(3));
    }
}
