//! Injected monotonic time, so checkpoint/reader-staleness triggers are deterministic in tests.
//!
//! The engine holds a `Clock` trait object rather than calling `Instant::now()` directly, so
//! tests can advance time explicitly instead of sleeping real wall-clock intervals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary, clock-specific epoch. Only deltas are meaningful.
    fn now_ms(&self) -> u64;
}

/// Default clock used outside of tests.
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Manually-advanced clock for deterministic tests of checkpoint/reader-staleness timing.
pub struct TestClock {
    millis: AtomicU64,
}

impl TestClock {
    pub fn new() -> Self {
        TestClock {
            millis: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.millis.store(ms, Ordering::SeqCst);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_manually() {
        let clock = TestClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(100);
        assert_eq!(clock.now_ms(), 100);
        clock.set(5);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn monotonic_clock_is_nondecreasing() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
