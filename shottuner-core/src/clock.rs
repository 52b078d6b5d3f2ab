//! Time sources for the tuning loop
//!
//! The orchestrator and validator only ever ask "what time is it now, in
//! milliseconds"; everything else (debounce, reconnect throttling, the
//! graceful-shutdown window) is arithmetic on those readings. Abstracting
//! the source keeps the whole engine deterministic under test:
//! - `SystemClock` for the real process
//! - `FixedClock` for tests, advanced by hand

/// Timestamp in milliseconds since epoch (or an arbitrary test origin)
pub type Timestamp = u64;

/// Source of time for the tuning loop
pub trait Clock {
    /// Get current timestamp in milliseconds
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source backed by the OS
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Settable time source for testing
#[derive(Debug, Clone)]
pub struct FixedClock {
    timestamp: std::cell::Cell<Timestamp>,
}

impl FixedClock {
    /// Create a clock frozen at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp: std::cell::Cell::new(timestamp),
        }
    }

    /// Set the current time
    pub fn set(&self, timestamp: Timestamp) {
        self.timestamp.set(timestamp);
    }

    /// Advance the clock by `ms` milliseconds
    pub fn advance(&self, ms: u64) {
        self.timestamp.set(self.timestamp.get() + ms);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.timestamp.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now(), 1_000);

        clock.advance(500);
        assert_eq!(clock.now(), 1_500);

        clock.set(10_000);
        assert_eq!(clock.now(), 10_000);
    }

    #[test]
    fn system_clock_is_nonzero() {
        assert!(SystemClock.now() > 0);
    }
}
