//! Injectable time source.
//!
//! # Responsibilities
//! - Provide "now" to the legacy decision budget and the loop guard
//! - Allow tests to advance time deterministically
//!
//! # Design Decisions
//! - Time is a `Duration` since an arbitrary origin; only differences matter
//! - The system clock is monotonic
//! - Components hold an `Arc<dyn Clock>` handed in at construction

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of the current time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time measured from the clock's origin.
    fn now(&self) -> Duration;
}

/// Monotonic clock anchored at the wall-clock time of its creation.
///
/// Readings are the Unix time at construction plus the `Instant` elapsed
/// since, so they stay usable as timestamps and never go backwards.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor: Duration,
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default(),
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.anchor + self.started.elapsed()
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `start`.
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos() as u64),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Duration) {
        self.nanos.store(to.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
