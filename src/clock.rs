//! Wall-clock sources.
//!
//! The engine itself takes `now` as an explicit argument; a [`Clock`] is
//! only consulted at the edge (the HTTP layer) so that every deadline check
//! inside one request sees the same instant.

use std::sync::atomic::{AtomicI64, Ordering};

/// Supplies the current time as unix seconds.
pub trait Clock: Send + Sync {
    /// Returns the current unix timestamp in seconds.
    fn now(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A manually driven clock for tests and simulations.
///
/// # Examples
///
/// ```
/// use concent_arbiter::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new(950);
/// clock.advance(20);
/// assert_eq!(clock.now(), 970);
/// clock.set(1065);
/// assert_eq!(clock.now(), 1065);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
