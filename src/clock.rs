//! Time sources for the ranging cycle.
//!
//! Every timestamp in a cycle (the pulse emission and each edge) must come
//! from the same [`Clock`], so that subtracting them yields a time of flight.

use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    ops::Add,
    sync::Mutex,
    time::{Duration, Instant},
};

/// A point in time, measured as an offset from the origin of the [`Clock`]
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The clock origin.
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    /// Builds a timestamp from a non-negative number of seconds.
    ///
    /// Panics if `secs` is negative or not finite, like
    /// [`Duration::from_secs_f64`].
    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp(Duration::from_secs_f64(secs))
    }

    /// Offset from the clock origin.
    pub fn since_origin(&self) -> Duration {
        self.0
    }

    /// Seconds since the clock origin.
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Time elapsed from `earlier` to `self`, or `None` if `earlier` is
    /// actually later.
    pub fn checked_duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Something that can tell the time. Shared between the controller and the
/// hardware adapters, which may call it from their own threads.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Timestamp;

    /// Whether successive calls to [`Clock::now`] can never go backwards.
    /// The controller refuses to run on a clock that says no.
    fn is_monotonic(&self) -> bool;
}

/// A [`Clock`] backed by [`Instant`], with its origin at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Starts a new clock at [`Timestamp::ZERO`].
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Converts an [`Instant`] into this clock's timeline. Instants before
    /// the origin saturate to zero.
    pub fn timestamp_of(&self, instant: Instant) -> Timestamp {
        Timestamp(instant.saturating_duration_since(self.origin))
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        self.timestamp_of(Instant::now())
    }

    fn is_monotonic(&self) -> bool {
        true
    }
}

/// A hand-driven [`Clock`]. Time only moves when told to, which makes
/// cycle timestamps predictable in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
    monotonic: bool,
}

impl ManualClock {
    /// A manual clock that only ever moves forward.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Timestamp::ZERO),
            monotonic: true,
        }
    }

    /// A manual clock that advertises itself as non-monotonic, so that it
    /// can be set backwards.
    pub fn wall() -> Self {
        Self {
            now: Mutex::new(Timestamp::ZERO),
            monotonic: false,
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }

    /// Jumps to `to`. On a monotonic clock, jumps into the past are ignored.
    pub fn set(&self, to: Timestamp) {
        let mut now = self.now.lock().unwrap();
        if !self.monotonic || to >= *now {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }

    fn is_monotonic(&self) -> bool {
        self.monotonic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let mut last = clock.now();
        for _ in 0..1000 {
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn negative_interval_is_none() {
        let early = Timestamp::from_secs_f64(0.5);
        let late = Timestamp::from_secs_f64(0.75);
        assert_eq!(
            late.checked_duration_since(early),
            Some(Duration::from_millis(250))
        );
        assert_eq!(early.checked_duration_since(late), None);
    }

    #[test]
    fn manual_clock_ignores_rewind_when_monotonic() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(2));
        clock.set(Timestamp::from_secs_f64(1.0));
        assert_eq!(clock.now(), Timestamp::from_secs_f64(2.0));

        let wall = ManualClock::wall();
        wall.advance(Duration::from_secs(2));
        wall.set(Timestamp::from_secs_f64(1.0));
        assert_eq!(wall.now(), Timestamp::from_secs_f64(1.0));
        assert!(!wall.is_monotonic());
    }
}
