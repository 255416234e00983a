//! Time sources and timestamp stamping.
//!
//! Alert timestamps must be monotonically non-decreasing along the lifecycle.
//! Wall clocks can step backwards, so every transition is stamped with
//! [`stamp_after`] instead of the raw clock reading.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests and replays.
///
/// Clones share the same underlying instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward (or backward, for negative durations).
    pub fn advance(&self, by: Duration) {
        let mut guard = match self.current.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard += by;
    }

    /// Sets the absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        let mut guard = match self.current.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.current.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Returns `now`, or `floor` if the clock reads earlier than it.
#[must_use]
pub fn stamp_after(now: DateTime<Utc>, floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match floor {
        Some(f) if f > now => f,
        _ => now,
    }
}

/// Whole minutes in `span`, rounded down, never negative.
#[must_use]
pub fn whole_minutes(span: Duration) -> i64 {
    span.num_minutes().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_is_shared() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let other = clock.clone();

        clock.advance(Duration::seconds(90));
        assert_eq!(other.now(), start + Duration::seconds(90));

        other.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn stamp_after_never_goes_backwards() {
        let t0 = Utc::now();
        let earlier = t0 - Duration::seconds(5);

        assert_eq!(stamp_after(earlier, Some(t0)), t0);
        assert_eq!(stamp_after(t0, Some(earlier)), t0);
        assert_eq!(stamp_after(t0, None), t0);
    }

    #[test]
    fn whole_minutes_clamps_negative_spans() {
        assert_eq!(whole_minutes(Duration::seconds(179)), 2);
        assert_eq!(whole_minutes(Duration::seconds(-30)), 0);
    }
}
