//! Injectable time source.

use std::fmt::Debug;

use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};

/// Wall-clock source for scheduling decisions.
pub trait Clock: Send + Sync + Debug {
    /// Current instant.
    fn now(&self) -> OffsetDateTime;
}

/// System time, UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    /// Clock frozen at `now`.
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock() = now;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn manual_clock_moves_on_demand() {
        let clock = ManualClock::new(datetime!(2026-02-23 19:00 UTC));
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), datetime!(2026-02-23 20:30 UTC));

        clock.set(datetime!(2026-02-24 08:00 UTC));
        assert_eq!(clock.now(), datetime!(2026-02-24 08:00 UTC));
    }
}
