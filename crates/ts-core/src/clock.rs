//! Injected wall clock for closing still-open intervals.

use chrono::{Local, NaiveDateTime, Timelike};

/// Source of the "now" used to close intervals that are still open.
///
/// Log timestamps are local wall-clock time without a zone, so the clock
/// answers in the same terms, at second precision.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// The system's local clock, truncated to whole seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
