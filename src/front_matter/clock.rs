//! Monotonic date sequence for generated front matter.

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use parking_lot::Mutex;

/// Format of the `date` field.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Hands out strictly increasing, evenly spaced dates.
///
/// The first tick is the seed itself; every tick after that is one step later.
/// The sequence is only about ordering, not about wall-clock accuracy.
pub struct SequenceClock {
    next: Mutex<NaiveDateTime>,
    step: TimeDelta,
}

impl SequenceClock {
    pub fn new(start: NaiveDateTime, step: TimeDelta) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }

    /// Seed from the local time `offset_hours` ago, truncated to the second.
    pub fn from_now(offset_hours: i64, step_secs: i64) -> Self {
        let now = Local::now().naive_local();
        let now = now.with_nanosecond(0).unwrap_or(now);
        Self::new(
            now - TimeDelta::hours(offset_hours),
            TimeDelta::seconds(step_secs),
        )
    }

    /// Take the current date and advance by one step.
    pub fn tick(&self) -> NaiveDateTime {
        let mut next = self.next.lock();
        let current = *next;
        *next = current + self.step;
        current
    }

    /// The date the next tick will return.
    #[cfg(test)]
    pub fn peek(&self) -> NaiveDateTime {
        *self.next.lock()
    }
}
