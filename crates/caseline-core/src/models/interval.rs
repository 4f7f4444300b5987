use serde::{Deserialize, Serialize};

/// Half-open time interval `[start, end)` in seconds since the unix epoch, UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: i64,
    pub end: i64,
}

impl TimeInterval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Interval spanning an inclusive `[min, max]` pair of event timestamps.
    /// The exclusive end is bumped by one tick so the last instant stays queryable.
    pub fn spanning(min: i64, max: i64) -> Self {
        Self {
            start: min,
            end: max + 1,
        }
    }

    pub fn len_secs(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, time: i64) -> bool {
        time >= self.start && time < self.end
    }
}
