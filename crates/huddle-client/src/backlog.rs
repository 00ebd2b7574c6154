//! Countdown of backlog messages still expected after a log subscription
//! opens. When it reaches zero the loading indicator is dismissed after a
//! short delay proportional to the backlog size.

use std::time::Duration;

use huddle_shared::constants::{LOADING_STOP_CAP_SECS, LOADING_STOP_DIVISOR};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogCounter {
    total: usize,
    remaining: usize,
}

impl BacklogCounter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            remaining: total,
        }
    }

    /// Lower the expectation to what the backend actually replays. A log
    /// shorter than the tail limit would otherwise never drain the counter.
    pub fn clamp_to(&mut self, available: usize) {
        if available < self.total {
            self.total = available;
            self.remaining = self.remaining.min(available);
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_loading(&self) -> bool {
        self.remaining > 0
    }

    /// Count one backlog message as handled. Returns the dismissal delay on
    /// the call that drains the counter, `None` otherwise.
    pub fn record(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        (self.remaining == 0).then(|| stop_delay(self.total))
    }

    /// Stop expecting one backlog message without counting it as handled,
    /// for replayed entries that are dropped before a lookup. Returns the
    /// dismissal delay if that leaves nothing to wait for.
    pub fn shrink(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.total -= 1;
        self.remaining -= 1;
        (self.remaining == 0).then(|| stop_delay(self.total))
    }
}

/// `min(total / 32, 0.75)` seconds.
pub fn stop_delay(total: usize) -> Duration {
    let secs = (total as f64 / LOADING_STOP_DIVISOR).min(LOADING_STOP_CAP_SECS);
    Duration::from_secs_f64(secs)
}
