//! Single-shot controller timer and the poll interval
//!
//! Neither type sleeps. They hold deadlines that the controller task selects
//! on, so a canceled timer can never fire and an expired one fires once.

use std::time::Duration;
use tokio::time::Instant;

/// A cancelable one-shot deadline
#[derive(Debug, Default)]
pub struct Timer {
    deadline: Option<Instant>,
    period: Option<Duration>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the timer, replacing any pending deadline
    pub fn start(&mut self, period: Duration) -> Instant {
        let deadline = Instant::now() + period;
        self.deadline = Some(deadline);
        self.period = Some(period);
        deadline
    }

    /// Cancel the pending deadline; returns whether one was pending
    pub fn cancel(&mut self) -> bool {
        self.period = None;
        self.deadline.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Period of the pending deadline
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Clear the timer if its deadline has passed
    ///
    /// Returns true exactly once per started deadline.
    pub fn take_expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.cancel();
                true
            }
            _ => false,
        }
    }
}

/// A repeating deadline
#[derive(Debug, Default)]
pub struct Poll {
    period: Option<Duration>,
    next: Option<Instant>,
}

impl Poll {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, period: Duration) {
        self.period = Some(period);
        self.next = Some(Instant::now() + period);
    }

    pub fn stop(&mut self) {
        self.period = None;
        self.next = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Returns true if a tick is due and schedules the next one
    ///
    /// Missed ticks are skipped rather than replayed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match (self.next, self.period) {
            (Some(next), Some(period)) if next <= now => {
                self.next = Some(now + period);
                true
            }
            _ => false,
        }
    }
}
