//! Countdown timers polled by the tick loop
//!
//! A `Countdown` never fires on its own. The owner calls [`Countdown::poll`] once per
//! tick and receives the timer's expiry event at most once per arming, so expiry
//! handling runs in tick order with every other state mutation.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Not armed; remaining time is frozen
    Idle { remaining: Duration },
    /// Armed; expires at `deadline`
    Running { deadline: Instant },
    /// Deadline passed and the expiry event was handed out
    Expired,
}

/// Deadline tracker yielding `T` once when it expires
#[derive(Debug, Clone)]
pub struct Countdown<T = ()> {
    total: Duration,
    phase: Phase,
    on_expire: T,
}

impl<T: Clone> Countdown<T> {
    pub fn new(total: Duration, on_expire: T) -> Self {
        Self {
            total,
            phase: Phase::Idle { remaining: total },
            on_expire,
        }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Arm the timer for the full duration starting at `now`.
    /// Restarting a running timer discards the previous deadline.
    pub fn start(&mut self, now: Instant) {
        self.phase = Phase::Running {
            deadline: now + self.total,
        };
    }

    /// Disarm without firing, freezing the remaining time
    pub fn stop(&mut self, now: Instant) {
        if let Phase::Running { .. } = self.phase {
            self.phase = Phase::Idle {
                remaining: self.remaining(now),
            };
        }
    }

    /// Disarm and restore the full duration without starting
    pub fn reset(&mut self) {
        self.phase = Phase::Idle {
            remaining: self.total,
        };
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    /// Time left, clamped to `[0, total]`
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.phase {
            Phase::Idle { remaining } => remaining.min(self.total),
            Phase::Running { deadline } => deadline.saturating_duration_since(now).min(self.total),
            Phase::Expired => Duration::ZERO,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.total - self.remaining(now)
    }

    /// Returns the expiry event if the deadline has passed since the last poll
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.phase {
            Phase::Running { deadline } if now >= deadline => {
                self.phase = Phase::Expired;
                Some(self.on_expire.clone())
            }
            _ => None,
        }
    }
}

/// Whole seconds left, rounded up, for status messages
pub fn seconds_left(remaining: Duration) -> u64 {
    let millis = remaining.as_millis() as u64;
    millis.div_ceil(1000)
}
