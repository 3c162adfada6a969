//! Cooldown state machine shared by the rate-limited responders.
//!
//! States are `Idle` (no deadline, or deadline passed) and `Silenced`. A trigger while
//! idle moves to silenced until `now + period`; a trigger while silenced is refused and
//! leaves the deadline where it was.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct SilenceWindow {
    period: Duration,
    until: Mutex<Option<Instant>>,
}

impl SilenceWindow {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            until: Mutex::new(None),
        }
    }

    /// Returns `true` and opens a new window when idle; `false` while silenced.
    pub fn check_and_maybe_trigger(&self, now: Instant) -> bool {
        let mut until = self.until.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(deadline) = *until {
            if now < deadline {
                return false;
            }
        }
        *until = Some(now + self.period);
        true
    }

    pub fn silence_until(&self) -> Option<Instant> {
        *self.until.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_silenced(&self, now: Instant) -> bool {
        self.silence_until().map(|d| now < d).unwrap_or(false)
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
