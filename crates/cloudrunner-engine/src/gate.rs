//! Global cooldown gate.
//!
//! A single window shared by every foreground cast. Starting a foreground
//! cast closes the gate until `now + gcd`; background jobs neither check nor
//! touch it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tracks when the next foreground cast may start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastGate {
    gcd_until: Duration,
}

impl CastGate {
    /// An open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time at which the gate reopens.
    pub fn gcd_until(&self) -> Duration {
        self.gcd_until
    }

    /// Whether a foreground cast may start at `now`.
    pub fn is_open(&self, now: Duration) -> bool {
        now >= self.gcd_until
    }

    /// Time left until the gate reopens; zero when already open.
    pub fn remaining(&self, now: Duration) -> Duration {
        self.gcd_until.saturating_sub(now)
    }

    /// `Ok` when open, otherwise `Err` with the remaining wait.
    pub fn check(&self, now: Duration) -> Result<(), Duration> {
        if self.is_open(now) {
            Ok(())
        } else {
            Err(self.remaining(now))
        }
    }

    /// Close the gate for `gcd` starting at `now`.
    pub fn start(&mut self, now: Duration, gcd: Duration) {
        self.gcd_until = now.saturating_add(gcd);
    }
}
