//! Virtual simulation clock.
//!
//! The [`Clock`] holds the current simulation time as a [`Duration`] since
//! epoch zero. It never reads the wall clock: time moves only when the driver
//! calls [`Clock::advance`], which makes every run reproducible from the
//! sequence of advance steps alone.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic virtual clock.
///
/// `now` starts at zero and only ever increases. `Duration` is unsigned, so a
/// negative step is unrepresentable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    now: Duration,
}

impl Clock {
    /// Create a clock at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock already positioned at `now`.
    ///
    /// Used when restoring a simulation from a snapshot.
    pub fn starting_at(now: Duration) -> Self {
        Self { now }
    }

    /// The current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock forward by `dt` and return the new time.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn advance(&mut self, dt: Duration) -> Duration {
        self.now = self.now.saturating_add(dt);
        self.now
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
