//! Cloudrunner Sched -- virtual clock and delayed task queue.
//!
//! This crate is the leaf of the Cloudrunner simulation: a [`Scheduler`]
//! owning virtual time and an ordered queue of delayed tasks. Tasks carry an
//! arbitrary payload by value, a cancellation key, and a deadline. Time only
//! moves when the driver calls [`Scheduler::advance`], so a fixed sequence of
//! `schedule` / `cancel` / `advance` calls always fires the same payloads in
//! the same order.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use cloudrunner_sched::prelude::*;
//!
//! let mut scheduler: Scheduler<u32> = Scheduler::new();
//! scheduler.schedule(Duration::from_millis(1800), "job:1", 1);
//! scheduler.schedule(Duration::from_millis(600), "cast:scan:0", 2);
//!
//! // Kill the background job before it completes.
//! assert_eq!(scheduler.cancel("job:1"), 1);
//!
//! let mut fired = Vec::new();
//! scheduler.advance(Duration::from_secs(2), |_now, task| {
//!     fired.push(task.payload);
//!     Ok::<(), std::convert::Infallible>(())
//! });
//! assert_eq!(fired, vec![2]);
//! ```
//!
//! [`Scheduler`]: scheduler::Scheduler
//! [`Scheduler::advance`]: scheduler::Scheduler::advance

#![deny(unsafe_code)]

pub mod clock;
pub mod queue;
pub mod scheduler;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::clock::Clock;
    pub use crate::queue::{Task, TaskId, TaskKey, TaskQueue};
    pub use crate::scheduler::{AdvanceReport, Scheduler, DEFAULT_FIRE_CAP};
}
