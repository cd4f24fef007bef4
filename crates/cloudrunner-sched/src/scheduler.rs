//! Virtual-time scheduler: a [`Clock`] plus a [`TaskQueue`].
//!
//! Each [`Scheduler::advance`] call:
//!
//! 1. Moves the clock forward by `dt`.
//! 2. Pops due tasks in `(fire_at, insertion)` order and hands each one to the
//!    caller's `fire` callback.
//! 3. Stops after `fire_cap` firings. Tasks still due stay queued and fire on
//!    a later `advance`.
//!
//! A `fire` callback that returns `Err` is logged and counted in the
//! [`AdvanceReport`]; it does not stop the remaining due tasks. Nothing is
//! retried.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use cloudrunner_sched::prelude::*;
//!
//! let mut scheduler: Scheduler<&str> = Scheduler::new();
//! scheduler.schedule(Duration::from_millis(600), "cast:inject:0", "inject");
//! scheduler.schedule(Duration::from_millis(400), "cast:scan:0", "scan");
//!
//! let mut fired = Vec::new();
//! let report = scheduler.advance(Duration::from_millis(600), |_now, task| {
//!     fired.push(task.payload);
//!     Ok::<(), std::convert::Infallible>(())
//! });
//!
//! assert_eq!(fired, vec!["scan", "inject"]);
//! assert_eq!(report.fired, 2);
//! assert!(scheduler.is_empty());
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::queue::{Task, TaskId, TaskKey, TaskQueue};

/// Maximum number of tasks fired by a single [`Scheduler::advance`] call
/// unless configured otherwise.
pub const DEFAULT_FIRE_CAP: usize = 100;

// ---------------------------------------------------------------------------
// AdvanceReport
// ---------------------------------------------------------------------------

/// Summary of one [`Scheduler::advance`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    /// Tasks handed to the fire callback (successful or not).
    pub fired: usize,
    /// Firings whose callback returned an error.
    pub failed: usize,
    /// Tasks that were due but left queued because the fire cap was reached.
    pub deferred: usize,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns virtual time and the pending task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scheduler<P> {
    clock: Clock,
    queue: TaskQueue<P>,
    next_id: u64,
    fire_cap: usize,
}

impl<P> Default for Scheduler<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Scheduler<P> {
    /// Create a scheduler at time zero with [`DEFAULT_FIRE_CAP`].
    pub fn new() -> Self {
        Self::with_fire_cap(DEFAULT_FIRE_CAP)
    }

    /// Create a scheduler at time zero with a custom per-advance fire cap.
    ///
    /// # Panics
    ///
    /// Panics if `fire_cap` is zero: no task could ever fire.
    pub fn with_fire_cap(fire_cap: usize) -> Self {
        assert!(fire_cap > 0, "fire_cap must be positive, got {fire_cap}");
        Self {
            clock: Clock::new(),
            queue: TaskQueue::new(),
            next_id: 0,
            fire_cap,
        }
    }

    /// Current virtual time.
    pub fn time(&self) -> Duration {
        self.clock.now()
    }

    /// The per-advance fire cap.
    pub fn fire_cap(&self) -> usize {
        self.fire_cap
    }

    /// Queue `payload` to fire `delay` after the current time.
    ///
    /// Always succeeds; the queue is unbounded.
    pub fn schedule(&mut self, delay: Duration, key: impl Into<TaskKey>, payload: P) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let fire_at = self.clock.now().saturating_add(delay);
        let key = key.into();
        debug!(key = %key, task_id = id.0, fire_at_ms = fire_at.as_millis() as u64, "task scheduled");
        self.queue.insert(Task {
            id,
            fire_at,
            key,
            payload,
        });
        id
    }

    /// Remove every queued task with the given key. Returns how many were
    /// removed; an unknown key is a no-op.
    pub fn cancel(&mut self, key: &str) -> usize {
        let removed = self.queue.remove_key(key);
        if removed > 0 {
            debug!(key, removed, "tasks canceled");
        }
        removed
    }

    /// Advance the clock by `dt` and fire due tasks.
    ///
    /// `fire` receives the current time and the owned task. Errors returned
    /// by `fire` are logged at `warn` and counted; they never interrupt the
    /// loop.
    pub fn advance<F, E>(&mut self, dt: Duration, mut fire: F) -> AdvanceReport
    where
        F: FnMut(Duration, Task<P>) -> Result<(), E>,
        E: fmt::Display,
    {
        let now = self.clock.advance(dt);
        let mut report = AdvanceReport::default();

        while report.fired < self.fire_cap {
            let Some(task) = self.queue.pop_due(now) else {
                break;
            };
            let key = task.key.clone();
            let id = task.id;
            report.fired += 1;
            if let Err(e) = fire(now, task) {
                report.failed += 1;
                warn!(key = %key, task_id = id.0, error = %e, "task failed while firing");
            }
        }

        report.deferred = self.queue.due_count(now);
        if report.deferred > 0 {
            warn!(
                deferred = report.deferred,
                fire_cap = self.fire_cap,
                "fire cap reached; due tasks deferred to next advance"
            );
        }
        report
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Deadline of the earliest queued task.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.next_deadline()
    }

    /// Whether any queued task carries `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.queue.contains_key(key)
    }

    /// Iterate queued tasks in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &Task<P>> {
        self.queue.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn drain(scheduler: &mut Scheduler<u32>, dt: Duration) -> (Vec<u32>, AdvanceReport) {
        let mut fired = Vec::new();
        let report = scheduler.advance(dt, |_now, task| {
            fired.push(task.payload);
            Ok::<(), Infallible>(())
        });
        (fired, report)
    }

    // -- 1. Construction -----------------------------------------------------

    #[test]
    fn new_scheduler_is_empty_at_zero() {
        let scheduler: Scheduler<u32> = Scheduler::new();
        assert_eq!(scheduler.time(), Duration::ZERO);
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.fire_cap(), DEFAULT_FIRE_CAP);
    }

    #[test]
    #[should_panic(expected = "fire_cap must be positive")]
    fn zero_fire_cap_panics() {
        let _scheduler: Scheduler<u32> = Scheduler::with_fire_cap(0);
    }

    // -- 2. Ordering ---------------------------------------------------------

    #[test]
    fn fires_in_deadline_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(ms(300), "c", 3);
        scheduler.schedule(ms(100), "a", 1);
        scheduler.schedule(ms(200), "b", 2);

        let (fired, report) = drain(&mut scheduler, ms(300));
        assert_eq!(fired, vec![1, 2, 3]);
        assert_eq!(report.fired, 3);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn ties_fire_in_insertion_order() {
        let mut scheduler = Scheduler::new();
        for n in 0..4 {
            scheduler.schedule(ms(50), "tie", n);
        }
        let (fired, _) = drain(&mut scheduler, ms(50));
        assert_eq!(fired, vec![0, 1, 2, 3]);
    }

    #[test]
    fn future_tasks_do_not_fire_early() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(ms(100), "a", 1);

        let (fired, _) = drain(&mut scheduler, ms(99));
        assert!(fired.is_empty());
        assert_eq!(scheduler.len(), 1);

        let (fired, _) = drain(&mut scheduler, ms(1));
        assert_eq!(fired, vec![1]);
    }

    #[test]
    fn delay_is_relative_to_current_time() {
        let mut scheduler = Scheduler::new();
        drain(&mut scheduler, ms(1_000));
        scheduler.schedule(ms(500), "late", 7);
        assert_eq!(scheduler.next_deadline(), Some(ms(1_500)));
    }

    #[test]
    fn zero_delay_fires_on_next_advance() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::ZERO, "now", 9);
        let (fired, _) = drain(&mut scheduler, Duration::ZERO);
        assert_eq!(fired, vec![9]);
    }

    // -- 3. Cancellation -----------------------------------------------------

    #[test]
    fn cancel_removes_all_tasks_with_key() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(ms(10), "job:1", 1);
        scheduler.schedule(ms(20), "job:2", 2);
        scheduler.schedule(ms(30), "job:1", 3);

        assert_eq!(scheduler.cancel("job:1"), 2);
        let (fired, _) = drain(&mut scheduler, ms(100));
        assert_eq!(fired, vec![2]);
    }

    #[test]
    fn cancel_unknown_key_is_noop() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(ms(10), "a", 1);
        assert_eq!(scheduler.cancel("nope"), 0);
        assert_eq!(scheduler.len(), 1);
    }

    // -- 4. Fire cap ---------------------------------------------------------

    #[test]
    fn fire_cap_defers_excess_tasks() {
        let mut scheduler = Scheduler::with_fire_cap(3);
        for n in 0..5 {
            scheduler.schedule(ms(10), "storm", n);
        }

        let (fired, report) = drain(&mut scheduler, ms(10));
        assert_eq!(fired, vec![0, 1, 2]);
        assert_eq!(report.deferred, 2);

        let (fired, report) = drain(&mut scheduler, Duration::ZERO);
        assert_eq!(fired, vec![3, 4]);
        assert_eq!(report.deferred, 0);
    }

    #[test]
    fn default_cap_is_one_hundred() {
        let mut scheduler = Scheduler::new();
        for n in 0..150 {
            scheduler.schedule(ms(1), "storm", n);
        }
        let (fired, report) = drain(&mut scheduler, ms(1));
        assert_eq!(fired.len(), 100);
        assert_eq!(report.deferred, 50);
    }

    // -- 5. Error boundary ---------------------------------------------------

    #[test]
    fn failing_task_does_not_stop_later_tasks() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(ms(10), "a", 1);
        scheduler.schedule(ms(10), "b", 2);
        scheduler.schedule(ms(10), "c", 3);

        let mut fired = Vec::new();
        let report = scheduler.advance(ms(10), |_now, task| {
            fired.push(task.payload);
            if task.payload == 2 {
                Err("effect exploded")
            } else {
                Ok(())
            }
        });

        assert_eq!(fired, vec![1, 2, 3]);
        assert_eq!(report.fired, 3);
        assert_eq!(report.failed, 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn callback_sees_advanced_time() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(ms(100), "a", 1);
        let mut seen = None;
        scheduler.advance(ms(250), |now, _task| {
            seen = Some(now);
            Ok::<(), Infallible>(())
        });
        assert_eq!(seen, Some(ms(250)));
    }

    // -- 6. Serialization ----------------------------------------------------

    #[test]
    fn scheduler_roundtrips_through_json() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(ms(10), "a", 1u32);
        scheduler.schedule(ms(5), "b", 2u32);

        let json = serde_json::to_string(&scheduler).unwrap();
        let mut restored: Scheduler<u32> = serde_json::from_str(&json).unwrap();

        let (fired, _) = drain(&mut restored, ms(10));
        assert_eq!(fired, vec![2, 1]);
    }
}
