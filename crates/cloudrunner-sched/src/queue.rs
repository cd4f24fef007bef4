//! Deadline-ordered task storage.
//!
//! [`TaskQueue`] is an ordered multiset of [`Task`]s sorted by `fire_at`
//! ascending. Tasks with equal deadlines keep their insertion order: every
//! task carries a [`TaskId`] drawn from a monotonic counter, and the queue
//! orders by `(fire_at, id)`.
//!
//! The queue knows nothing about time passing. The
//! [`Scheduler`](crate::scheduler::Scheduler) pairs it with a
//! [`Clock`](crate::clock::Clock) and decides when tasks are due.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TaskKey
// ---------------------------------------------------------------------------

/// Opaque cancellation key.
///
/// Keys are not unique: several tasks may share one, and
/// [`TaskQueue::remove_key`] removes all of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey(String);

impl TaskKey {
    /// Create a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TaskKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Insertion sequence number of a task. Breaks ties between equal deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A delayed unit of work.
///
/// The payload is stored by value; the owner of the scheduler decides what
/// firing it means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task<P> {
    /// Insertion sequence number.
    pub id: TaskId,
    /// Virtual time at which the task becomes due.
    pub fire_at: Duration,
    /// Cancellation key.
    pub key: TaskKey,
    /// What to do when the task fires.
    pub payload: P,
}

impl<P> Task<P> {
    fn order(&self) -> (Duration, TaskId) {
        (self.fire_at, self.id)
    }
}

// ---------------------------------------------------------------------------
// TaskQueue
// ---------------------------------------------------------------------------

/// Tasks ordered by `(fire_at, id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueue<P> {
    tasks: VecDeque<Task<P>>,
}

impl<P> Default for TaskQueue<P> {
    fn default() -> Self {
        Self {
            tasks: VecDeque::new(),
        }
    }
}

impl<P> TaskQueue<P> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task at its ordered position.
    ///
    /// Tasks are inserted after every task with an equal or earlier
    /// `(fire_at, id)` pair, so ids allocated in increasing order yield FIFO
    /// ordering among equal deadlines.
    pub fn insert(&mut self, task: Task<P>) {
        let order = task.order();
        let at = self.tasks.partition_point(|t| t.order() <= order);
        self.tasks.insert(at, task);
    }

    /// Pop the earliest task if its deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<Task<P>> {
        match self.tasks.front() {
            Some(front) if front.fire_at <= now => self.tasks.pop_front(),
            _ => None,
        }
    }

    /// Remove every task whose key equals `key`. Returns how many were removed.
    pub fn remove_key(&mut self, key: &str) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.key.as_str() != key);
        before - self.tasks.len()
    }

    /// Number of tasks with a deadline at or before `now`.
    pub fn due_count(&self, now: Duration) -> usize {
        self.tasks.partition_point(|t| t.fire_at <= now)
    }

    /// Whether any queued task carries `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.tasks.iter().any(|t| t.key.as_str() == key)
    }

    /// Deadline of the earliest queued task.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.tasks.front().map(|t| t.fire_at)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterate tasks in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &Task<P>> {
        self.tasks.iter()
    }

    /// Drop every task.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64, fire_ms: u64, key: &str) -> Task<u64> {
        Task {
            id: TaskId(id),
            fire_at: Duration::from_millis(fire_ms),
            key: TaskKey::from(key),
            payload: id,
        }
    }

    fn payloads(queue: &TaskQueue<u64>) -> Vec<u64> {
        queue.iter().map(|t| t.payload).collect()
    }

    #[test]
    fn insert_orders_by_deadline() {
        let mut queue = TaskQueue::new();
        queue.insert(task(0, 300, "a"));
        queue.insert(task(1, 100, "b"));
        queue.insert(task(2, 200, "c"));
        assert_eq!(payloads(&queue), vec![1, 2, 0]);
        assert_eq!(queue.next_deadline(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn equal_deadlines_keep_insertion_order() {
        let mut queue = TaskQueue::new();
        for id in 0..5 {
            queue.insert(task(id, 50, "same"));
        }
        assert_eq!(payloads(&queue), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn pop_due_respects_now() {
        let mut queue = TaskQueue::new();
        queue.insert(task(0, 100, "a"));
        queue.insert(task(1, 200, "b"));

        assert!(queue.pop_due(Duration::from_millis(99)).is_none());
        assert_eq!(queue.pop_due(Duration::from_millis(100)).map(|t| t.payload), Some(0));
        assert!(queue.pop_due(Duration::from_millis(100)).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_key_drops_all_matches() {
        let mut queue = TaskQueue::new();
        queue.insert(task(0, 10, "job:1"));
        queue.insert(task(1, 20, "job:2"));
        queue.insert(task(2, 30, "job:1"));

        assert_eq!(queue.remove_key("job:1"), 2);
        assert_eq!(payloads(&queue), vec![1]);
        assert!(!queue.contains_key("job:1"));
        assert_eq!(queue.remove_key("missing"), 0);
    }

    #[test]
    fn due_count_counts_prefix() {
        let mut queue = TaskQueue::new();
        queue.insert(task(0, 10, "a"));
        queue.insert(task(1, 10, "a"));
        queue.insert(task(2, 11, "a"));
        assert_eq!(queue.due_count(Duration::from_millis(10)), 2);
        assert_eq!(queue.due_count(Duration::ZERO), 0);
    }
}
