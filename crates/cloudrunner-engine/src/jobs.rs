//! Background job table.
//!
//! A [`Job`] exists from the moment a background cast is accepted until its
//! completion task fires or it is killed. Ids come from a single counter that
//! starts at 1 and is never rewound, so a killed job's id is never handed out
//! again.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// An in-flight background cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Monotonic id, shown to the player as `%<id>`.
    pub job_id: u64,
    /// The line the player typed.
    pub source_line: String,
    /// Command id being cast.
    pub command: String,
    /// Virtual time the job was accepted.
    pub started_at: Duration,
    /// Virtual time the completion task is due.
    pub ends_at: Duration,
    /// Set when the job is killed.
    pub canceled: bool,
}

impl Job {
    /// Completion percentage at `now`, clamped to `[0, 100]`.
    ///
    /// A zero-length job reports 0 until it is removed.
    pub fn progress(&self, now: Duration) -> f64 {
        let total = self.ends_at.saturating_sub(self.started_at);
        if total.is_zero() {
            return 0.0;
        }
        let elapsed = now.saturating_sub(self.started_at);
        (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0) * 100.0
    }
}

/// Read-only projection of a job for `jobs` listings and the HUD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    /// Job id.
    pub job_id: u64,
    /// The line the player typed.
    pub source_line: String,
    /// Completion percentage.
    pub progress_percent: f64,
    /// Virtual time the job completes.
    pub ends_at: Duration,
}

// ---------------------------------------------------------------------------
// JobTable
// ---------------------------------------------------------------------------

/// Registry of live background jobs, ordered by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTable {
    jobs: BTreeMap<u64, Job>,
    next_id: u64,
}

impl Default for JobTable {
    fn default() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl JobTable {
    /// An empty table whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next job id.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Register a job under its id.
    pub fn insert(&mut self, job: Job) {
        self.jobs.insert(job.job_id, job);
    }

    /// Look up a job.
    pub fn get(&self, job_id: u64) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    /// Whether `job_id` is registered and not canceled.
    pub fn is_live(&self, job_id: u64) -> bool {
        self.jobs.get(&job_id).is_some_and(|j| !j.canceled)
    }

    /// Remove a job that ran to completion.
    pub fn complete(&mut self, job_id: u64) -> Option<Job> {
        self.jobs.remove(&job_id)
    }

    /// Mark a job canceled and remove it. `None` if it is not registered.
    pub fn cancel(&mut self, job_id: u64) -> Option<Job> {
        let mut job = self.jobs.remove(&job_id)?;
        job.canceled = true;
        Some(job)
    }

    /// Views of every live job at `now`, ordered by id.
    pub fn views(&self, now: Duration) -> Vec<JobView> {
        self.jobs
            .values()
            .map(|job| JobView {
                job_id: job.job_id,
                source_line: job.source_line.clone(),
                progress_percent: job.progress(now),
                ends_at: job.ends_at,
            })
            .collect()
    }

    /// Number of live jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no jobs are live.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn job(table: &mut JobTable, start: u64, end: u64) -> u64 {
        let job_id = table.allocate_id();
        table.insert(Job {
            job_id,
            source_line: "scan &".to_owned(),
            command: "scan".to_owned(),
            started_at: ms(start),
            ends_at: ms(end),
            canceled: false,
        });
        job_id
    }

    #[test]
    fn ids_start_at_one_and_never_repeat() {
        let mut table = JobTable::new();
        let a = job(&mut table, 0, 100);
        let b = job(&mut table, 0, 100);
        table.cancel(a);
        table.complete(b);
        let c = job(&mut table, 0, 100);
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn progress_is_clamped_linear() {
        let mut table = JobTable::new();
        let id = job(&mut table, 0, 1_800);
        let j = table.get(id).unwrap();

        assert_eq!(j.progress(ms(0)), 0.0);
        assert!((j.progress(ms(900)) - 50.0).abs() < 1e-9);
        assert_eq!(j.progress(ms(1_800)), 100.0);
        assert_eq!(j.progress(ms(5_000)), 100.0);
    }

    #[test]
    fn zero_length_job_reports_zero() {
        let mut table = JobTable::new();
        let id = job(&mut table, 500, 500);
        assert_eq!(table.get(id).unwrap().progress(ms(500)), 0.0);
    }

    #[test]
    fn cancel_marks_and_removes() {
        let mut table = JobTable::new();
        let id = job(&mut table, 0, 100);

        let canceled = table.cancel(id).unwrap();
        assert!(canceled.canceled);
        assert!(!table.is_live(id));
        assert!(table.cancel(id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn views_are_ordered_by_id() {
        let mut table = JobTable::new();
        job(&mut table, 0, 100);
        job(&mut table, 0, 200);
        job(&mut table, 0, 400);

        let ids: Vec<u64> = table.views(ms(100)).iter().map(|v| v.job_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(table.views(ms(100))[1].progress_percent, 50.0);
    }
}
