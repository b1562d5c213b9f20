// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue aggregate and its lock-protected store.
//!
//! Every mutation is a full read-modify-write under an exclusive
//! cross-process advisory lock on a sentinel file. The unlocked read path
//! exists for display only; decisions always go through [`QueueStore::with_lock`].

use crate::fsio;
use crate::paths;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use quill_core::{ConcurrencyPolicy, Job, JobId, JobStatus, Priority};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use thiserror::Error;

/// Current queue schema version
pub const QUEUE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum QueueStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("job {id} is {status} and cannot transition to {wanted}")]
    InvalidTransition { id: JobId, status: JobStatus, wanted: JobStatus },
}

/// Root aggregate: concurrency policy, category rotation state, and all jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    pub policy: ConcurrencyPolicy,
    /// Cached copy of the externally re-derived category list.
    pub categories: Vec<String>,
    /// Round-robin cursor: index of the last-selected category.
    /// `None` means "before the first".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<usize>,
    pub jobs: Vec<Job>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            version: QUEUE_SCHEMA_VERSION,
            policy: ConcurrencyPolicy::default(),
            categories: Vec::new(),
            cursor: None,
            jobs: Vec::new(),
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Queue {
    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    pub fn job_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| &j.id == id)
    }

    pub fn in_progress(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| j.status == JobStatus::InProgress)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| j.status == JobStatus::Pending)
    }

    /// Start time of the most recently started in-progress job.
    pub fn latest_start(&self) -> Option<DateTime<Utc>> {
        self.in_progress().filter_map(|j| j.started_at).max()
    }
}

/// Durable, lock-protected record of all jobs and concurrency policy.
#[derive(Debug, Clone)]
pub struct QueueStore {
    root: PathBuf,
}

impl QueueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn queue_path(&self) -> PathBuf {
        paths::queue_path(&self.root)
    }

    /// Unlocked read for display. Never use the result for decisions.
    pub fn load(&self) -> Queue {
        fsio::read_json_or_quarantine(&self.queue_path()).unwrap_or_default()
    }

    /// Run `f` against the freshly-read queue under the exclusive advisory
    /// lock, persisting the result before the lock is released.
    pub fn with_lock<T>(
        &self,
        f: impl FnOnce(&mut Queue) -> Result<T, QueueStoreError>,
    ) -> Result<T, QueueStoreError> {
        std::fs::create_dir_all(&self.root)?;
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(paths::queue_lock_path(&self.root))?;
        lock_file.lock_exclusive()?;

        let result = (|| {
            let mut queue = self.load();
            let out = f(&mut queue)?;
            queue.updated_at = Utc::now();
            let raw = serde_json::to_vec_pretty(&queue)?;
            fsio::write_atomic(&self.queue_path(), &raw)?;
            Ok(out)
        })();

        let _ = FileExt::unlock(&lock_file);
        result
    }

    /// Append a new job.
    pub fn add(&self, job: Job) -> Result<JobId, QueueStoreError> {
        let id = job.id.clone();
        self.with_lock(|queue| {
            queue.jobs.push(job);
            Ok(())
        })?;
        Ok(id)
    }

    /// Transition a job to in-progress, recording its start time.
    ///
    /// Allowed from pending, paused, or in-progress (resume of crashed work
    /// re-marks the job with a fresh start time).
    pub fn mark_started(&self, id: &JobId, at: DateTime<Utc>) -> Result<(), QueueStoreError> {
        self.with_lock(|queue| {
            let job = queue.job_mut(id).ok_or_else(|| QueueStoreError::JobNotFound(id.clone()))?;
            if job.status.is_terminal() {
                return Err(QueueStoreError::InvalidTransition {
                    id: id.clone(),
                    status: job.status,
                    wanted: JobStatus::InProgress,
                });
            }
            job.status = JobStatus::InProgress;
            job.started_at = Some(at);
            job.error = None;
            Ok(())
        })
    }

    pub fn mark_completed(&self, id: &JobId, at: DateTime<Utc>) -> Result<(), QueueStoreError> {
        self.with_lock(|queue| {
            let job = queue.job_mut(id).ok_or_else(|| QueueStoreError::JobNotFound(id.clone()))?;
            job.status = JobStatus::Completed;
            job.completed_at = Some(at);
            job.phase = None;
            Ok(())
        })
    }

    pub fn mark_failed(
        &self,
        id: &JobId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), QueueStoreError> {
        self.with_lock(|queue| {
            let job = queue.job_mut(id).ok_or_else(|| QueueStoreError::JobNotFound(id.clone()))?;
            job.status = JobStatus::Failed;
            job.completed_at = Some(at);
            job.error = Some(error.to_string());
            job.phase = None;
            Ok(())
        })
    }

    /// Mirror the current checkpoint phase into the job record for display.
    pub fn update_phase(&self, id: &JobId, phase: &str) -> Result<(), QueueStoreError> {
        self.with_lock(|queue| {
            let job = queue.job_mut(id).ok_or_else(|| QueueStoreError::JobNotFound(id.clone()))?;
            job.phase = Some(phase.to_string());
            Ok(())
        })
    }

    /// Re-prioritize a pending job.
    pub fn reorder(&self, id: &JobId, priority: Priority) -> Result<(), QueueStoreError> {
        self.with_lock(|queue| {
            let job = queue.job_mut(id).ok_or_else(|| QueueStoreError::JobNotFound(id.clone()))?;
            job.priority = priority;
            Ok(())
        })
    }

    /// Park a pending job so the scheduler skips it.
    pub fn pause(&self, id: &JobId) -> Result<(), QueueStoreError> {
        self.transition(id, JobStatus::Pending, JobStatus::Paused)
    }

    /// Return a paused job to the pending pool.
    pub fn resume(&self, id: &JobId) -> Result<(), QueueStoreError> {
        self.transition(id, JobStatus::Paused, JobStatus::Pending)
    }

    fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<(), QueueStoreError> {
        self.with_lock(|queue| {
            let job = queue.job_mut(id).ok_or_else(|| QueueStoreError::JobNotFound(id.clone()))?;
            if job.status != from {
                return Err(QueueStoreError::InvalidTransition {
                    id: id.clone(),
                    status: job.status,
                    wanted: to,
                });
            }
            job.status = to;
            Ok(())
        })
    }

    /// Switch concurrency mode. An explicit administrative action.
    pub fn set_policy(&self, policy: ConcurrencyPolicy) -> Result<(), QueueStoreError> {
        self.with_lock(|queue| {
            queue.policy = policy;
            Ok(())
        })
    }

    /// Replace the cached category list, resetting an out-of-range cursor.
    pub fn set_categories(&self, categories: Vec<String>) -> Result<(), QueueStoreError> {
        self.with_lock(|queue| {
            if queue.cursor.is_some_and(|c| c >= categories.len()) {
                queue.cursor = None;
            }
            queue.categories = categories;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
