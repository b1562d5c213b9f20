// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint store: durable in-flight phase progress with PID ownership.
//!
//! One file (`current_work.json`) holds every active checkpoint plus the
//! owner map (job id → PID). A checkpoint exists from start-work until
//! complete-work or fail-work; there is no terminal checkpoint state:
//! terminality lives in the job record. Only process death leaves a
//! checkpoint behind, which is exactly what makes it resumable.

use crate::fsio;
use crate::paths;
use crate::probe::ProcessProbe;
use chrono::{DateTime, Utc};
use quill_core::{JobId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no active work for job {0}")]
    NotActive(JobId),
}

/// Persisted record of a job's current phase and accumulated phase outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job_id: JobId,
    pub kind: String,
    /// External run id for cost/trace correlation.
    pub run_id: RunId,
    /// Current phase, drawn from the job-type's fixed ordered phase list.
    pub phase: String,
    /// Phase-keyed progress notes (display/debugging).
    #[serde(default)]
    pub progress: HashMap<String, serde_json::Value>,
    /// Phase-keyed accumulated outputs, needed to skip finished phases on
    /// resume. Merged on update, never replaced wholesale.
    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Free-form counters for observability.
    #[serde(default)]
    pub counters: HashMap<String, u64>,
}

/// On-disk shape of `current_work.json`: active checkpoints + owner PIDs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CurrentWork {
    #[serde(default)]
    active: HashMap<String, Checkpoint>,
    #[serde(default)]
    owners: HashMap<String, u32>,
}

/// Durable record of in-flight job progress, keyed by job id.
#[derive(Debug, Clone)]
pub struct CheckpointStore<P> {
    root: PathBuf,
    probe: P,
}

impl<P: ProcessProbe> CheckpointStore<P> {
    pub fn new(root: impl Into<PathBuf>, probe: P) -> Self {
        Self { root: root.into(), probe }
    }

    fn path(&self) -> PathBuf {
        paths::current_work_path(&self.root)
    }

    fn read(&self) -> CurrentWork {
        fsio::read_json_or_quarantine(&self.path()).unwrap_or_default()
    }

    fn persist(&self, work: &CurrentWork) -> Result<(), CheckpointError> {
        let raw = serde_json::to_vec_pretty(work)?;
        fsio::write_atomic(&self.path(), &raw)?;
        Ok(())
    }

    /// Begin tracking work on a job, replacing any prior checkpoint for the
    /// same id and recording this process as the owner.
    pub fn start_work(
        &self,
        job_id: &JobId,
        kind: &str,
        run_id: &RunId,
        first_phase: &str,
        now: DateTime<Utc>,
    ) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = Checkpoint {
            job_id: job_id.clone(),
            kind: kind.to_string(),
            run_id: run_id.clone(),
            phase: first_phase.to_string(),
            progress: HashMap::new(),
            outputs: HashMap::new(),
            started_at: now,
            updated_at: now,
            counters: HashMap::new(),
        };
        let mut work = self.read();
        work.active.insert(job_id.to_string(), checkpoint.clone());
        work.owners.insert(job_id.to_string(), std::process::id());
        self.persist(&work)?;
        Ok(checkpoint)
    }

    /// Advance the checkpoint to `phase`, merging the finished phase's
    /// outputs into the accumulated map and bumping counters.
    pub fn update_checkpoint(
        &self,
        job_id: &JobId,
        phase: &str,
        outputs: Option<(String, serde_json::Value)>,
        counters: &[(&str, u64)],
        now: DateTime<Utc>,
    ) -> Result<Checkpoint, CheckpointError> {
        let mut work = self.read();
        let checkpoint = work
            .active
            .get_mut(job_id.as_str())
            .ok_or_else(|| CheckpointError::NotActive(job_id.clone()))?;
        checkpoint.phase = phase.to_string();
        if let Some((done_phase, value)) = outputs {
            checkpoint.outputs.insert(done_phase, value);
        }
        for (name, value) in counters {
            checkpoint.counters.insert((*name).to_string(), *value);
        }
        checkpoint.updated_at = now;
        let snapshot = checkpoint.clone();
        self.persist(&work)?;
        Ok(snapshot)
    }

    /// Record phase-keyed progress notes without advancing the phase.
    pub fn note_progress(
        &self,
        job_id: &JobId,
        phase: &str,
        note: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), CheckpointError> {
        let mut work = self.read();
        let checkpoint = work
            .active
            .get_mut(job_id.as_str())
            .ok_or_else(|| CheckpointError::NotActive(job_id.clone()))?;
        checkpoint.progress.insert(phase.to_string(), note);
        checkpoint.updated_at = now;
        self.persist(&work)
    }

    /// Remove the checkpoint and owner entry after a successful run.
    ///
    /// Idempotent: a second call is a no-op.
    pub fn complete_work(&self, job_id: &JobId) -> Result<(), CheckpointError> {
        self.clear(job_id)
    }

    /// Remove the checkpoint and owner entry after a clean failure.
    ///
    /// Identical to [`complete_work`](Self::complete_work): success vs
    /// failure is recorded on the job, not here. Clean failures are
    /// intentionally not resumable.
    pub fn fail_work(&self, job_id: &JobId) -> Result<(), CheckpointError> {
        self.clear(job_id)
    }

    fn clear(&self, job_id: &JobId) -> Result<(), CheckpointError> {
        let mut work = self.read();
        let removed = work.active.remove(job_id.as_str()).is_some();
        work.owners.remove(job_id.as_str());
        if removed {
            self.persist(&work)?;
        }
        Ok(())
    }

    /// Take ownership of an existing checkpoint, e.g. when resuming work
    /// whose previous owner died. The checkpoint itself is untouched.
    pub fn claim(&self, job_id: &JobId) -> Result<(), CheckpointError> {
        let mut work = self.read();
        if !work.active.contains_key(job_id.as_str()) {
            return Err(CheckpointError::NotActive(job_id.clone()));
        }
        work.owners.insert(job_id.to_string(), std::process::id());
        self.persist(&work)
    }

    pub fn get(&self, job_id: &JobId) -> Option<Checkpoint> {
        self.read().active.get(job_id.as_str()).cloned()
    }

    pub fn owner(&self, job_id: &JobId) -> Option<u32> {
        self.read().owners.get(job_id.as_str()).copied()
    }

    /// Every active checkpoint, dead or alive. Display only.
    pub fn active(&self) -> Vec<Checkpoint> {
        let work = self.read();
        let mut found: Vec<Checkpoint> = work.active.values().cloned().collect();
        found.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        found
    }

    /// All active checkpoints whose recorded owner is no longer alive.
    ///
    /// An orderly completion always removes its checkpoint, so a dead owner
    /// means the process crashed mid-run. A missing owner entry counts as
    /// dead.
    pub fn incomplete_work(&self) -> Vec<Checkpoint> {
        let work = self.read();
        let mut found: Vec<Checkpoint> = work
            .active
            .values()
            .filter(|c| {
                work.owners.get(c.job_id.as_str()).is_none_or(|pid| !self.probe.is_alive(*pid))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        found
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
