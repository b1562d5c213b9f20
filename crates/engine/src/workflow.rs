// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow boundary: the contract job bodies implement, the registry that
//! dispatches on the job-kind discriminator, and the resume plan computed
//! from a checkpoint.

use async_trait::async_trait;
use indexmap::IndexMap;
use quill_core::{Job, RunContext};
use quill_storage::{Checkpoint, CheckpointError, IncrementalError, IncrementalState, QueueStoreError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("unknown job kind {kind:?} (known kinds: {known})")]
    UnknownKind { kind: String, known: String },
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueStoreError),
    #[error("incremental state error: {0}")]
    Incremental(#[from] IncrementalError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Unrecoverable failure inside the job body (the "uncaught exception"
    /// path): the runner marks the job failed and re-raises.
    #[error("{0}")]
    Execution(String),
}

/// Workflow return status. `Partial` completed with degraded output and is
/// treated as success for queue bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

quill_core::simple_display! {
    RunStatus {
        Success => "success",
        Partial => "partial",
        Failed => "failed",
    }
}

/// What a workflow run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Phase-keyed outputs accumulated over the run.
    pub outputs: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn success(outputs: HashMap<String, serde_json::Value>) -> Self {
        Self { status: RunStatus::Success, outputs, error: None }
    }

    pub fn partial(outputs: HashMap<String, serde_json::Value>, error: impl Into<String>) -> Self {
        Self { status: RunStatus::Partial, outputs, error: Some(error.into()) }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { status: RunStatus::Failed, outputs: HashMap::new(), error: Some(error.into()) }
    }
}

/// Phase-boundary callbacks the runner hands to a workflow.
///
/// All durable side effects of a run flow through here: coarse checkpoints
/// at phase boundaries, delta snapshots inside long phases. The runner's
/// implementation also mirrors the phase into the job record and re-checks
/// budget and shutdown state without aborting the in-flight phase.
#[async_trait]
pub trait PhaseHooks: Send + Sync {
    fn run(&self) -> &RunContext;

    /// True once shutdown has been requested. Checked at phase boundaries;
    /// the current phase always finishes.
    fn shutdown_requested(&self) -> bool;

    /// Record that `phase` finished with `outputs`, advancing the
    /// checkpoint to the next phase in the ordered list.
    async fn phase_complete(
        &self,
        phase: &str,
        outputs: Option<serde_json::Value>,
        counters: Vec<(String, u64)>,
    ) -> Result<(), WorkflowError>;

    /// Persist mid-phase delta progress every K iterations.
    async fn save_progress(
        &self,
        phase: &str,
        iteration: u64,
        interval: u64,
        partial: HashMap<String, serde_json::Value>,
    ) -> Result<(), WorkflowError>;

    /// Load mid-phase progress for `phase`, if any and not stale.
    async fn load_progress(&self, phase: &str) -> Option<IncrementalState>;
}

/// A registered job body: a named implementation with a fixed ordered
/// phase list.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// The job-kind discriminator this workflow serves.
    fn kind(&self) -> &'static str;

    /// Ordered phase list; checkpoints advance through these.
    fn phases(&self) -> &'static [&'static str];

    /// Zero-cost kinds skip budget admission and post-run stagger.
    fn zero_cost(&self) -> bool {
        false
    }

    /// Bypass kinds ignore concurrency policy entirely.
    fn bypass_concurrency(&self) -> bool {
        false
    }

    /// Execute the job, calling `hooks.phase_complete` after each phase.
    /// When `resume` is given, phases before `resume.start_phase` must be
    /// skipped, reusing their stored outputs.
    async fn run(
        &self,
        job: &Job,
        hooks: &dyn PhaseHooks,
        resume: Option<ResumePlan>,
    ) -> Result<RunOutcome, WorkflowError>;

    /// Persist final artifacts, returning name → path of what was written.
    async fn save_outputs(
        &self,
        job: &Job,
        outcome: &RunOutcome,
    ) -> Result<HashMap<String, PathBuf>, WorkflowError>;
}

/// What a resumed run may skip: all phases strictly preceding
/// `start_phase`, with their stored outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePlan {
    pub start_phase: String,
    pub completed: HashMap<String, serde_json::Value>,
}

impl ResumePlan {
    /// Whether `phase` was already completed and should be skipped.
    pub fn skips(&self, phase: &str) -> bool {
        self.completed.contains_key(phase)
    }

    /// Stored output of an already-completed phase.
    pub fn output(&self, phase: &str) -> Option<&serde_json::Value> {
        self.completed.get(phase)
    }
}

/// Compute the resume plan for a checkpoint against the workflow's ordered
/// phase list. Phases strictly before the checkpointed phase count as
/// completed; an unrecognized checkpoint phase restarts from the beginning.
pub fn resume_plan(phases: &[&str], checkpoint: &Checkpoint) -> ResumePlan {
    let position =
        phases.iter().position(|p| *p == checkpoint.phase).unwrap_or(0);
    let completed = phases[..position]
        .iter()
        .filter_map(|p| checkpoint.outputs.get(*p).map(|v| ((*p).to_string(), v.clone())))
        .collect();
    let start_phase =
        phases.get(position).copied().unwrap_or(checkpoint.phase.as_str()).to_string();
    ResumePlan { start_phase, completed }
}

/// Init-time table mapping job-kind discriminators to workflow
/// implementations. Unknown kinds fail fast with the valid list.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    map: IndexMap<&'static str, Arc<dyn Workflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, workflow: Arc<dyn Workflow>) {
        self.map.insert(workflow.kind(), workflow);
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn Workflow>, WorkflowError> {
        self.map.get(kind).cloned().ok_or_else(|| WorkflowError::UnknownKind {
            kind: kind.to_string(),
            known: self.map.keys().copied().collect::<Vec<_>>().join(", "),
        })
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.map.keys().copied().collect()
    }

    /// Kinds flagged to ignore concurrency policy.
    pub fn bypass_kinds(&self) -> std::collections::HashSet<String> {
        self.map
            .values()
            .filter(|w| w.bypass_concurrency())
            .map(|w| w.kind().to_string())
            .collect()
    }

    /// Whether `kind` is registered as zero-cost. Unknown kinds count as
    /// cost-bearing.
    pub fn zero_cost(&self, kind: &str) -> bool {
        self.map.get(kind).map(|w| w.zero_cost()).unwrap_or(false)
    }
}

/// In-memory [`PhaseHooks`] for workflow tests: records phase completions
/// and serves incremental snapshots from a map.
#[cfg(any(test, feature = "test-support"))]
pub struct MemoryHooks {
    run: RunContext,
    pub completed: parking_lot::Mutex<Vec<(String, Option<serde_json::Value>)>>,
    pub saved: parking_lot::Mutex<Vec<IncrementalState>>,
    pub preloaded: parking_lot::Mutex<Option<IncrementalState>>,
    pub shutdown: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-support"))]
impl MemoryHooks {
    pub fn new(run: RunContext) -> Self {
        Self {
            run,
            completed: parking_lot::Mutex::new(Vec::new()),
            saved: parking_lot::Mutex::new(Vec::new()),
            preloaded: parking_lot::Mutex::new(None),
            shutdown: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Names of phases reported complete, in order.
    pub fn completed_phases(&self) -> Vec<String> {
        self.completed.lock().iter().map(|(p, _)| p.clone()).collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl PhaseHooks for MemoryHooks {
    fn run(&self) -> &RunContext {
        &self.run
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(std::sync::atomic::Ordering::Relaxed)
    }

    async fn phase_complete(
        &self,
        phase: &str,
        outputs: Option<serde_json::Value>,
        _counters: Vec<(String, u64)>,
    ) -> Result<(), WorkflowError> {
        self.completed.lock().push((phase.to_string(), outputs));
        Ok(())
    }

    async fn save_progress(
        &self,
        phase: &str,
        iteration: u64,
        interval: u64,
        partial: HashMap<String, serde_json::Value>,
    ) -> Result<(), WorkflowError> {
        self.saved.lock().push(IncrementalState {
            job_id: self.run.job_id.clone(),
            phase: phase.to_string(),
            iteration,
            interval,
            partial,
            updated_at: chrono::DateTime::UNIX_EPOCH,
        });
        Ok(())
    }

    async fn load_progress(&self, phase: &str) -> Option<IncrementalState> {
        self.preloaded.lock().clone().filter(|s| s.phase == phase)
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
