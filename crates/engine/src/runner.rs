// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution loop: resumable-first, budget- and shutdown-aware.
//!
//! Per-iteration state machine:
//! check resumable → run(resume) | check bypass/eligible → check budget →
//! run | idle wait. The same machine serves single-shot (`run_once`) and
//! daemon (`run_loop`) modes; the only difference is whether "nothing
//! eligible" returns immediately or waits.
//!
//! Start ordering: the checkpoint is written before the job is marked
//! started in the queue. A crash between the two leaves a pending job with
//! a dead-owner checkpoint, which the resume scan picks up, rather than
//! an in-progress job nothing will ever resume.

use crate::budget::BudgetTracker;
use crate::scheduler::Scheduler;
use crate::shutdown::ShutdownCoordinator;
use crate::workflow::{
    resume_plan, PhaseHooks, ResumePlan, RunStatus, WorkflowError, WorkflowRegistry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_core::{Clock, Job, JobId, RunContext};
use quill_storage::{
    Checkpoint, CheckpointStore, IncrementalState, IncrementalStore, ProcessProbe, QueueStore,
};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("queue error: {0}")]
    Queue(#[from] quill_storage::QueueStoreError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] quill_storage::CheckpointError),
    #[error("workflow for job {id} raised: {source}")]
    Workflow {
        id: JobId,
        #[source]
        source: WorkflowError,
    },
    #[error("blocking task failed: {0}")]
    Task(String),
}

/// What one iteration of the loop did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    Completed { id: JobId, cost_bearing: bool },
    Failed { id: JobId, error: String },
    NothingEligible,
    BudgetPaused,
}

/// Pacing knobs, usually derived from [`quill_core::PacingConfig`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    pub budget_retry: Duration,
    pub base_stagger_hours: f64,
}

impl From<&quill_core::PacingConfig> for RunnerConfig {
    fn from(pacing: &quill_core::PacingConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(pacing.poll_interval_secs),
            budget_retry: Duration::from_secs(pacing.budget_retry_secs),
            base_stagger_hours: pacing.base_stagger_hours,
        }
    }
}

/// Everything the runner composes.
pub struct RunnerDeps<P, C> {
    pub queue: QueueStore,
    pub checkpoints: CheckpointStore<P>,
    pub incremental: IncrementalStore,
    pub budget: BudgetTracker<C>,
    pub registry: WorkflowRegistry,
    pub scheduler: Scheduler,
    pub shutdown: ShutdownCoordinator,
    pub clock: C,
}

/// Retry-safe, resumable, budget- and shutdown-aware execution loop. The
/// only component that knows how to run one job end to end.
pub struct Runner<P, C> {
    deps: RunnerDeps<P, C>,
    config: RunnerConfig,
}

impl<P, C> Runner<P, C>
where
    P: ProcessProbe + 'static,
    C: Clock + 'static,
{
    pub fn new(deps: RunnerDeps<P, C>, config: RunnerConfig) -> Self {
        Self { deps, config }
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.deps.shutdown
    }

    /// Run exactly one job (or discover there is nothing to do) and return.
    ///
    /// An uncaught workflow error propagates to the caller after the job is
    /// marked failed and its checkpoint cleared.
    pub async fn run_once(&self, skip_resume: bool) -> Result<RunReport, RunnerError> {
        if !skip_resume {
            if let Some((job, checkpoint)) = self.next_resumable().await? {
                info!(job_id = %job.id, phase = %checkpoint.phase, "resuming interrupted work");
                return self.execute(job, Some(checkpoint)).await;
            }
        }

        let Some(job) = self.select_eligible().await? else {
            return Ok(RunReport::NothingEligible);
        };

        // Budget admission gates cost-bearing work only; bypass kinds were
        // selected outside the policy gate and publish-style zero-cost
        // kinds never spend.
        let cost_bearing = !self.deps.registry.zero_cost(job.kind());
        if cost_bearing && !self.deps.budget.should_proceed().await {
            return Ok(RunReport::BudgetPaused);
        }

        self.execute(job, None).await
    }

    /// Daemon mode: loop until shutdown is requested. Workflow errors are
    /// logged and the loop continues with the next iteration.
    pub async fn run_loop(&self) {
        info!("runner loop started");
        loop {
            if self.deps.shutdown.is_requested() {
                break;
            }
            match self.run_once(false).await {
                Ok(RunReport::Completed { id, cost_bearing }) => {
                    info!(job_id = %id, "job completed");
                    if cost_bearing && self.stagger_pause().await {
                        break;
                    }
                }
                Ok(RunReport::Failed { id, error }) => {
                    warn!(job_id = %id, %error, "job failed");
                }
                Ok(RunReport::NothingEligible) => {
                    if self.deps.shutdown.wait_or_shutdown(self.config.poll_interval).await {
                        break;
                    }
                }
                Ok(RunReport::BudgetPaused) => {
                    warn!("budget exhausted, pausing admissions");
                    if self.deps.shutdown.wait_or_shutdown(self.config.budget_retry).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "job run raised, continuing");
                }
            }
        }
        info!("runner loop stopped");
    }

    /// Interruptible post-run stagger. Returns true when shutdown fired.
    async fn stagger_pause(&self) -> bool {
        let hours = self.deps.budget.adaptive_stagger_hours(self.config.base_stagger_hours).await;
        info!(hours, "staggering before next job");
        let wait = Duration::from_secs_f64(hours * 3600.0);
        self.deps.shutdown.wait_or_shutdown(wait).await
    }

    /// Oldest dead-owner checkpoint whose job is still runnable.
    ///
    /// Checkpoints for jobs that are already terminal (or gone from the
    /// queue) are stale: a crash landed between queue and checkpoint
    /// writes. They are cleared here, never resumed.
    async fn next_resumable(&self) -> Result<Option<(Job, Checkpoint)>, RunnerError> {
        let store = self.deps.checkpoints.clone();
        let incomplete = self
            .blocking(move || Ok::<_, RunnerError>(store.incomplete_work()))
            .await?;
        if incomplete.is_empty() {
            return Ok(None);
        }

        let queue = {
            let store = self.deps.queue.clone();
            self.blocking(move || Ok::<_, RunnerError>(store.load())).await?
        };
        for checkpoint in incomplete {
            match queue.job(&checkpoint.job_id) {
                Some(job) if !job.is_terminal() => {
                    return Ok(Some((job.clone(), checkpoint)));
                }
                other => {
                    warn!(
                        job_id = %checkpoint.job_id,
                        found = other.is_some(),
                        "clearing stale checkpoint for terminal or missing job"
                    );
                    let store = self.deps.checkpoints.clone();
                    let id = checkpoint.job_id.clone();
                    self.blocking(move || store.complete_work(&id).map_err(RunnerError::from))
                        .await?;
                }
            }
        }
        Ok(None)
    }

    /// Ask the scheduler for the next job under the queue lock, persisting
    /// the advanced cursor with the same write.
    async fn select_eligible(&self) -> Result<Option<Job>, RunnerError> {
        let store = self.deps.queue.clone();
        let scheduler = self.deps.scheduler.clone();
        let bypass = self.deps.registry.bypass_kinds();
        let now = self.deps.clock.now_utc();
        self.blocking(move || {
            store
                .with_lock(|queue| {
                    Ok(scheduler
                        .select_next(queue, now, &bypass)
                        .and_then(|id| queue.job(&id).cloned()))
                })
                .map_err(RunnerError::from)
        })
        .await
    }

    /// Run one job end to end, fresh or resumed.
    async fn execute(
        &self,
        job: Job,
        checkpoint: Option<Checkpoint>,
    ) -> Result<RunReport, RunnerError> {
        let workflow = match self.deps.registry.get(job.kind()) {
            Ok(workflow) => workflow,
            Err(e) => {
                // Unknown discriminator: fail fast, recording the valid set.
                let message = e.to_string();
                self.finish_failed(&job.id, &message).await?;
                return Err(RunnerError::Workflow { id: job.id, source: e });
            }
        };
        let phases = workflow.phases();
        let now = self.deps.clock.now_utc();
        let cost_bearing = !workflow.zero_cost();

        // Checkpoint first, queue second (see module docs).
        let (run, resume) = match checkpoint {
            Some(checkpoint) => {
                let plan = resume_plan(phases, &checkpoint);
                let run = RunContext {
                    job_id: job.id.clone(),
                    run_id: checkpoint.run_id.clone(),
                    kind: job.kind().to_string(),
                };
                let store = self.deps.checkpoints.clone();
                let id = job.id.clone();
                self.blocking(move || store.claim(&id).map_err(RunnerError::from)).await?;
                (run, Some(plan))
            }
            None => {
                let run = RunContext::new(job.id.clone(), job.kind());
                let store = self.deps.checkpoints.clone();
                let (id, kind, run_id) = (job.id.clone(), job.kind(), run.run_id.clone());
                let first = phases.first().copied().unwrap_or("run");
                self.blocking(move || {
                    store
                        .start_work(&id, kind, &run_id, first, now)
                        .map_err(RunnerError::from)
                })
                .await?;
                (run, None)
            }
        };

        self.mark_started(&job.id, resume.as_ref(), phases, now).await?;

        let hooks = RunnerHooks {
            run: run.clone(),
            phases,
            queue: self.deps.queue.clone(),
            checkpoints: self.deps.checkpoints.clone(),
            incremental: self.deps.incremental.clone(),
            budget: self.deps.budget.clone(),
            shutdown: self.deps.shutdown.clone(),
            clock: self.deps.clock.clone(),
        };

        info!(job_id = %job.id, run_id = %run.run_id, kind = %run.kind, resumed = resume.is_some(), "job started");
        let result = workflow.run(&job, &hooks, resume).await;

        match result {
            Ok(outcome) if outcome.status != RunStatus::Failed => {
                if let Err(e) = workflow.save_outputs(&job, &outcome).await {
                    let message = format!("saving outputs failed: {e}");
                    self.finish_failed(&job.id, &message).await?;
                    return Ok(RunReport::Failed { id: job.id, error: message });
                }
                if outcome.status == RunStatus::Partial {
                    warn!(
                        job_id = %job.id,
                        error = outcome.error.as_deref().unwrap_or("unspecified"),
                        "job completed partially"
                    );
                }
                self.finish_completed(&job.id).await?;
                Ok(RunReport::Completed { id: job.id, cost_bearing })
            }
            Ok(outcome) => {
                // Explicit failure returned by the workflow: recorded on the
                // job, checkpoint cleared. Intentionally not resumable.
                let message =
                    outcome.error.unwrap_or_else(|| "workflow reported failure".to_string());
                self.finish_failed(&job.id, &message).await?;
                Ok(RunReport::Failed { id: job.id, error: message })
            }
            Err(e) => {
                // Uncaught error from the job body: mark failed, clear the
                // checkpoint, and re-raise to the caller.
                self.finish_failed(&job.id, &e.to_string()).await?;
                Err(RunnerError::Workflow { id: job.id, source: e })
            }
        }
    }

    async fn mark_started(
        &self,
        id: &JobId,
        resume: Option<&ResumePlan>,
        phases: &'static [&'static str],
        now: DateTime<Utc>,
    ) -> Result<(), RunnerError> {
        let store = self.deps.queue.clone();
        let id = id.clone();
        let phase = resume
            .map(|plan| plan.start_phase.clone())
            .unwrap_or_else(|| phases.first().copied().unwrap_or("run").to_string());
        self.blocking(move || {
            store.mark_started(&id, now)?;
            store.update_phase(&id, &phase).map_err(RunnerError::from)
        })
        .await
    }

    async fn finish_completed(&self, id: &JobId) -> Result<(), RunnerError> {
        let now = self.deps.clock.now_utc();
        let queue = self.deps.queue.clone();
        let checkpoints = self.deps.checkpoints.clone();
        let incremental = self.deps.incremental.clone();
        let id = id.clone();
        self.blocking(move || {
            queue.mark_completed(&id, now)?;
            checkpoints.complete_work(&id)?;
            if let Err(e) = incremental.clear(&id) {
                warn!(job_id = %id, error = %e, "could not clear incremental state");
            }
            Ok(())
        })
        .await
    }

    async fn finish_failed(&self, id: &JobId, message: &str) -> Result<(), RunnerError> {
        let now = self.deps.clock.now_utc();
        let queue = self.deps.queue.clone();
        let checkpoints = self.deps.checkpoints.clone();
        let incremental = self.deps.incremental.clone();
        let id = id.clone();
        let message = message.to_string();
        self.blocking(move || {
            queue.mark_failed(&id, &message, now)?;
            checkpoints.fail_work(&id)?;
            if let Err(e) = incremental.clear(&id) {
                warn!(job_id = %id, error = %e, "could not clear incremental state");
            }
            Ok(())
        })
        .await
    }

    /// Offload synchronous store I/O to the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, RunnerError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RunnerError> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| RunnerError::Task(e.to_string()))?
    }
}

/// The runner's [`PhaseHooks`]: checkpoints, display mirroring, and
/// non-aborting budget/shutdown re-checks at phase boundaries.
struct RunnerHooks<P, C> {
    run: RunContext,
    phases: &'static [&'static str],
    queue: QueueStore,
    checkpoints: CheckpointStore<P>,
    incremental: IncrementalStore,
    budget: BudgetTracker<C>,
    shutdown: ShutdownCoordinator,
    clock: C,
}

impl<P: ProcessProbe + 'static, C: Clock + 'static> RunnerHooks<P, C> {
    /// Phase after `phase` in the ordered list, or `phase` itself at the
    /// end (the checkpoint parks on the final phase until the run clears it).
    fn next_phase(&self, phase: &str) -> String {
        self.phases
            .iter()
            .position(|p| *p == phase)
            .and_then(|i| self.phases.get(i + 1))
            .copied()
            .unwrap_or(phase)
            .to_string()
    }
}

#[async_trait]
impl<P, C> PhaseHooks for RunnerHooks<P, C>
where
    P: ProcessProbe + 'static,
    C: Clock + 'static,
{
    fn run(&self) -> &RunContext {
        &self.run
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.is_requested()
    }

    async fn phase_complete(
        &self,
        phase: &str,
        outputs: Option<serde_json::Value>,
        counters: Vec<(String, u64)>,
    ) -> Result<(), WorkflowError> {
        let next = self.next_phase(phase);
        let now = self.clock.now_utc();

        let checkpoints = self.checkpoints.clone();
        let queue = self.queue.clone();
        let incremental = self.incremental.clone();
        let id = self.run.job_id.clone();
        let done = phase.to_string();
        let advance_to = next.clone();
        tokio::task::spawn_blocking(move || {
            let merged = outputs.map(|value| (done.clone(), value));
            let counter_refs: Vec<(&str, u64)> =
                counters.iter().map(|(name, value)| (name.as_str(), *value)).collect();
            checkpoints.update_checkpoint(&id, &advance_to, merged, &counter_refs, now)?;
            queue.update_phase(&id, &advance_to)?;
            // The finished phase's deltas are folded into the checkpoint now.
            if let Err(e) = incremental.clear(&id) {
                warn!(job_id = %id, error = %e, "could not clear incremental state");
            }
            Ok::<_, WorkflowError>(())
        })
        .await
        .map_err(|e| WorkflowError::Execution(format!("checkpoint task failed: {e}")))??;

        // Re-check budget and shutdown without aborting the in-flight job.
        if !self.budget.should_proceed().await {
            warn!(job_id = %self.run.job_id, "budget exhausted mid-job, finishing current work");
        }
        if self.shutdown.is_requested() {
            info!(job_id = %self.run.job_id, "shutdown requested, finishing current job");
        }
        Ok(())
    }

    async fn save_progress(
        &self,
        phase: &str,
        iteration: u64,
        interval: u64,
        partial: HashMap<String, serde_json::Value>,
    ) -> Result<(), WorkflowError> {
        let state = IncrementalState {
            job_id: self.run.job_id.clone(),
            phase: phase.to_string(),
            iteration,
            interval,
            partial,
            updated_at: self.clock.now_utc(),
        };
        let store = self.incremental.clone();
        tokio::task::spawn_blocking(move || store.save(&state))
            .await
            .map_err(|e| WorkflowError::Execution(format!("incremental task failed: {e}")))??;
        Ok(())
    }

    async fn load_progress(&self, phase: &str) -> Option<IncrementalState> {
        let store = self.incremental.clone();
        let id = self.run.job_id.clone();
        let phase = phase.to_string();
        tokio::task::spawn_blocking(move || store.load(&id, Some(&phase)))
            .await
            .ok()
            .flatten()
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
