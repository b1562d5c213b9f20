// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::budget::{CostSource, CostSourceError, RunRecord};
use crate::scheduler::StaticCategories;
use crate::workflow::{ResumePlan, RunOutcome, Workflow, WorkflowRegistry};
use chrono::TimeZone;
use parking_lot::Mutex;
use quill_core::{BudgetConfig, BudgetPolicy, FakeClock, JobDraft, JobPayload, JobStatus, RunId};
use quill_storage::{CostCacheStore, FakeProbe};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

const PHASES: &[&str] = &["gather", "synthesize", "draft", "polish"];

struct FixedCost(f64);

#[async_trait]
impl CostSource for FixedCost {
    async fn completed_runs(
        &self,
        _project: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RunRecord>, CostSourceError> {
        Ok(vec![RunRecord {
            id: "r1".to_string(),
            name: "research".to_string(),
            total_cost: self.0,
            total_tokens: 1,
        }])
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Succeed,
    FailAt(&'static str),
    RaiseAt(&'static str),
}

/// Scripted job body: walks its phase list, honoring the resume plan and
/// recording what actually ran.
struct FakeFlow {
    kind: &'static str,
    phases: &'static [&'static str],
    mode: Mode,
    zero_cost: bool,
    bypass: bool,
    ran: Mutex<Vec<String>>,
    observed_resume: Mutex<Option<Option<ResumePlan>>>,
}

impl FakeFlow {
    fn research(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            kind: "research",
            phases: PHASES,
            mode,
            zero_cost: false,
            bypass: false,
            ran: Mutex::new(Vec::new()),
            observed_resume: Mutex::new(None),
        })
    }

    fn publish() -> Arc<Self> {
        Arc::new(Self {
            kind: "publish",
            phases: &["render", "release"],
            mode: Mode::Succeed,
            zero_cost: true,
            bypass: true,
            ran: Mutex::new(Vec::new()),
            observed_resume: Mutex::new(None),
        })
    }

    fn ran_phases(&self) -> Vec<String> {
        self.ran.lock().clone()
    }
}

#[async_trait]
impl Workflow for FakeFlow {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn phases(&self) -> &'static [&'static str] {
        self.phases
    }

    fn zero_cost(&self) -> bool {
        self.zero_cost
    }

    fn bypass_concurrency(&self) -> bool {
        self.bypass
    }

    async fn run(
        &self,
        _job: &Job,
        hooks: &dyn PhaseHooks,
        resume: Option<ResumePlan>,
    ) -> Result<RunOutcome, WorkflowError> {
        *self.observed_resume.lock() = Some(resume.clone());
        let mut outputs: std::collections::HashMap<String, serde_json::Value> = resume
            .as_ref()
            .map(|plan| plan.completed.clone())
            .unwrap_or_default();
        for phase in self.phases() {
            if resume.as_ref().is_some_and(|plan| plan.skips(phase)) {
                continue;
            }
            match self.mode {
                Mode::FailAt(p) if p == *phase => {
                    return Ok(RunOutcome::failed(format!("{phase} could not finish")));
                }
                Mode::RaiseAt(p) if p == *phase => {
                    return Err(WorkflowError::Execution(format!("{phase} blew up")));
                }
                _ => {}
            }
            self.ran.lock().push(phase.to_string());
            let value = json!({ "phase": phase });
            hooks.phase_complete(phase, Some(value.clone()), vec![]).await?;
            outputs.insert((*phase).to_string(), value);
        }
        Ok(RunOutcome::success(outputs))
    }

    async fn save_outputs(
        &self,
        _job: &Job,
        _outcome: &RunOutcome,
    ) -> Result<std::collections::HashMap<String, PathBuf>, WorkflowError> {
        Ok(std::collections::HashMap::new())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    probe: FakeProbe,
    clock: FakeClock,
    queue: QueueStore,
    checkpoints: CheckpointStore<FakeProbe>,
    incremental: IncrementalStore,
    runner: Runner<FakeProbe, FakeClock>,
}

fn fixture(workflows: Vec<Arc<FakeFlow>>, cost: f64, policy: BudgetPolicy) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let probe = FakeProbe::with_self_alive();
    let clock = FakeClock::new();
    clock.set_utc(Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).single().unwrap());

    let queue = QueueStore::new(dir.path());
    let checkpoints = CheckpointStore::new(dir.path(), probe.clone());
    let incremental = IncrementalStore::new(dir.path());
    let budget = BudgetTracker::new(
        "field-notes",
        BudgetConfig { monthly_usd: 100.0, on_exceeded: policy },
        Arc::new(FixedCost(cost)),
        CostCacheStore::new(dir.path()),
        clock.clone(),
    );
    let mut registry = WorkflowRegistry::new();
    for workflow in workflows {
        registry.register(workflow);
    }
    let scheduler =
        Scheduler::new(Arc::new(StaticCategories::new(vec!["essays".to_string()])));

    let runner = Runner::new(
        RunnerDeps {
            queue: queue.clone(),
            checkpoints: checkpoints.clone(),
            incremental: incremental.clone(),
            budget,
            registry,
            scheduler,
            shutdown: ShutdownCoordinator::new(),
            clock: clock.clone(),
        },
        RunnerConfig {
            poll_interval: Duration::from_millis(10),
            budget_retry: Duration::from_millis(10),
            base_stagger_hours: 0.0,
        },
    );

    Fixture { _dir: dir, probe, clock, queue, checkpoints, incremental, runner }
}

fn add_research(fx: &Fixture) -> JobId {
    let draft = JobDraft::new(JobPayload::Research {
        topic: "memory and place".to_string(),
        questions: vec!["q1".to_string(), "q2".to_string()],
    })
    .category("essays");
    let job = Job::new(draft, &fx.clock);
    fx.queue.add(job).unwrap()
}

#[tokio::test]
async fn run_once_completes_a_job_end_to_end() {
    let flow = FakeFlow::research(Mode::Succeed);
    let fx = fixture(vec![flow.clone()], 0.0, BudgetPolicy::Pause);
    let id = add_research(&fx);

    let report = fx.runner.run_once(false).await.unwrap();
    assert_eq!(report, RunReport::Completed { id: id.clone(), cost_bearing: true });

    let job = fx.queue.load().job(&id).cloned().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
    assert_eq!(job.phase, None);

    assert_eq!(flow.ran_phases(), vec!["gather", "synthesize", "draft", "polish"]);
    assert!(fx.checkpoints.get(&id).is_none());
}

#[tokio::test]
async fn nothing_eligible_on_empty_queue() {
    let fx = fixture(vec![FakeFlow::research(Mode::Succeed)], 0.0, BudgetPolicy::Pause);
    assert_eq!(fx.runner.run_once(false).await.unwrap(), RunReport::NothingEligible);
}

#[tokio::test]
async fn clean_failure_is_recorded_and_not_resumable() {
    let flow = FakeFlow::research(Mode::FailAt("draft"));
    let fx = fixture(vec![flow], 0.0, BudgetPolicy::Pause);
    let id = add_research(&fx);

    let report = fx.runner.run_once(false).await.unwrap();
    assert!(matches!(report, RunReport::Failed { .. }));

    let job = fx.queue.load().job(&id).cloned().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("draft could not finish"));
    // Clean failures leave no checkpoint: nothing to resume
    assert!(fx.checkpoints.get(&id).is_none());
    fx.probe.set_dead(std::process::id());
    assert_eq!(fx.runner.run_once(false).await.unwrap(), RunReport::NothingEligible);
}

#[tokio::test]
async fn workflow_error_marks_failed_and_reraises() {
    let flow = FakeFlow::research(Mode::RaiseAt("synthesize"));
    let fx = fixture(vec![flow], 0.0, BudgetPolicy::Pause);
    let id = add_research(&fx);

    let err = fx.runner.run_once(false).await.unwrap_err();
    assert!(matches!(err, RunnerError::Workflow { .. }));

    let job = fx.queue.load().job(&id).cloned().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap_or_default().contains("blew up"));
    assert!(fx.checkpoints.get(&id).is_none());
}

#[tokio::test]
async fn budget_pause_blocks_cost_bearing_work() {
    let fx = fixture(vec![FakeFlow::research(Mode::Succeed)], 101.0, BudgetPolicy::Pause);
    let id = add_research(&fx);

    assert_eq!(fx.runner.run_once(false).await.unwrap(), RunReport::BudgetPaused);
    // The job was not started
    assert_eq!(fx.queue.load().job(&id).unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn zero_cost_job_ignores_exhausted_budget() {
    let publish = FakeFlow::publish();
    let fx = fixture(vec![publish.clone()], 101.0, BudgetPolicy::Pause);
    let draft = JobDraft::new(JobPayload::Publish {
        publish_at: fx.clock.now_utc(),
        channel: "blog".to_string(),
    })
    .category("essays");
    let id = fx.queue.add(Job::new(draft, &fx.clock)).unwrap();

    let report = fx.runner.run_once(false).await.unwrap();
    assert_eq!(report, RunReport::Completed { id: id.clone(), cost_bearing: false });
    assert_eq!(publish.ran_phases(), vec!["render", "release"]);
}

#[tokio::test]
async fn dead_owner_checkpoint_resumes_skipping_finished_phases() {
    let flow = FakeFlow::research(Mode::Succeed);
    let fx = fixture(vec![flow.clone()], 0.0, BudgetPolicy::Pause);
    let id = add_research(&fx);

    // A previous process got through gather and synthesize, then died
    let run_id = RunId::from_string("run-prior");
    fx.checkpoints.start_work(&id, "research", &run_id, "gather", fx.clock.now_utc()).unwrap();
    fx.checkpoints
        .update_checkpoint(
            &id,
            "synthesize",
            Some(("gather".to_string(), json!(["s1", "s2"]))),
            &[],
            fx.clock.now_utc(),
        )
        .unwrap();
    fx.checkpoints
        .update_checkpoint(
            &id,
            "draft",
            Some(("synthesize".to_string(), json!({"outline": 3}))),
            &[],
            fx.clock.now_utc(),
        )
        .unwrap();
    fx.probe.set_dead(std::process::id());

    let report = fx.runner.run_once(false).await.unwrap();
    assert_eq!(report, RunReport::Completed { id: id.clone(), cost_bearing: true });

    // Only the remaining phases ran, with the stored outputs reused
    assert_eq!(flow.ran_phases(), vec!["draft", "polish"]);
    let resume = flow.observed_resume.lock().clone().flatten().unwrap();
    assert_eq!(resume.start_phase, "draft");
    assert_eq!(resume.output("gather"), Some(&json!(["s1", "s2"])));
    assert_eq!(resume.output("synthesize"), Some(&json!({"outline": 3})));
    // The resumed run keeps the original run id for cost correlation
    assert!(fx.checkpoints.get(&id).is_none());
}

#[tokio::test]
async fn skip_resume_runs_fresh_instead() {
    let flow = FakeFlow::research(Mode::Succeed);
    let fx = fixture(vec![flow.clone()], 0.0, BudgetPolicy::Pause);
    let id = add_research(&fx);
    fx.checkpoints
        .start_work(&id, "research", &RunId::from_string("run-prior"), "draft", fx.clock.now_utc())
        .unwrap();
    fx.probe.set_dead(std::process::id());

    fx.runner.run_once(true).await.unwrap();
    // All phases ran; the stale checkpoint was replaced by the fresh run
    assert_eq!(flow.ran_phases(), vec!["gather", "synthesize", "draft", "polish"]);
}

#[tokio::test]
async fn stale_checkpoint_for_terminal_job_is_cleared_not_resumed() {
    let flow = FakeFlow::research(Mode::Succeed);
    let fx = fixture(vec![flow.clone()], 0.0, BudgetPolicy::Pause);
    let id = add_research(&fx);
    fx.queue.mark_started(&id, fx.clock.now_utc()).unwrap();
    fx.queue.mark_completed(&id, fx.clock.now_utc()).unwrap();
    fx.checkpoints
        .start_work(&id, "research", &RunId::from_string("run-prior"), "draft", fx.clock.now_utc())
        .unwrap();
    fx.probe.set_dead(std::process::id());

    assert_eq!(fx.runner.run_once(false).await.unwrap(), RunReport::NothingEligible);
    assert!(fx.checkpoints.get(&id).is_none());
    assert!(flow.ran_phases().is_empty());
}

#[tokio::test]
async fn unknown_kind_fails_fast_and_marks_the_job() {
    // Registry has no workflow for research jobs
    let fx = fixture(vec![FakeFlow::publish()], 0.0, BudgetPolicy::Pause);
    let id = add_research(&fx);

    let err = fx.runner.run_once(false).await.unwrap_err();
    assert!(err.to_string().contains("unknown job kind"));
    let job = fx.queue.load().job(&id).cloned().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap_or_default().contains("publish"));
}

#[tokio::test]
async fn phase_mirror_tracks_progress_during_run() {
    // Observed through the phase hook: after completing "gather" the job
    // record should show the next phase.
    struct MirrorFlow {
        queue: QueueStore,
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl Workflow for MirrorFlow {
        fn kind(&self) -> &'static str {
            "research"
        }
        fn phases(&self) -> &'static [&'static str] {
            PHASES
        }
        async fn run(
            &self,
            job: &Job,
            hooks: &dyn PhaseHooks,
            _resume: Option<ResumePlan>,
        ) -> Result<RunOutcome, WorkflowError> {
            hooks.phase_complete("gather", None, vec![]).await?;
            self.seen.lock().push(self.queue.load().job(&job.id).and_then(|j| j.phase.clone()));
            Ok(RunOutcome::success(std::collections::HashMap::new()))
        }
        async fn save_outputs(
            &self,
            _job: &Job,
            _outcome: &RunOutcome,
        ) -> Result<std::collections::HashMap<String, PathBuf>, WorkflowError> {
            Ok(std::collections::HashMap::new())
        }
    }

    let dir_fx = fixture(vec![FakeFlow::publish()], 0.0, BudgetPolicy::Pause);
    let flow = Arc::new(MirrorFlow { queue: dir_fx.queue.clone(), seen: Mutex::new(Vec::new()) });
    // Rebuild the fixture with the mirror flow registered
    let fx = {
        let mut registry = WorkflowRegistry::new();
        registry.register(flow.clone());
        Runner::new(
            RunnerDeps {
                queue: dir_fx.queue.clone(),
                checkpoints: dir_fx.checkpoints.clone(),
                incremental: dir_fx.incremental.clone(),
                budget: BudgetTracker::new(
                    "field-notes",
                    BudgetConfig { monthly_usd: 100.0, on_exceeded: BudgetPolicy::Pause },
                    Arc::new(FixedCost(0.0)),
                    CostCacheStore::new(dir_fx._dir.path()),
                    dir_fx.clock.clone(),
                ),
                registry,
                scheduler: Scheduler::new(Arc::new(StaticCategories::new(vec![
                    "essays".to_string()
                ]))),
                shutdown: ShutdownCoordinator::new(),
                clock: dir_fx.clock.clone(),
            },
            RunnerConfig {
                poll_interval: Duration::from_millis(10),
                budget_retry: Duration::from_millis(10),
                base_stagger_hours: 0.0,
            },
        )
    };
    let id = add_research(&dir_fx);

    fx.run_once(false).await.unwrap();
    assert_eq!(flow.seen.lock().clone(), vec![Some("synthesize".to_string())]);
    // Completion clears the mirror
    assert_eq!(dir_fx.queue.load().job(&id).unwrap().phase, None);
}

#[tokio::test]
async fn incremental_state_is_cleared_when_its_phase_completes() {
    struct SavingFlow {
        loaded: Mutex<Vec<Option<u64>>>,
    }

    #[async_trait]
    impl Workflow for SavingFlow {
        fn kind(&self) -> &'static str {
            "research"
        }
        fn phases(&self) -> &'static [&'static str] {
            PHASES
        }
        async fn run(
            &self,
            _job: &Job,
            hooks: &dyn PhaseHooks,
            _resume: Option<ResumePlan>,
        ) -> Result<RunOutcome, WorkflowError> {
            let loaded = hooks.load_progress("gather").await.map(|s| s.iteration);
            self.loaded.lock().push(loaded);
            hooks
                .save_progress(
                    "gather",
                    5,
                    5,
                    std::collections::HashMap::from([("q5".to_string(), json!("partial"))]),
                )
                .await?;
            let loaded = hooks.load_progress("gather").await.map(|s| s.iteration);
            self.loaded.lock().push(loaded);
            hooks.phase_complete("gather", Some(json!(["all"])), vec![]).await?;
            let loaded = hooks.load_progress("gather").await.map(|s| s.iteration);
            self.loaded.lock().push(loaded);
            Ok(RunOutcome::success(std::collections::HashMap::new()))
        }
        async fn save_outputs(
            &self,
            _job: &Job,
            _outcome: &RunOutcome,
        ) -> Result<std::collections::HashMap<String, PathBuf>, WorkflowError> {
            Ok(std::collections::HashMap::new())
        }
    }

    let base = fixture(vec![FakeFlow::publish()], 0.0, BudgetPolicy::Pause);
    let flow = Arc::new(SavingFlow { loaded: Mutex::new(Vec::new()) });
    let mut registry = WorkflowRegistry::new();
    registry.register(flow.clone());
    let runner = Runner::new(
        RunnerDeps {
            queue: base.queue.clone(),
            checkpoints: base.checkpoints.clone(),
            incremental: base.incremental.clone(),
            budget: BudgetTracker::new(
                "field-notes",
                BudgetConfig { monthly_usd: 100.0, on_exceeded: BudgetPolicy::Pause },
                Arc::new(FixedCost(0.0)),
                CostCacheStore::new(base._dir.path()),
                base.clock.clone(),
            ),
            registry,
            scheduler: Scheduler::new(Arc::new(StaticCategories::new(vec![
                "essays".to_string()
            ]))),
            shutdown: ShutdownCoordinator::new(),
            clock: base.clock.clone(),
        },
        RunnerConfig {
            poll_interval: Duration::from_millis(10),
            budget_retry: Duration::from_millis(10),
            base_stagger_hours: 0.0,
        },
    );
    add_research(&base);

    runner.run_once(false).await.unwrap();
    // No snapshot before saving, the saved iteration after, nothing once
    // the phase completed.
    assert_eq!(flow.loaded.lock().clone(), vec![None, Some(5), None]);
}

#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let fx = fixture(vec![FakeFlow::research(Mode::Succeed)], 0.0, BudgetPolicy::Pause);
    let runner = Arc::new(fx.runner);
    let shutdown = runner.shutdown().clone();

    let handle = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.run_loop().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.request();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop after shutdown")
        .unwrap();
}
