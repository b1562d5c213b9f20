// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use quill_core::FakeClock;
use quill_storage::CostCacheStore;

/// Scripted cost source: serves a fixed response and counts queries.
struct ScriptedSource {
    response: Mutex<Result<Vec<RunRecord>, CostSourceError>>,
    queries: Mutex<u64>,
}

impl ScriptedSource {
    fn runs(runs: Vec<RunRecord>) -> Arc<Self> {
        Arc::new(Self { response: Mutex::new(Ok(runs)), queries: Mutex::new(0) })
    }

    fn failing(error: CostSourceError) -> Arc<Self> {
        Arc::new(Self { response: Mutex::new(Err(error)), queries: Mutex::new(0) })
    }

    fn query_count(&self) -> u64 {
        *self.queries.lock()
    }
}

#[async_trait]
impl CostSource for ScriptedSource {
    async fn completed_runs(
        &self,
        _project: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RunRecord>, CostSourceError> {
        *self.queries.lock() += 1;
        match &*self.response.lock() {
            Ok(runs) => Ok(runs.clone()),
            Err(CostSourceError::ProjectNotFound(p)) => {
                Err(CostSourceError::ProjectNotFound(p.clone()))
            }
            Err(CostSourceError::Unavailable(m)) => Err(CostSourceError::Unavailable(m.clone())),
        }
    }
}

fn run(id: &str, name: &str, cost: f64, tokens: u64) -> RunRecord {
    RunRecord { id: id.to_string(), name: name.to_string(), total_cost: cost, total_tokens: tokens }
}

fn tracker_with(
    source: Arc<ScriptedSource>,
    budget_usd: f64,
    policy: BudgetPolicy,
) -> (tempfile::TempDir, FakeClock, BudgetTracker<FakeClock>) {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    // 2026-08-15 12:00:00 UTC
    clock.set_utc(Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).single().unwrap());
    let tracker = BudgetTracker::new(
        "field-notes",
        BudgetConfig { monthly_usd: budget_usd, on_exceeded: policy },
        source,
        CostCacheStore::new(dir.path()),
        clock.clone(),
    );
    (dir, clock, tracker)
}

#[tokio::test]
async fn aggregates_costs_and_tokens_by_kind() {
    let source = ScriptedSource::runs(vec![
        run("r1", "research", 10.0, 50_000),
        run("r2", "research", 5.0, 25_000),
        run("r3", "revision", 2.5, 10_000),
    ]);
    let (dir, _clock, tracker) = tracker_with(source, 100.0, BudgetPolicy::Pause);

    let cost = tracker.current_period_cost(false).await;
    assert!((cost - 17.5).abs() < 1e-9);

    let cache = CostCacheStore::new(dir.path()).load();
    let entry = &cache.periods["field-notes:2026-08"];
    assert_eq!(entry.run_count, 3);
    assert_eq!(entry.tokens_by_kind["research"], 75_000);
    assert_eq!(entry.tokens_by_kind["revision"], 10_000);
    assert!(cache.last_sync.is_some());
}

#[tokio::test]
async fn fresh_cache_entry_skips_the_source() {
    let source = ScriptedSource::runs(vec![run("r1", "research", 10.0, 1)]);
    let (_dir, _clock, tracker) = tracker_with(source.clone(), 100.0, BudgetPolicy::Pause);

    tracker.current_period_cost(false).await;
    tracker.current_period_cost(false).await;
    assert_eq!(source.query_count(), 1);
}

#[tokio::test]
async fn stale_cache_entry_triggers_refresh() {
    let source = ScriptedSource::runs(vec![run("r1", "research", 10.0, 1)]);
    let (_dir, clock, tracker) = tracker_with(source.clone(), 100.0, BudgetPolicy::Pause);

    tracker.current_period_cost(false).await;
    // 61 minutes later the entry is past its TTL
    clock.advance(std::time::Duration::from_secs(61 * 60));
    tracker.current_period_cost(false).await;
    assert_eq!(source.query_count(), 2);
}

#[tokio::test]
async fn force_refresh_bypasses_fresh_cache() {
    let source = ScriptedSource::runs(vec![run("r1", "research", 10.0, 1)]);
    let (_dir, _clock, tracker) = tracker_with(source.clone(), 100.0, BudgetPolicy::Pause);

    tracker.current_period_cost(false).await;
    tracker.current_period_cost(true).await;
    assert_eq!(source.query_count(), 2);
}

#[tokio::test]
async fn missing_project_counts_as_zero() {
    let source = ScriptedSource::failing(CostSourceError::ProjectNotFound("field-notes".into()));
    let (_dir, _clock, tracker) = tracker_with(source, 100.0, BudgetPolicy::Pause);
    assert_eq!(tracker.current_period_cost(true).await, 0.0);
}

#[tokio::test]
async fn source_outage_falls_back_to_cached_value() {
    let source = ScriptedSource::runs(vec![run("r1", "research", 42.0, 1)]);
    let (_dir, clock, tracker) = tracker_with(source.clone(), 100.0, BudgetPolicy::Pause);
    tracker.current_period_cost(false).await;

    *source.response.lock() = Err(CostSourceError::Unavailable("503".into()));
    clock.advance(std::time::Duration::from_secs(2 * 3600));
    // Stale cache + dead source: the stale value still answers
    assert_eq!(tracker.current_period_cost(false).await, 42.0);
}

#[tokio::test]
async fn source_outage_with_no_cache_is_zero() {
    let source = ScriptedSource::failing(CostSourceError::Unavailable("503".into()));
    let (_dir, _clock, tracker) = tracker_with(source, 100.0, BudgetPolicy::Pause);
    assert_eq!(tracker.current_period_cost(false).await, 0.0);
}

#[tokio::test]
async fn run_ids_are_capped_to_most_recent() {
    let runs: Vec<RunRecord> =
        (0..130).map(|i| run(&format!("r{i}"), "research", 0.1, 10)).collect();
    let source = ScriptedSource::runs(runs);
    let (dir, _clock, tracker) = tracker_with(source, 1000.0, BudgetPolicy::Pause);
    tracker.current_period_cost(false).await;

    let cache = CostCacheStore::new(dir.path()).load();
    let entry = &cache.periods["field-notes:2026-08"];
    assert_eq!(entry.run_ids.len(), 100);
    assert_eq!(entry.run_ids.first().map(String::as_str), Some("r30"));
    assert_eq!(entry.run_ids.last().map(String::as_str), Some("r129"));
    assert_eq!(entry.run_count, 130);
}

#[yare::parameterized(
    ok_below_warn = { 50.0, BudgetPolicy::Pause, BudgetAction::Ok },
    warn_at_76 = { 76.0, BudgetPolicy::Pause, BudgetAction::Warn },
    slowdown_at_95_pause_policy = { 95.0, BudgetPolicy::Pause, BudgetAction::Slowdown },
    slowdown_at_95_slowdown_policy = { 95.0, BudgetPolicy::Slowdown, BudgetAction::Slowdown },
    warn_at_95_warn_policy = { 95.0, BudgetPolicy::Warn, BudgetAction::Warn },
    pause_at_101 = { 101.0, BudgetPolicy::Pause, BudgetAction::Pause },
    slowdown_at_101_slowdown_policy = { 101.0, BudgetPolicy::Slowdown, BudgetAction::Slowdown },
    warn_at_101_warn_policy = { 101.0, BudgetPolicy::Warn, BudgetAction::Warn },
)]
fn threshold_actions(percent: f64, policy: BudgetPolicy, expected: BudgetAction) {
    let source = ScriptedSource::runs(vec![]);
    let (_dir, _clock, tracker) = tracker_with(source, 100.0, policy);
    assert_eq!(tracker.action_for(percent), expected);
}

#[tokio::test]
async fn status_reports_percent_and_action() {
    let source = ScriptedSource::runs(vec![run("r1", "research", 76.0, 1)]);
    let (_dir, _clock, tracker) = tracker_with(source, 100.0, BudgetPolicy::Pause);

    let status = tracker.status().await;
    assert!((status.percent_used - 76.0).abs() < 1e-9);
    assert_eq!(status.action, BudgetAction::Warn);
}

#[tokio::test]
async fn should_proceed_is_false_only_for_pause() {
    let source = ScriptedSource::runs(vec![run("r1", "research", 101.0, 1)]);
    let (_dir, _clock, tracker) = tracker_with(source, 100.0, BudgetPolicy::Pause);
    assert!(!tracker.should_proceed().await);

    let source = ScriptedSource::runs(vec![run("r1", "research", 101.0, 1)]);
    let (_dir, _clock, tracker) = tracker_with(source, 100.0, BudgetPolicy::Slowdown);
    assert!(tracker.should_proceed().await);
}

#[tokio::test]
async fn adaptive_stagger_scales_with_pace() {
    // Day 15 of a 30-day month: expected percent = 50
    let cases: &[(f64, f64)] =
        &[(10.0, 0.5), (35.0, 0.75), (50.0, 1.0), (70.0, 1.5), (90.0, 2.0)];
    for (cost, multiplier) in cases {
        let source = ScriptedSource::runs(vec![run("r1", "research", *cost, 1)]);
        let (_dir, _clock, tracker) = tracker_with(source, 100.0, BudgetPolicy::Pause);

        let hours = tracker.adaptive_stagger_hours(24.0).await;
        assert!(
            (hours - 24.0 * multiplier).abs() < 1e-9,
            "cost {cost} expected multiplier {multiplier}, got {hours}"
        );
    }
}
