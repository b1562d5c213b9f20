// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Budget tracking: cached cost aggregation, admission control, and
//! adaptive pacing.
//!
//! Cost-source failures never block an admission decision: the tracker
//! falls back to the cached value, or zero for a project with no runs yet.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use quill_core::{BudgetConfig, BudgetPolicy, Clock};
use quill_storage::{CostCacheStore, CostEntry, MAX_TRACKED_RUN_IDS};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// One completed top-level run reported by the cost source.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: String,
    /// Run name; by convention the job kind that produced it.
    pub name: String,
    pub total_cost: f64,
    pub total_tokens: u64,
}

#[derive(Debug, Error)]
pub enum CostSourceError {
    /// The project does not exist until its first run is recorded.
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("cost source unavailable: {0}")]
    Unavailable(String),
}

/// External billing/usage API boundary.
#[async_trait]
pub trait CostSource: Send + Sync {
    /// All completed top-level runs for `project` since `since`.
    async fn completed_runs(
        &self,
        project: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RunRecord>, CostSourceError>;
}

/// Admission-control decision for starting new cost-bearing work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetAction {
    Ok,
    Warn,
    Slowdown,
    Pause,
}

quill_core::simple_display! {
    BudgetAction {
        Ok => "ok",
        Warn => "warn",
        Slowdown => "slowdown",
        Pause => "pause",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetStatus {
    pub cost: f64,
    pub budget: f64,
    pub percent_used: f64,
    pub action: BudgetAction,
}

/// Cached, TTL'd cost aggregation plus the admission and pacing decisions.
#[derive(Clone)]
pub struct BudgetTracker<C> {
    project: String,
    config: BudgetConfig,
    source: Arc<dyn CostSource>,
    cache: CostCacheStore,
    clock: C,
}

impl<C: Clock> BudgetTracker<C> {
    pub fn new(
        project: impl Into<String>,
        config: BudgetConfig,
        source: Arc<dyn CostSource>,
        cache: CostCacheStore,
        clock: C,
    ) -> Self {
        Self { project: project.into(), config, source, cache, clock }
    }

    fn period_key(&self, now: DateTime<Utc>) -> String {
        format!("{}:{}", self.project, now.format("%Y-%m"))
    }

    /// Aggregated cost for the current billing period.
    ///
    /// Serves the cached entry while it is within its 1-hour TTL (unless
    /// `force_refresh`); otherwise re-aggregates from the cost source and
    /// persists the refreshed entry.
    pub async fn current_period_cost(&self, force_refresh: bool) -> f64 {
        let now = self.clock.now_utc();
        let key = self.period_key(now);

        let store = self.cache.clone();
        let mut cache = tokio::task::spawn_blocking(move || store.load())
            .await
            .unwrap_or_default();

        if !force_refresh {
            if let Some(entry) = cache.periods.get(&key) {
                if entry.is_fresh(now) {
                    return entry.total_cost;
                }
            }
        }

        let month_start = start_of_month(now);
        match self.source.completed_runs(&self.project, month_start).await {
            Ok(runs) => {
                let mut tokens_by_kind: HashMap<String, u64> = HashMap::new();
                let mut total_cost = 0.0;
                for run in &runs {
                    total_cost += run.total_cost;
                    *tokens_by_kind.entry(run.name.clone()).or_default() += run.total_tokens;
                }
                let mut run_ids: Vec<String> = runs.iter().map(|r| r.id.clone()).collect();
                if run_ids.len() > MAX_TRACKED_RUN_IDS {
                    run_ids.drain(..run_ids.len() - MAX_TRACKED_RUN_IDS);
                }
                let entry = CostEntry {
                    period: key.clone(),
                    total_cost,
                    tokens_by_kind,
                    run_count: runs.len() as u64,
                    last_aggregated: now,
                    run_ids,
                };
                cache.periods.insert(key, entry);
                cache.last_sync = Some(now);
                let store = self.cache.clone();
                let persist =
                    tokio::task::spawn_blocking(move || store.save(&cache)).await;
                match persist {
                    Ok(Err(e)) => warn!(error = %e, "failed to persist cost cache"),
                    Err(e) => warn!(error = %e, "cost cache persist task failed"),
                    Ok(Ok(())) => {}
                }
                total_cost
            }
            Err(CostSourceError::ProjectNotFound(project)) => {
                // The project does not exist until the first run lands.
                debug!(%project, "cost project not found, treating cost as zero");
                0.0
            }
            Err(e) => {
                warn!(error = %e, "cost query failed, falling back to cached value");
                cache.periods.get(&key).map(|entry| entry.total_cost).unwrap_or(0.0)
            }
        }
    }

    /// Current spend against budget and the resulting admission action.
    pub async fn status(&self) -> BudgetStatus {
        let cost = self.current_period_cost(false).await;
        let budget = self.config.monthly_usd;
        let percent_used = if budget > 0.0 { cost / budget * 100.0 } else { 0.0 };
        BudgetStatus { cost, budget, percent_used, action: self.action_for(percent_used) }
    }

    fn action_for(&self, percent_used: f64) -> BudgetAction {
        if percent_used >= 100.0 {
            match self.config.on_exceeded {
                BudgetPolicy::Pause => BudgetAction::Pause,
                BudgetPolicy::Slowdown => BudgetAction::Slowdown,
                BudgetPolicy::Warn => BudgetAction::Warn,
            }
        } else if percent_used >= 90.0 {
            match self.config.on_exceeded {
                BudgetPolicy::Pause | BudgetPolicy::Slowdown => BudgetAction::Slowdown,
                BudgetPolicy::Warn => BudgetAction::Warn,
            }
        } else if percent_used >= 75.0 {
            BudgetAction::Warn
        } else {
            BudgetAction::Ok
        }
    }

    /// Whether a new cost-bearing job may start. False only under `pause`;
    /// every other action lets the caller proceed (and log).
    pub async fn should_proceed(&self) -> bool {
        self.status().await.action != BudgetAction::Pause
    }

    /// Scale the base stagger interval by how far actual spend runs ahead
    /// of (or behind) the linear month pace. A proportional controller
    /// whose only actuator is delaying the next job start.
    pub async fn adaptive_stagger_hours(&self, base: f64) -> f64 {
        let status = self.status().await;
        let day = self.clock.now_utc().day() as f64;
        let expected_percent = day / 30.0 * 100.0;
        let ratio =
            if expected_percent > 0.0 { status.percent_used / expected_percent } else { 1.0 };
        let multiplier = if ratio < 0.5 {
            0.5
        } else if ratio < 0.8 {
            0.75
        } else if ratio <= 1.2 {
            1.0
        } else if ratio <= 1.5 {
            1.5
        } else {
            2.0
        };
        base * multiplier
    }
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0).single().unwrap_or(now)
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
