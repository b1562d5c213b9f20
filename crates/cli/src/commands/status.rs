// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue, budget, and in-flight work overview.

use crate::output::format_time_ago;
use crate::setup::App;
use anyhow::Result;
use quill_core::{JobStatus, SystemClock};
use quill_engine::BudgetTracker;
use quill_storage::{CostCacheStore, SignalProbe, ProcessProbe};
use std::sync::Arc;

pub async fn handle() -> Result<()> {
    let app = App::load()?;
    let queue = app.queue.load();

    let count = |status: JobStatus| queue.jobs.iter().filter(|j| j.status == status).count();
    println!("Queue ({})", app.state_dir.display());
    println!(
        "  {} pending, {} in progress, {} paused, {} completed, {} failed",
        count(JobStatus::Pending),
        count(JobStatus::InProgress),
        count(JobStatus::Paused),
        count(JobStatus::Completed),
        count(JobStatus::Failed),
    );
    println!("  policy: {}", queue.policy);
    if !queue.categories.is_empty() {
        println!("  categories: {}", queue.categories.join(", "));
    }

    let active = app.checkpoints.active();
    if active.is_empty() {
        println!("\nNo work in flight");
    } else {
        println!("\nIn-flight work");
        let probe = SignalProbe;
        for checkpoint in active {
            let owner = app.checkpoints.owner(&checkpoint.job_id);
            let liveness = match owner {
                Some(pid) if probe.is_alive(pid) => format!("pid {pid}"),
                Some(pid) => format!("pid {pid} dead, resumable"),
                None => "no owner, resumable".to_string(),
            };
            println!(
                "  {} {} at {} ({}, last checkpoint {} ago)",
                checkpoint.job_id.short(10),
                checkpoint.kind,
                checkpoint.phase,
                liveness,
                format_time_ago(checkpoint.updated_at),
            );
        }
    }

    // Cost comes from the cache when fresh; a cold cache queries the API.
    let mut cost_source =
        quill_adapters::UsageApiCostSource::new(app.config.usage_api_url.clone());
    if let Ok(key) = std::env::var("QUILL_API_KEY") {
        cost_source = cost_source.with_api_key(key);
    }
    let budget = BudgetTracker::new(
        app.config.project.clone(),
        app.config.budget.clone(),
        Arc::new(cost_source),
        CostCacheStore::new(&app.state_dir),
        SystemClock,
    );
    let status = budget.status().await;
    println!(
        "\nBudget: ${:.2} of ${:.2} used this month ({:.0}%), action: {}",
        status.cost, status.budget, status.percent_used, status.action
    );
    Ok(())
}
