// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared construction of stores, adapters, and the runner.

use anyhow::{Context, Result};
use quill_adapters::{builtin_registry, HttpModelClient, UsageApiCostSource};
use quill_core::{Config, SystemClock};
use quill_engine::{
    BudgetTracker, Runner, RunnerConfig, RunnerDeps, Scheduler, ShutdownCoordinator,
    StaticCategories,
};
use quill_storage::{
    CheckpointStore, CostCacheStore, IncrementalStore, QueueStore, SignalProbe,
};
use std::path::PathBuf;
use std::sync::Arc;

pub struct App {
    pub state_dir: PathBuf,
    pub config: Config,
    pub queue: QueueStore,
    pub checkpoints: CheckpointStore<SignalProbe>,
}

impl App {
    pub fn load() -> Result<Self> {
        let state_dir = quill_core::config::state_dir()?;
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("creating state dir {}", state_dir.display()))?;
        let config = Config::load(&state_dir)?;
        let queue = QueueStore::new(&state_dir);
        let checkpoints = CheckpointStore::new(&state_dir, SignalProbe);
        Ok(Self { state_dir, config, queue, checkpoints })
    }

    /// Directory where workflows write their final artifacts.
    pub fn outputs_dir(&self) -> PathBuf {
        self.state_dir.join("outputs")
    }

    pub fn build_runner(&self) -> Runner<SignalProbe, SystemClock> {
        let api_key = std::env::var("QUILL_API_KEY").ok();

        let mut cost_source = UsageApiCostSource::new(self.config.usage_api_url.clone());
        if let Some(key) = &api_key {
            cost_source = cost_source.with_api_key(key.clone());
        }
        let mut model = HttpModelClient::new(self.config.model_api_url.clone());
        if let Some(key) = &api_key {
            model = model.with_api_key(key.clone());
        }

        let budget = BudgetTracker::new(
            self.config.project.clone(),
            self.config.budget.clone(),
            Arc::new(cost_source),
            CostCacheStore::new(&self.state_dir),
            SystemClock,
        );
        let registry = builtin_registry(Arc::new(model), &self.outputs_dir());
        let scheduler =
            Scheduler::new(Arc::new(StaticCategories::new(self.config.categories.clone())));

        Runner::new(
            RunnerDeps {
                queue: self.queue.clone(),
                checkpoints: self.checkpoints.clone(),
                incremental: IncrementalStore::new(&self.state_dir),
                budget,
                registry,
                scheduler,
                shutdown: ShutdownCoordinator::new(),
                clock: SystemClock,
            },
            RunnerConfig::from(&self.config.pacing),
        )
    }
}
