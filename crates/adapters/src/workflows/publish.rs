// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled publication. Zero-cost and concurrency-bypassing: a publish
//! job must never be starved by a stagger window or a spent budget.

use super::{skips, write_artifact};
use async_trait::async_trait;
use quill_core::{Job, JobPayload};
use quill_engine::{PhaseHooks, ResumePlan, RunOutcome, Workflow, WorkflowError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const PHASES: &[&str] = &["render", "release"];

pub struct PublishWorkflow {
    out_dir: PathBuf,
}

impl PublishWorkflow {
    pub fn new(out_dir: &Path) -> Self {
        Self { out_dir: out_dir.to_path_buf() }
    }
}

#[async_trait]
impl Workflow for PublishWorkflow {
    fn kind(&self) -> &'static str {
        "publish"
    }

    fn phases(&self) -> &'static [&'static str] {
        PHASES
    }

    fn zero_cost(&self) -> bool {
        true
    }

    fn bypass_concurrency(&self) -> bool {
        true
    }

    async fn run(
        &self,
        job: &Job,
        hooks: &dyn PhaseHooks,
        resume: Option<ResumePlan>,
    ) -> Result<RunOutcome, WorkflowError> {
        let JobPayload::Publish { publish_at, channel } = &job.payload else {
            return Err(WorkflowError::Execution(
                "publish workflow received a non-publish payload".to_string(),
            ));
        };
        let mut acc: HashMap<String, Value> =
            resume.as_ref().map(|plan| plan.completed.clone()).unwrap_or_default();

        if !skips(&resume, "render") {
            let front_matter = format!(
                "---\nchannel: {channel}\npublish_at: {}\n---\n",
                publish_at.to_rfc3339()
            );
            let value = Value::String(front_matter);
            hooks.phase_complete("render", Some(value.clone()), vec![]).await?;
            acc.insert("render".to_string(), value);
        }

        if !skips(&resume, "release") {
            let manifest = json!({
                "channel": channel,
                "publish_at": publish_at.to_rfc3339(),
                "released": true,
            });
            hooks.phase_complete("release", Some(manifest.clone()), vec![]).await?;
            acc.insert("release".to_string(), manifest);
        }

        Ok(RunOutcome::success(acc))
    }

    async fn save_outputs(
        &self,
        job: &Job,
        outcome: &RunOutcome,
    ) -> Result<HashMap<String, PathBuf>, WorkflowError> {
        let mut saved = HashMap::new();
        if let Some(manifest) = outcome.outputs.get("release") {
            let path = write_artifact(
                &self.out_dir,
                &job.id,
                "release.json",
                serde_json::to_vec_pretty(manifest)
                    .map_err(|e| WorkflowError::Execution(e.to_string()))?
                    .as_slice(),
            )?;
            saved.insert("release".to_string(), path);
        }
        Ok(saved)
    }
}

#[cfg(test)]
#[path = "publish_tests.rs"]
mod tests;
