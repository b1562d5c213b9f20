// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Editing pass over an existing draft, driven by a free-form query.

use super::{as_text, skips, write_artifact};
use crate::model::{CompletionRequest, ModelClient};
use async_trait::async_trait;
use quill_core::{Job, JobPayload};
use quill_engine::{PhaseHooks, ResumePlan, RunOutcome, Workflow, WorkflowError};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PHASES: &[&str] = &["review", "apply"];

pub struct RevisionWorkflow {
    model: Arc<dyn ModelClient>,
    out_dir: PathBuf,
}

impl RevisionWorkflow {
    pub fn new(model: Arc<dyn ModelClient>, out_dir: &Path) -> Self {
        Self { model, out_dir: out_dir.to_path_buf() }
    }
}

#[async_trait]
impl Workflow for RevisionWorkflow {
    fn kind(&self) -> &'static str {
        "revision"
    }

    fn phases(&self) -> &'static [&'static str] {
        PHASES
    }

    async fn run(
        &self,
        job: &Job,
        hooks: &dyn PhaseHooks,
        resume: Option<ResumePlan>,
    ) -> Result<RunOutcome, WorkflowError> {
        let JobPayload::Revision { query } = &job.payload else {
            return Err(WorkflowError::Execution(
                "revision workflow received a non-revision payload".to_string(),
            ));
        };
        let mut acc: HashMap<String, Value> =
            resume.as_ref().map(|plan| plan.completed.clone()).unwrap_or_default();

        if !skips(&resume, "review") {
            let prompt = format!(
                "Review the piece described by this request and list concrete edits:\n{query}"
            );
            let notes = self
                .model
                .complete(CompletionRequest { prompt, quality: job.quality.clone() })
                .await?;
            let value = Value::String(notes);
            hooks.phase_complete("review", Some(value.clone()), vec![]).await?;
            acc.insert("review".to_string(), value);
        }

        if !skips(&resume, "apply") {
            let notes = acc.get("review").map(as_text).unwrap_or_default();
            let prompt = format!(
                "Apply these edits and return the full revised text:\n{notes}\n\nOriginal request: {query}"
            );
            let revised = self
                .model
                .complete(CompletionRequest { prompt, quality: job.quality.clone() })
                .await?;
            let value = Value::String(revised);
            hooks.phase_complete("apply", Some(value.clone()), vec![]).await?;
            acc.insert("apply".to_string(), value);
        }

        Ok(RunOutcome::success(acc))
    }

    async fn save_outputs(
        &self,
        job: &Job,
        outcome: &RunOutcome,
    ) -> Result<HashMap<String, PathBuf>, WorkflowError> {
        let mut saved = HashMap::new();
        if let Some(revised) = outcome.outputs.get("apply") {
            let path =
                write_artifact(&self.out_dir, &job.id, "revised.md", as_text(revised).as_bytes())?;
            saved.insert("revised".to_string(), path);
        }
        if let Some(notes) = outcome.outputs.get("review") {
            let path =
                write_artifact(&self.out_dir, &job.id, "notes.md", as_text(notes).as_bytes())?;
            saved.insert("notes".to_string(), path);
        }
        Ok(saved)
    }
}

#[cfg(test)]
#[path = "revision_tests.rs"]
mod tests;
