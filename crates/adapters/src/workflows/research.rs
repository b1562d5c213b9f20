// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Literature research: gather per-question notes, synthesize an outline,
//! draft, polish.
//!
//! `gather` is the long iterative phase: it answers one question per model
//! call and snapshots its answers every few iterations so a crash mid-phase
//! loses at most one checkpoint interval of work.

use super::{as_text, skips, write_artifact};
use crate::model::{CompletionRequest, ModelClient};
use async_trait::async_trait;
use quill_core::{Job, JobPayload};
use quill_engine::{PhaseHooks, ResumePlan, RunOutcome, Workflow, WorkflowError};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Iterations between mid-phase snapshots in `gather`.
const GATHER_INTERVAL: u64 = 5;

const PHASES: &[&str] = &["gather", "synthesize", "draft", "polish"];

pub struct ResearchWorkflow {
    model: Arc<dyn ModelClient>,
    out_dir: PathBuf,
}

impl ResearchWorkflow {
    pub fn new(model: Arc<dyn ModelClient>, out_dir: &Path) -> Self {
        Self { model, out_dir: out_dir.to_path_buf() }
    }

    async fn complete(&self, prompt: String, quality: &str) -> Result<String, WorkflowError> {
        Ok(self
            .model
            .complete(CompletionRequest { prompt, quality: quality.to_string() })
            .await?)
    }
}

#[async_trait]
impl Workflow for ResearchWorkflow {
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
        resume: Option<ResumePlan>,
    ) -> Result<RunOutcome, WorkflowError> {
        let JobPayload::Research { topic, questions } = &job.payload else {
            return Err(WorkflowError::Execution(
                "research workflow received a non-research payload".to_string(),
            ));
        };
        let mut acc: HashMap<String, Value> =
            resume.as_ref().map(|plan| plan.completed.clone()).unwrap_or_default();
        let mut unanswered = 0usize;

        if !skips(&resume, "gather") {
            let mut answers = serde_json::Map::new();
            let mut next_index = 0usize;
            if let Some(snapshot) = hooks.load_progress("gather").await {
                info!(
                    job_id = %hooks.run().job_id,
                    iteration = snapshot.iteration,
                    "resuming gather from mid-phase snapshot"
                );
                next_index = snapshot.iteration as usize;
                answers.extend(snapshot.partial);
            }

            for (index, question) in questions.iter().enumerate().skip(next_index) {
                let prompt = format!(
                    "You are researching an essay on {topic:?}.\n\
                     Answer the following question with cited sources:\n{question}"
                );
                match self
                    .model
                    .complete(CompletionRequest { prompt, quality: job.quality.clone() })
                    .await
                {
                    Ok(answer) => {
                        answers.insert(format!("q{index}"), Value::String(answer));
                    }
                    Err(e) => {
                        warn!(job_id = %hooks.run().job_id, %question, error = %e, "question unanswered");
                        unanswered += 1;
                    }
                }
                let done = (index + 1) as u64;
                if done % GATHER_INTERVAL == 0 {
                    hooks
                        .save_progress(
                            "gather",
                            done,
                            GATHER_INTERVAL,
                            answers.clone().into_iter().collect(),
                        )
                        .await?;
                }
            }

            if answers.is_empty() {
                return Ok(RunOutcome::failed("no research question could be answered"));
            }
            let value = Value::Object(answers);
            let answered = (questions.len() - unanswered) as u64;
            hooks
                .phase_complete(
                    "gather",
                    Some(value.clone()),
                    vec![("questions_answered".to_string(), answered)],
                )
                .await?;
            acc.insert("gather".to_string(), value);
        }

        if !skips(&resume, "synthesize") {
            let notes = acc.get("gather").map(as_text).unwrap_or_default();
            let prompt = format!(
                "Synthesize a structured outline for an essay on {topic:?} from these research notes:\n{notes}"
            );
            let outline = self.complete(prompt, &job.quality).await?;
            let value = Value::String(outline);
            hooks.phase_complete("synthesize", Some(value.clone()), vec![]).await?;
            acc.insert("synthesize".to_string(), value);
        }

        if !skips(&resume, "draft") {
            let outline = acc.get("synthesize").map(as_text).unwrap_or_default();
            let prompt =
                format!("Write a full essay draft on {topic:?} following this outline:\n{outline}");
            let draft = self.complete(prompt, &job.quality).await?;
            let value = Value::String(draft);
            hooks.phase_complete("draft", Some(value.clone()), vec![]).await?;
            acc.insert("draft".to_string(), value);
        }

        if !skips(&resume, "polish") {
            let draft = acc.get("draft").map(as_text).unwrap_or_default();
            let prompt = format!(
                "Edit this essay for clarity and flow, preserving its structure:\n{draft}"
            );
            let polished = self.complete(prompt, &job.quality).await?;
            let value = Value::String(polished);
            hooks.phase_complete("polish", Some(value.clone()), vec![]).await?;
            acc.insert("polish".to_string(), value);
        }

        if unanswered > 0 {
            Ok(RunOutcome::partial(acc, format!("{unanswered} research questions unanswered")))
        } else {
            Ok(RunOutcome::success(acc))
        }
    }

    async fn save_outputs(
        &self,
        job: &Job,
        outcome: &RunOutcome,
    ) -> Result<HashMap<String, PathBuf>, WorkflowError> {
        let mut saved = HashMap::new();
        if let Some(polished) = outcome.outputs.get("polish") {
            let path =
                write_artifact(&self.out_dir, &job.id, "essay.md", as_text(polished).as_bytes())?;
            saved.insert("essay".to_string(), path);
        }
        if let Some(notes) = outcome.outputs.get("gather") {
            let path = write_artifact(
                &self.out_dir,
                &job.id,
                "sources.json",
                serde_json::to_vec_pretty(notes)
                    .map_err(|e| WorkflowError::Execution(e.to_string()))?
                    .as_slice(),
            )?;
            saved.insert("sources".to_string(), path);
        }
        Ok(saved)
    }
}

#[cfg(test)]
#[path = "research_tests.rs"]
mod tests;
