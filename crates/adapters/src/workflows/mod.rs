// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in workflow implementations for the three job kinds.

pub mod publish;
pub mod research;
pub mod revision;

pub use publish::PublishWorkflow;
pub use research::ResearchWorkflow;
pub use revision::RevisionWorkflow;

use crate::model::ModelClient;
use quill_engine::{ResumePlan, WorkflowError, WorkflowRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Registry with every built-in workflow registered.
pub fn builtin_registry(model: Arc<dyn ModelClient>, out_dir: &Path) -> WorkflowRegistry {
    let mut registry = WorkflowRegistry::new();
    registry.register(Arc::new(ResearchWorkflow::new(model.clone(), out_dir)));
    registry.register(Arc::new(RevisionWorkflow::new(model, out_dir)));
    registry.register(Arc::new(PublishWorkflow::new(out_dir)));
    registry
}

pub(crate) fn skips(resume: &Option<ResumePlan>, phase: &str) -> bool {
    resume.as_ref().is_some_and(|plan| plan.skips(phase))
}

/// Write one artifact under `{out_dir}/{job_id}/{name}`.
pub(crate) fn write_artifact(
    out_dir: &Path,
    job_id: &str,
    name: &str,
    content: &[u8],
) -> Result<PathBuf, WorkflowError> {
    let dir = out_dir.join(job_id);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Render a phase output as text for the next prompt or artifact.
pub(crate) fn as_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
