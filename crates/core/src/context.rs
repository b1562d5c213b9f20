// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run context threaded through workflow execution.

use crate::job::JobId;

crate::define_id! {
    /// External run identifier, correlating a single workflow execution with
    /// cost records and traces. A resumed job gets a fresh run id.
    pub struct RunId("run-");
}

/// Explicit per-run context, passed into every call that needs it.
///
/// Replaces ambient task-local state so log routing and cost correlation
/// survive concurrent execution.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub job_id: JobId,
    pub run_id: RunId,
    pub kind: String,
}

impl RunContext {
    pub fn new(job_id: JobId, kind: impl Into<String>) -> Self {
        Self { job_id, run_id: RunId::new(), kind: kind.into() }
    }
}
