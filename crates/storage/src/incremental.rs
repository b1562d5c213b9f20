// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental state store: compressed, delta-based mid-phase progress.
//!
//! Layered on top of the coarse checkpoint for long iterative phases.
//! One gzip-compressed JSON file per job id, written every K iterations
//! inside a phase and cleared when the phase completes. `partial` holds
//! deltas (newly produced items), not the full corpus; reconstruction on
//! resume is the workflow's job, using the checkpoint's phase outputs as
//! the base.

use crate::fsio;
use crate::paths;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use quill_core::JobId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum IncrementalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Mid-phase progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalState {
    pub job_id: JobId,
    pub phase: String,
    pub iteration: u64,
    /// Checkpoint interval in iterations. Diagnostic only.
    pub interval: u64,
    /// Delta results since the last coarse checkpoint, keyed by item name.
    #[serde(default)]
    pub partial: HashMap<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// One compressed file per job id under `incremental/`.
#[derive(Debug, Clone)]
pub struct IncrementalStore {
    root: PathBuf,
}

impl IncrementalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, job_id: &JobId) -> PathBuf {
        paths::incremental_dir(&self.root).join(format!("{job_id}.json.gz"))
    }

    /// Persist a mid-phase snapshot, replacing any prior one for the job.
    pub fn save(&self, state: &IncrementalState) -> Result<(), IncrementalError> {
        let json = serde_json::to_vec(state)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;
        fsio::write_atomic(&self.path(&state.job_id), &compressed)?;
        Ok(())
    }

    /// Load the snapshot for a job.
    ///
    /// When `phase` is given and does not match the recorded phase, the
    /// coarse checkpoint has already moved on and the snapshot is stale:
    /// returns `None`. Unreadable files also return `None` (fail-open,
    /// quarantined aside).
    pub fn load(&self, job_id: &JobId, phase: Option<&str>) -> Option<IncrementalState> {
        let path = self.path(job_id);
        let raw = std::fs::read(&path).ok()?;

        let mut json = Vec::new();
        if let Err(e) = GzDecoder::new(raw.as_slice()).read_to_end(&mut json) {
            warn!(path = %path.display(), error = %e, "corrupt incremental state, quarantining");
            crate::fsio::quarantine(&path);
            return None;
        }
        let state = match serde_json::from_slice::<IncrementalState>(&json) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt incremental state, quarantining");
                crate::fsio::quarantine(&path);
                return None;
            }
        };
        match phase {
            Some(wanted) if state.phase != wanted => None,
            _ => Some(state),
        }
    }

    /// Remove the snapshot once its phase completes normally.
    pub fn clear(&self, job_id: &JobId) -> Result<(), IncrementalError> {
        match std::fs::remove_file(self.path(job_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "incremental_tests.rs"]
mod tests;
