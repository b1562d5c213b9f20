// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted cost aggregation cache.
//!
//! One entry per billing period, refreshed from the usage API at most once
//! an hour. The cache exists so the budget tracker can always produce an
//! admission decision, even when the cost source is down.

use crate::fsio;
use crate::paths;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Most recent run ids kept per entry.
pub const MAX_TRACKED_RUN_IDS: usize = 100;

/// Entries older than this are refreshed.
pub fn cache_ttl() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Error)]
pub enum CostCacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Aggregated cost for one `{project}:{yyyy-mm}` period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub period: String,
    pub total_cost: f64,
    /// Token totals keyed by run name (the job kind).
    #[serde(default)]
    pub tokens_by_kind: HashMap<String, u64>,
    pub run_count: u64,
    pub last_aggregated: DateTime<Utc>,
    /// Bounded sample of included run ids, most recent last.
    #[serde(default)]
    pub run_ids: Vec<String>,
}

impl CostEntry {
    /// Whether this entry is still within its TTL.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.last_aggregated < cache_ttl()
    }
}

/// On-disk shape of `cost_cache.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostCache {
    #[serde(default)]
    pub periods: HashMap<String, CostEntry>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CostCacheStore {
    root: PathBuf,
}

impl CostCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self) -> PathBuf {
        paths::cost_cache_path(&self.root)
    }

    /// Fail-open read: missing or corrupt files yield an empty cache.
    pub fn load(&self) -> CostCache {
        fsio::read_json_or_quarantine(&self.path()).unwrap_or_default()
    }

    pub fn save(&self, cache: &CostCache) -> Result<(), CostCacheError> {
        let raw = serde_json::to_vec_pretty(cache)?;
        fsio::write_atomic(&self.path(), &raw)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "cost_cache_tests.rs"]
mod tests;
