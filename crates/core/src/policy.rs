// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrency policy for spacing successive job starts.

use serde::{Deserialize, Serialize};

/// How the scheduler gates new job starts against in-progress work.
///
/// Exactly one mode is active at a time; switching is an explicit
/// `config set-policy` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// At most `limit` jobs in progress at once.
    MaxConcurrent { limit: usize },
    /// A new job may start only `hours` after the most recent start.
    StaggerHours { hours: f64 },
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        ConcurrencyPolicy::MaxConcurrent { limit: 1 }
    }
}

crate::simple_display! {
    ConcurrencyPolicy {
        MaxConcurrent { .. } => "max_concurrent",
        StaggerHours { .. } => "stagger_hours",
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
