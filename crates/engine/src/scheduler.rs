// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure job selection: concurrency gating plus category-fair rotation.

use chrono::{DateTime, Utc};
use quill_core::{ConcurrencyPolicy, Job, JobId};
use quill_storage::Queue;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Authoritative source of the category list, re-derived on every selection.
///
/// The queue only caches a copy; this is the truth.
pub trait CategorySource: Send + Sync {
    fn categories(&self) -> Vec<String>;
}

/// Fixed category list, e.g. from the config file.
pub struct StaticCategories(Vec<String>);

impl StaticCategories {
    pub fn new(categories: Vec<String>) -> Self {
        Self(categories)
    }
}

impl CategorySource for StaticCategories {
    fn categories(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Selects the next job to run. No side effects unless a selection is made,
/// in which case the queue's round-robin cursor advances; the caller
/// persists the queue afterwards.
#[derive(Clone)]
pub struct Scheduler {
    categories: Arc<dyn CategorySource>,
}

impl Scheduler {
    pub fn new(categories: Arc<dyn CategorySource>) -> Self {
        Self { categories }
    }

    /// Pick the next eligible job, if any.
    ///
    /// `bypass` is the set of job kinds flagged to ignore concurrency policy
    /// entirely, so schedule-sensitive jobs are never starved by a stagger
    /// window.
    pub fn select_next(
        &self,
        queue: &mut Queue,
        now: DateTime<Utc>,
        bypass: &HashSet<String>,
    ) -> Option<JobId> {
        // Bypass jobs short-circuit the policy gate and the rotation.
        if let Some(job) = best_of(queue.pending().filter(|j| bypass.contains(j.kind()))) {
            return Some(job.id.clone());
        }

        if !self.policy_allows(queue, now) {
            return None;
        }

        // Re-derive the authoritative category list.
        let fresh = self.categories.categories();
        if fresh != queue.categories {
            debug!(categories = ?fresh, "category list changed, refreshing queue copy");
            if queue.cursor.is_some_and(|c| c >= fresh.len()) {
                queue.cursor = None;
            }
            queue.categories = fresh;
        }

        // Round-robin walk starting after the last-selected category.
        let n = queue.categories.len();
        if n > 0 {
            let start = queue.cursor.map_or(0, |c| c + 1);
            for offset in 0..n {
                let idx = (start + offset) % n;
                let category = queue.categories[idx].clone();
                let found = best_of(queue.pending().filter(|j| j.category == category))
                    .map(|j| j.id.clone());
                if let Some(id) = found {
                    queue.cursor = Some(idx);
                    return Some(id);
                }
            }
        }

        // No listed category has pending work (e.g. every pending job's
        // category was removed from the authoritative list): fall back to
        // the globally best pending job without moving the cursor.
        best_of(queue.pending()).map(|j| j.id.clone())
    }

    fn policy_allows(&self, queue: &Queue, now: DateTime<Utc>) -> bool {
        match queue.policy {
            ConcurrencyPolicy::MaxConcurrent { limit } => queue.in_progress().count() < limit,
            ConcurrencyPolicy::StaggerHours { hours } => match queue.latest_start() {
                None => true,
                Some(latest) => {
                    let elapsed_hours = (now - latest).num_milliseconds() as f64 / 3_600_000.0;
                    elapsed_hours >= hours
                }
            },
        }
    }
}

/// Highest priority wins; ties break FIFO on creation time.
fn best_of<'a>(jobs: impl Iterator<Item = &'a Job>) -> Option<&'a Job> {
    jobs.max_by_key(|j| (j.priority, std::cmp::Reverse(j.created_at)))
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
