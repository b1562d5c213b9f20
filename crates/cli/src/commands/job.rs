// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-job administrative actions.

use crate::setup::App;
use anyhow::{bail, Result};
use quill_core::{JobId, Priority};
use quill_storage::Queue;

/// Resolve a job ID or unique prefix against the queue.
pub fn resolve(queue: &Queue, needle: &str) -> Result<JobId> {
    let matches: Vec<&JobId> = queue
        .jobs
        .iter()
        .filter(|j| j.id.as_str() == needle || j.id.as_str().starts_with(needle) || j.id.suffix().starts_with(needle))
        .map(|j| &j.id)
        .collect();
    match matches.as_slice() {
        [] => bail!("no job matches {needle:?}"),
        [id] => Ok((*id).clone()),
        many => bail!(
            "ambiguous job id {needle:?} matches {} jobs: {}",
            many.len(),
            many.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
        ),
    }
}

pub fn reorder(needle: &str, priority: &str) -> Result<()> {
    let app = App::load()?;
    let priority: Priority = match priority.parse() {
        Ok(priority) => priority,
        Err(e) => bail!(e),
    };
    let id = resolve(&app.queue.load(), needle)?;
    app.queue.reorder(&id, priority)?;
    println!("Set {id} to {priority}");
    Ok(())
}

pub fn pause(needle: &str) -> Result<()> {
    let app = App::load()?;
    let id = resolve(&app.queue.load(), needle)?;
    app.queue.pause(&id)?;
    println!("Paused {id}");
    Ok(())
}

pub fn resume(needle: &str) -> Result<()> {
    let app = App::load()?;
    let id = resolve(&app.queue.load(), needle)?;
    app.queue.resume(&id)?;
    println!("Resumed {id}");
    Ok(())
}
