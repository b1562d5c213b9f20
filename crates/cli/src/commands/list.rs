// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue listing.

use crate::output::{cell, format_time_ago};
use crate::setup::App;
use anyhow::Result;
use clap::Args;
use quill_core::JobStatus;

#[derive(Args)]
pub struct ListArgs {
    /// Include completed and failed jobs
    #[arg(long)]
    pub all: bool,
}

pub fn handle(args: ListArgs) -> Result<()> {
    let app = App::load()?;
    // Display-only unlocked read
    let queue = app.queue.load();

    let jobs: Vec<_> = queue
        .jobs
        .iter()
        .filter(|j| args.all || !j.is_terminal())
        .collect();
    if jobs.is_empty() {
        println!("No jobs queued. Add one with `quill add`.");
        return Ok(());
    }

    print!("{}", cell("ID", 14));
    print!("{}", cell("KIND", 9));
    print!("{}", cell("CATEGORY", 12));
    print!("{}", cell("PRIORITY", 9));
    print!("{}", cell("STATUS", 12));
    print!("{}", cell("PHASE", 11));
    print!("{}", cell("AGE", 5));
    println!("SUMMARY");
    for job in jobs {
        let status = match job.status {
            JobStatus::Failed => {
                format!("failed: {}", job.error.as_deref().unwrap_or("?"))
            }
            other => other.to_string(),
        };
        print!("{}", cell(job.id.short(10), 14));
        print!("{}", cell(job.kind(), 9));
        print!("{}", cell(&job.category, 12));
        print!("{}", cell(&job.priority.to_string(), 9));
        print!("{}", cell(&status, 12));
        print!("{}", cell(job.phase.as_deref().unwrap_or("-"), 11));
        print!("{}", cell(&format_time_ago(job.created_at), 5));
        println!("{}", job.payload.summary());
    }
    Ok(())
}
