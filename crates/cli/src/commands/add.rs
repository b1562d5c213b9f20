// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue new jobs.

use crate::setup::App;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use quill_core::{Job, JobDraft, JobPayload, Priority, SystemClock};

#[derive(Args)]
pub struct AddArgs {
    #[command(subcommand)]
    pub command: AddCommand,

    /// Category the job belongs to (defaults to the first configured one)
    #[arg(long, global = true)]
    pub category: Option<String>,

    /// Priority: low, normal, high, urgent
    #[arg(long, global = true, default_value = "normal")]
    pub priority: String,

    /// Quality tier passed through to the workflow
    #[arg(long, global = true, default_value = "standard")]
    pub quality: String,
}

#[derive(Subcommand)]
pub enum AddCommand {
    /// Research a topic, driven by a list of questions
    Research {
        /// Essay topic
        #[arg(long)]
        topic: String,
        /// Research question (repeat for several)
        #[arg(long = "question", required = true)]
        questions: Vec<String>,
    },
    /// Editing pass over an existing draft
    Revision {
        /// What to change
        #[arg(long)]
        query: String,
    },
    /// Scheduled publication
    Publish {
        /// Publication time, RFC 3339 (e.g. 2026-09-01T08:00:00Z)
        #[arg(long)]
        at: String,
        /// Destination channel
        #[arg(long)]
        channel: String,
    },
}

pub async fn handle(args: AddArgs) -> Result<()> {
    let app = App::load()?;

    let payload = match args.command {
        AddCommand::Research { topic, questions } => JobPayload::Research { topic, questions },
        AddCommand::Revision { query } => JobPayload::Revision { query },
        AddCommand::Publish { at, channel } => {
            let publish_at: DateTime<Utc> = at
                .parse()
                .with_context(|| format!("invalid --at timestamp {at:?}, expected RFC 3339"))?;
            JobPayload::Publish { publish_at, channel }
        }
    };
    let priority: Priority = match args.priority.parse() {
        Ok(priority) => priority,
        Err(e) => bail!(e),
    };
    let category = args
        .category
        .or_else(|| app.config.categories.first().cloned())
        .unwrap_or_else(|| "general".to_string());

    let draft = JobDraft::new(payload)
        .category(category)
        .quality(args.quality)
        .priority(priority);
    let job = Job::new(draft, &SystemClock);
    let kind = job.kind();
    let id = app.queue.add(job)?;
    println!("Queued {kind} job {id}");
    Ok(())
}
