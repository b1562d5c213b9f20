// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod add;
pub mod config;
pub mod daemon;
pub mod job;
pub mod list;
pub mod run;
pub mod status;

use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Queue a new job
    Add(add::AddArgs),
    /// List queued jobs
    List(list::ListArgs),
    /// Run the next eligible job and exit
    Run(run::RunArgs),
    /// Show queue, budget, and in-flight work
    Status,
    /// Show or change configuration
    Config(config::ConfigArgs),
    /// Run the job loop in the foreground
    Daemon,
    /// Start the job loop as a background daemon
    Start,
    /// Stop the background daemon
    Stop,
    /// Re-prioritize a pending job
    Reorder {
        /// Job ID (or prefix)
        job_id: String,
        /// New priority: low, normal, high, urgent
        priority: String,
    },
    /// Park a pending job so the scheduler skips it
    Pause {
        /// Job ID (or prefix)
        job_id: String,
    },
    /// Return a paused job to the pending pool
    Resume {
        /// Job ID (or prefix)
        job_id: String,
    },
}

pub async fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Add(args) => add::handle(args).await,
        Command::List(args) => list::handle(args),
        Command::Run(args) => run::handle(args).await,
        Command::Status => status::handle().await,
        Command::Config(args) => config::handle(args),
        Command::Daemon => daemon::run_foreground().await,
        Command::Start => daemon::start(),
        Command::Stop => daemon::stop(),
        Command::Reorder { job_id, priority } => job::reorder(&job_id, &priority),
        Command::Pause { job_id } => job::pause(&job_id),
        Command::Resume { job_id } => job::resume(&job_id),
    }
}
