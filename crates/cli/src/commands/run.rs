// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-shot runner: run exactly one job and exit.

use crate::exit_error::ExitError;
use crate::setup::App;
use anyhow::Result;
use clap::Args;
use quill_engine::RunReport;
use std::io::Write;

#[derive(Args)]
pub struct RunArgs {
    /// Do not resume interrupted work, start fresh from the queue
    #[arg(long)]
    pub skip_resume: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub async fn handle(args: RunArgs) -> Result<()> {
    let app = App::load()?;
    if !args.yes && !confirm("Run the next eligible job now?")? {
        println!("Aborted.");
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runner = app.build_runner();
    runner.shutdown().register_signals();

    match runner.run_once(args.skip_resume).await {
        Ok(RunReport::Completed { id, .. }) => {
            println!("Job {id} completed");
            Ok(())
        }
        Ok(RunReport::Failed { id, error }) => {
            Err(ExitError::new(1, format!("job {id} failed: {error}")).into())
        }
        Ok(RunReport::NothingEligible) => {
            println!("Nothing eligible to run.");
            Ok(())
        }
        Ok(RunReport::BudgetPaused) => {
            println!("Budget exhausted; not starting new cost-bearing work.");
            Ok(())
        }
        Err(e) if runner.shutdown().is_requested() => {
            eprintln!("interrupted: {e}");
            Err(ExitError::interrupted().into())
        }
        Err(e) => Err(ExitError::new(1, e.to_string()).into()),
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
