// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! quill: budget-aware runner for long writing and research jobs.

mod commands;
mod exit_error;
mod output;
mod setup;

use clap::Parser;

#[derive(Parser)]
#[command(name = "quill", version, about = "Queue and run long writing/research jobs")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = commands::dispatch(cli.command).await {
        if let Some(exit) = e.downcast_ref::<exit_error::ExitError>() {
            if !exit.message.is_empty() {
                eprintln!("{exit}");
            }
            std::process::exit(exit.code);
        }
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
