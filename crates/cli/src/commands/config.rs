// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Show and change configuration.

use crate::setup::App;
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use quill_core::{BudgetPolicy, ConcurrencyPolicy};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the active configuration
    Show,
    /// Switch concurrency mode (exactly one flag)
    SetPolicy {
        /// Allow at most N jobs in progress
        #[arg(long, conflicts_with = "stagger_hours")]
        max_concurrent: Option<usize>,
        /// Require N hours between job starts
        #[arg(long)]
        stagger_hours: Option<f64>,
    },
    /// Change the monthly budget
    SetBudget {
        /// Monthly budget in USD
        #[arg(long)]
        monthly_usd: Option<f64>,
        /// Action at 100%: pause, slowdown, warn
        #[arg(long)]
        on_exceeded: Option<String>,
    },
    /// Replace the category list
    SetCategories {
        #[arg(required = true)]
        categories: Vec<String>,
    },
    /// Set the project identifier used for cost aggregation
    SetProject { project: String },
}

pub fn handle(args: ConfigArgs) -> Result<()> {
    let app = App::load()?;
    match args.command {
        ConfigCommand::Show => {
            let queue = app.queue.load();
            println!("state dir:   {}", app.state_dir.display());
            println!("project:     {}", app.config.project);
            println!(
                "budget:      ${:.2}/month, on exceeded: {}",
                app.config.budget.monthly_usd, app.config.budget.on_exceeded
            );
            match queue.policy {
                ConcurrencyPolicy::MaxConcurrent { limit } => {
                    println!("policy:      max_concurrent = {limit}");
                }
                ConcurrencyPolicy::StaggerHours { hours } => {
                    println!("policy:      stagger_hours = {hours}");
                }
            }
            println!("categories:  {}", app.config.categories.join(", "));
            println!(
                "pacing:      poll {}s, budget retry {}s, base stagger {}h",
                app.config.pacing.poll_interval_secs,
                app.config.pacing.budget_retry_secs,
                app.config.pacing.base_stagger_hours
            );
            Ok(())
        }
        ConfigCommand::SetPolicy { max_concurrent, stagger_hours } => {
            let policy = match (max_concurrent, stagger_hours) {
                (Some(limit), None) => ConcurrencyPolicy::MaxConcurrent { limit },
                (None, Some(hours)) => ConcurrencyPolicy::StaggerHours { hours },
                _ => bail!("pass exactly one of --max-concurrent or --stagger-hours"),
            };
            app.queue.set_policy(policy.clone())?;
            println!("Concurrency policy set to {policy}");
            Ok(())
        }
        ConfigCommand::SetBudget { monthly_usd, on_exceeded } => {
            if monthly_usd.is_none() && on_exceeded.is_none() {
                bail!("pass --monthly-usd and/or --on-exceeded");
            }
            let mut config = app.config.clone();
            if let Some(usd) = monthly_usd {
                config.budget.monthly_usd = usd;
            }
            if let Some(action) = on_exceeded {
                config.budget.on_exceeded = match action.parse::<BudgetPolicy>() {
                    Ok(policy) => policy,
                    Err(e) => bail!(e),
                };
            }
            config.save(&app.state_dir)?;
            println!(
                "Budget set to ${:.2}/month, on exceeded: {}",
                config.budget.monthly_usd, config.budget.on_exceeded
            );
            Ok(())
        }
        ConfigCommand::SetCategories { categories } => {
            let mut config = app.config.clone();
            config.categories = categories.clone();
            config.save(&app.state_dir)?;
            app.queue.set_categories(categories.clone())?;
            println!("Categories set to {}", categories.join(", "));
            Ok(())
        }
        ConfigCommand::SetProject { project } => {
            let mut config = app.config.clone();
            config.project = project.clone();
            config.save(&app.state_dir)?;
            println!("Project set to {project}");
            Ok(())
        }
    }
}
