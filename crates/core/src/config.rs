// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration file and state directory resolution.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine state directory")]
    NoStateDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Resolve state directory: QUILL_STATE_DIR > XDG_STATE_HOME/quill > ~/.local/state/quill
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("QUILL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("quill"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/quill"))
}

/// What to do when spending crosses the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// Stop admitting new cost-bearing jobs until the period rolls over.
    Pause,
    /// Keep running but stretch the stagger interval.
    Slowdown,
    /// Log a warning and carry on.
    Warn,
}

crate::simple_display! {
    BudgetPolicy {
        Pause => "pause",
        Slowdown => "slowdown",
        Warn => "warn",
    }
}

impl std::str::FromStr for BudgetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(BudgetPolicy::Pause),
            "slowdown" => Ok(BudgetPolicy::Slowdown),
            "warn" => Ok(BudgetPolicy::Warn),
            other => Err(format!("unknown budget policy: {other}")),
        }
    }
}

/// Monthly spending budget and the action taken when it is exceeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Monthly budget in USD.
    pub monthly_usd: f64,
    /// Action when usage reaches 100% of budget.
    pub on_exceeded: BudgetPolicy,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self { monthly_usd: 100.0, on_exceeded: BudgetPolicy::Pause }
    }
}

/// Pacing knobs for the runner loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Idle poll interval when nothing is eligible, in seconds.
    pub poll_interval_secs: u64,
    /// Backoff between budget re-checks while paused, in seconds.
    pub budget_retry_secs: u64,
    /// Base stagger between successive job starts, in hours. The budget
    /// tracker scales this adaptively.
    pub base_stagger_hours: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 300, budget_retry_secs: 3600, base_stagger_hours: 24.0 }
    }
}

/// Top-level configuration, stored as `config.toml` in the state directory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project identifier used for cost aggregation.
    pub project: String,
    pub budget: BudgetConfig,
    pub pacing: PacingConfig,
    /// Authoritative category list. The queue keeps a cached copy which the
    /// scheduler re-derives from here on every selection.
    pub categories: Vec<String>,
    /// Base URL of the usage/billing API.
    pub usage_api_url: String,
    /// Base URL of the text-model API.
    pub model_api_url: String,
}

impl Config {
    /// Load configuration from `config.toml` under `dir`, falling back to
    /// defaults when the file does not exist.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Persist configuration to `config.toml` under `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(dir)?;
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(dir.join("config.toml"), raw)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
