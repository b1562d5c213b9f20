// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Display helpers for list/status output.

use chrono::{DateTime, Utc};

/// Format elapsed seconds compactly (e.g., "5s", "2m", "1h", "3d").
pub fn format_elapsed(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

/// Format a timestamp as relative age against now.
pub fn format_time_ago(at: DateTime<Utc>) -> String {
    let elapsed = (Utc::now() - at).num_seconds().max(0) as u64;
    format_elapsed(elapsed)
}

/// Pad or truncate a cell to a fixed display width.
pub fn cell(text: &str, width: usize) -> String {
    let truncated: String = text.chars().take(width).collect();
    format!("{truncated:width$} ")
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
