// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and lifecycle state machine.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a queued job.
    ///
    /// Assigned at `add` time and stable for the job's whole life; referenced
    /// by checkpoints, incremental state files, and logs.
    pub struct JobId("job-");
}

/// Job priority, ordered lowest to most urgent.
///
/// Variant order matters: `Ord` is derived and the scheduler picks the
/// maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

crate::simple_display! {
    Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Lifecycle status of a job.
///
/// Status is overwritten on transition; no history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Job-type-specific payload, discriminated by `kind`.
///
/// The discriminator doubles as the workflow-registry key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Literature research on a topic, driven by a list of questions.
    Research { topic: String, questions: Vec<String> },
    /// Editing pass over an existing draft, driven by a free-form query.
    Revision { query: String },
    /// Scheduled publication of a finished piece.
    Publish { publish_at: DateTime<Utc>, channel: String },
}

impl JobPayload {
    /// The job-type discriminator string.
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::Research { .. } => "research",
            JobPayload::Revision { .. } => "revision",
            JobPayload::Publish { .. } => "publish",
        }
    }

    /// Short human-readable summary for list output.
    pub fn summary(&self) -> String {
        match self {
            JobPayload::Research { topic, .. } => topic.clone(),
            JobPayload::Revision { query } => query.clone(),
            JobPayload::Publish { channel, publish_at } => {
                format!("{channel} @ {}", publish_at.format("%Y-%m-%d %H:%M"))
            }
        }
    }
}

/// Parameters for creating a new job
#[derive(Debug, Clone)]
pub struct JobDraft {
    pub payload: JobPayload,
    pub category: String,
    pub priority: Priority,
    pub quality: String,
}

impl JobDraft {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            payload,
            category: String::new(),
            priority: Priority::Normal,
            quality: "standard".to_string(),
        }
    }

    crate::setters! {
        into {
            category: String,
            quality: String,
        }
        set {
            priority: Priority,
        }
    }
}

/// One unit of queued, potentially long-running work.
///
/// Owned by the queue store and mutated only under its lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(flatten)]
    pub payload: JobPayload,
    pub category: String,
    pub priority: Priority,
    pub status: JobStatus,
    /// Opaque quality tier, passed through to the workflow.
    pub quality: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Display mirror of the current checkpoint phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Job {
    /// Create a pending job from a draft.
    pub fn new(draft: JobDraft, clock: &impl Clock) -> Self {
        Self {
            id: JobId::new(),
            payload: draft.payload,
            category: draft.category,
            priority: draft.priority,
            status: JobStatus::Pending,
            quality: draft.quality,
            created_at: clock.now_utc(),
            started_at: None,
            completed_at: None,
            error: None,
            phase: None,
        }
    }

    /// The job-type discriminator string.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            category: String = "essays",
            quality: String = "standard",
        }
        set {
            id: JobId = JobId::new(),
            payload: JobPayload = JobPayload::Research {
                topic: "test topic".to_string(),
                questions: vec!["q1".to_string()],
            },
            priority: Priority = Priority::Normal,
            status: JobStatus = JobStatus::Pending,
            created_at: chrono::DateTime<chrono::Utc> = chrono::DateTime::UNIX_EPOCH,
        }
        option {
            started_at: chrono::DateTime<chrono::Utc> = None,
            completed_at: chrono::DateTime<chrono::Utc> = None,
            error: String = None,
            phase: String = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
