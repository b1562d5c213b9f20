// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level CLI specs.
//!
//! Each spec drives the real `quill` binary against a throwaway state
//! directory via `QUILL_STATE_DIR`. Serialized because the binary reads
//! process-wide environment.

use assert_cmd::Command;
use serial_test::serial;

struct Workspace {
    dir: tempfile::TempDir,
}

struct Run {
    stdout: String,
    stderr: String,
    success: bool,
}

impl Run {
    fn passes(self) -> Self {
        assert!(self.success, "command failed\nstdout: {}\nstderr: {}", self.stdout, self.stderr);
        self
    }

    fn fails(self) -> Self {
        assert!(!self.success, "command unexpectedly passed\nstdout: {}", self.stdout);
        self
    }

    fn stdout_has(self, needle: &str) -> Self {
        assert!(
            self.stdout.contains(needle),
            "stdout missing {needle:?}\nstdout: {}\nstderr: {}",
            self.stdout,
            self.stderr
        );
        self
    }

    fn stderr_has(self, needle: &str) -> Self {
        assert!(
            self.stderr.contains(needle),
            "stderr missing {needle:?}\nstdout: {}\nstderr: {}",
            self.stdout,
            self.stderr
        );
        self
    }
}

impl Workspace {
    fn new() -> Self {
        Self { dir: tempfile::tempdir().expect("temp state dir") }
    }

    fn quill(&self, args: &[&str]) -> Run {
        let mut cmd = Command::cargo_bin("quill").expect("quill binary");
        cmd.env("QUILL_STATE_DIR", self.dir.path());
        let output = cmd.args(args).output().expect("spawn quill");
        Run {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        }
    }

    fn queue_json(&self) -> serde_json::Value {
        let raw = std::fs::read(self.dir.path().join("queue.json")).expect("queue.json");
        serde_json::from_slice(&raw).expect("valid queue json")
    }
}

#[test]
#[serial]
fn help_shows_usage() {
    Workspace::new().quill(&["--help"]).passes().stdout_has("Usage:");
}

#[test]
#[serial]
fn add_research_then_list_shows_it() {
    let ws = Workspace::new();
    ws.quill(&[
        "add",
        "research",
        "--topic",
        "memory and place",
        "--question",
        "what makes a place memorable?",
        "--category",
        "essays",
        "--priority",
        "high",
    ])
    .passes()
    .stdout_has("Queued research job");

    ws.quill(&["list"])
        .passes()
        .stdout_has("research")
        .stdout_has("essays")
        .stdout_has("memory and place");

    let queue = ws.queue_json();
    assert_eq!(queue["jobs"].as_array().expect("jobs array").len(), 1);
    assert_eq!(queue["jobs"][0]["kind"], "research");
    assert_eq!(queue["jobs"][0]["status"], "pending");
    assert_eq!(queue["jobs"][0]["priority"], "high");
}

#[test]
#[serial]
fn add_publish_requires_rfc3339_timestamp() {
    let ws = Workspace::new();
    ws.quill(&["add", "publish", "--at", "tomorrow-ish", "--channel", "blog"])
        .fails()
        .stderr_has("RFC 3339");

    ws.quill(&["add", "publish", "--at", "2026-09-01T08:00:00Z", "--channel", "blog"])
        .passes()
        .stdout_has("Queued publish job");
}

#[test]
#[serial]
fn config_set_policy_round_trips() {
    let ws = Workspace::new();
    ws.quill(&["config", "set-policy", "--stagger-hours", "36"]).passes();

    ws.quill(&["config", "show"]).passes().stdout_has("stagger_hours = 36");

    let queue = ws.queue_json();
    assert_eq!(queue["policy"]["mode"], "stagger_hours");
    assert_eq!(queue["policy"]["hours"], 36.0);
}

#[test]
#[serial]
fn config_set_policy_rejects_both_flags() {
    Workspace::new()
        .quill(&["config", "set-policy", "--stagger-hours", "36", "--max-concurrent", "2"])
        .fails();
}

#[test]
#[serial]
fn pause_resume_and_reorder_by_prefix() {
    let ws = Workspace::new();
    ws.quill(&["add", "revision", "--query", "tighten the intro"]).passes();
    let id = ws.queue_json()["jobs"][0]["id"].as_str().expect("job id").to_string();
    let prefix: String = id.chars().take(8).collect();

    ws.quill(&["pause", &prefix]).passes();
    assert_eq!(ws.queue_json()["jobs"][0]["status"], "paused");

    ws.quill(&["resume", &prefix]).passes();
    assert_eq!(ws.queue_json()["jobs"][0]["status"], "pending");

    ws.quill(&["reorder", &prefix, "urgent"]).passes();
    assert_eq!(ws.queue_json()["jobs"][0]["priority"], "urgent");
}

#[test]
#[serial]
fn unknown_job_prefix_fails() {
    Workspace::new().quill(&["pause", "job-nope"]).fails().stderr_has("no job matches");
}

#[test]
#[serial]
fn status_reports_empty_queue_and_budget() {
    Workspace::new()
        .quill(&["status"])
        .passes()
        .stdout_has("0 pending")
        .stdout_has("No work in flight")
        .stdout_has("Budget:");
}

#[test]
#[serial]
fn run_on_empty_queue_is_a_no_op() {
    Workspace::new().quill(&["run", "-y"]).passes().stdout_has("Nothing eligible");
}

#[test]
#[serial]
fn stop_without_daemon_is_a_no_op() {
    Workspace::new().quill(&["stop"]).passes().stdout_has("Daemon not running");
}

#[test]
#[serial]
fn categories_flow_from_config_to_queue() {
    let ws = Workspace::new();
    ws.quill(&["config", "set-categories", "essays", "reviews", "letters"]).passes();

    let queue = ws.queue_json();
    let categories: Vec<&str> = queue["categories"]
        .as_array()
        .expect("categories array")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(categories, vec!["essays", "reviews", "letters"]);
}
