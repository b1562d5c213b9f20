// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use quill_core::{Job, JobPayload};

fn store() -> (tempfile::TempDir, QueueStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::new(dir.path());
    (dir, store)
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

#[test]
fn add_then_load_round_trips() {
    let (_dir, store) = store();
    let job = Job::builder().category("essays").build();
    let id = store.add(job).unwrap();

    let queue = store.load();
    assert_eq!(queue.version, QUEUE_SCHEMA_VERSION);
    assert_eq!(queue.jobs.len(), 1);
    assert_eq!(queue.jobs[0].id, id);
    assert_eq!(queue.jobs[0].status, JobStatus::Pending);
}

#[test]
fn mark_started_records_start_time() {
    let (_dir, store) = store();
    let id = store.add(Job::builder().build()).unwrap();
    store.mark_started(&id, at(100)).unwrap();

    let job = store.load().job(&id).cloned().unwrap();
    assert_eq!(job.status, JobStatus::InProgress);
    assert_eq!(job.started_at, Some(at(100)));
}

#[test]
fn mark_started_rejects_terminal_jobs() {
    let (_dir, store) = store();
    let id = store.add(Job::builder().build()).unwrap();
    store.mark_started(&id, at(100)).unwrap();
    store.mark_completed(&id, at(200)).unwrap();

    let err = store.mark_started(&id, at(300)).unwrap_err();
    assert!(matches!(err, QueueStoreError::InvalidTransition { .. }));
}

#[test]
fn mark_failed_records_error_and_clears_phase() {
    let (_dir, store) = store();
    let id = store.add(Job::builder().build()).unwrap();
    store.mark_started(&id, at(100)).unwrap();
    store.update_phase(&id, "gather").unwrap();
    store.mark_failed(&id, "model unavailable", at(200)).unwrap();

    let job = store.load().job(&id).cloned().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("model unavailable"));
    assert_eq!(job.phase, None);
    assert_eq!(job.completed_at, Some(at(200)));
}

#[test]
fn update_phase_mirrors_for_display() {
    let (_dir, store) = store();
    let id = store.add(Job::builder().build()).unwrap();
    store.update_phase(&id, "synthesize").unwrap();
    assert_eq!(store.load().job(&id).unwrap().phase.as_deref(), Some("synthesize"));
}

#[test]
fn missing_job_is_an_error() {
    let (_dir, store) = store();
    let ghost = JobId::from_string("job-ghost");
    assert!(matches!(
        store.mark_started(&ghost, at(1)),
        Err(QueueStoreError::JobNotFound(id)) if id == ghost
    ));
}

#[test]
fn pause_and_resume_round_trip() {
    let (_dir, store) = store();
    let id = store.add(Job::builder().build()).unwrap();
    store.pause(&id).unwrap();
    assert_eq!(store.load().job(&id).unwrap().status, JobStatus::Paused);
    store.resume(&id).unwrap();
    assert_eq!(store.load().job(&id).unwrap().status, JobStatus::Pending);
}

#[test]
fn pause_requires_pending() {
    let (_dir, store) = store();
    let id = store.add(Job::builder().build()).unwrap();
    store.mark_started(&id, at(1)).unwrap();
    assert!(matches!(store.pause(&id), Err(QueueStoreError::InvalidTransition { .. })));
}

#[test]
fn reorder_changes_priority() {
    let (_dir, store) = store();
    let id = store.add(Job::builder().build()).unwrap();
    store.reorder(&id, Priority::Urgent).unwrap();
    assert_eq!(store.load().job(&id).unwrap().priority, Priority::Urgent);
}

#[test]
fn set_categories_resets_out_of_range_cursor() {
    let (_dir, store) = store();
    store
        .set_categories(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        .unwrap();
    store
        .with_lock(|queue| {
            queue.cursor = Some(2);
            Ok(())
        })
        .unwrap();

    store.set_categories(vec!["a".to_string()]).unwrap();
    let queue = store.load();
    assert_eq!(queue.categories, vec!["a".to_string()]);
    assert_eq!(queue.cursor, None);
}

#[test]
fn set_policy_switches_mode() {
    let (_dir, store) = store();
    store.set_policy(ConcurrencyPolicy::StaggerHours { hours: 36.0 }).unwrap();
    assert_eq!(store.load().policy, ConcurrencyPolicy::StaggerHours { hours: 36.0 });
}

#[test]
fn corrupt_queue_fails_open_to_empty() {
    let (dir, store) = store();
    store.add(Job::builder().build()).unwrap();
    std::fs::write(dir.path().join("queue.json"), b"{broken").unwrap();

    let queue = store.load();
    assert!(queue.jobs.is_empty());
    assert!(dir.path().join("queue.bak").exists());
}

#[test]
fn latest_start_picks_most_recent() {
    let mut queue = Queue::default();
    queue.jobs.push(
        Job::builder().status(JobStatus::InProgress).started_at(at(100)).build(),
    );
    queue.jobs.push(
        Job::builder().status(JobStatus::InProgress).started_at(at(500)).build(),
    );
    queue.jobs.push(Job::builder().status(JobStatus::Pending).build());
    assert_eq!(queue.latest_start(), Some(at(500)));
}

#[test]
fn with_lock_error_does_not_persist() {
    let (_dir, store) = store();
    let id = store.add(Job::builder().build()).unwrap();
    let result: Result<(), QueueStoreError> = store.with_lock(|queue| {
        queue.jobs.clear();
        Err(QueueStoreError::JobNotFound(id.clone()))
    });
    assert!(result.is_err());
    assert_eq!(store.load().jobs.len(), 1);
}

#[test]
fn payload_kind_survives_persistence() {
    let (_dir, store) = store();
    let job = Job::builder()
        .payload(JobPayload::Revision { query: "trim section 2".to_string() })
        .build();
    let id = store.add(job).unwrap();
    assert_eq!(store.load().job(&id).unwrap().kind(), "revision");
}
