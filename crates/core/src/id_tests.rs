// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::job::JobId;

#[test]
fn new_ids_carry_prefix_and_are_unique() {
    let a = JobId::new();
    let b = JobId::new();
    assert!(a.as_str().starts_with("job-"));
    assert_ne!(a, b);
}

#[test]
fn suffix_strips_prefix() {
    let id = JobId::from_string("job-abc123");
    assert_eq!(id.suffix(), "abc123");
}

#[test]
fn short_truncates_suffix() {
    let id = JobId::from_string("job-abcdefgh");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(100), "abcdefgh");
}

#[test]
fn short_fn_truncates() {
    assert_eq!(super::short("abcdef", 3), "abc");
    assert_eq!(super::short("ab", 3), "ab");
}

#[test]
fn ids_compare_with_str() {
    let id = JobId::from_string("job-x");
    assert_eq!(id, "job-x");
    assert_eq!(id, *"job-x");
}

#[test]
fn serde_is_transparent() {
    let id = JobId::from_string("job-x");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"job-x\"");
    let back: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
