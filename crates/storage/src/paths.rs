// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed file layout under the queue root directory.

use std::path::{Path, PathBuf};

pub fn queue_path(root: &Path) -> PathBuf {
    root.join("queue.json")
}

pub fn queue_lock_path(root: &Path) -> PathBuf {
    root.join("queue.lock")
}

pub fn current_work_path(root: &Path) -> PathBuf {
    root.join("current_work.json")
}

pub fn cost_cache_path(root: &Path) -> PathBuf {
    root.join("cost_cache.json")
}

pub fn incremental_dir(root: &Path) -> PathBuf {
    root.join("incremental")
}

pub fn logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}

pub fn daemon_pid_path(root: &Path) -> PathBuf {
    root.join("daemon.pid")
}
