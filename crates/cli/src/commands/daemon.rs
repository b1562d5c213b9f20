// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon mode: the runner loop in the foreground or as a background
//! process guarded by a locked PID file.

use crate::exit_error::ExitError;
use crate::setup::App;
use anyhow::{Context, Result};
use fs2::FileExt;
use quill_storage::{paths, ProcessProbe, SignalProbe};
use std::io::Write;

/// Run the loop in the foreground until interrupted.
pub async fn run_foreground() -> Result<()> {
    let app = App::load()?;

    // Acquire the PID lock first. Use OpenOptions to avoid truncating the
    // file before we hold the lock, which would wipe the running daemon's PID.
    let pid_path = paths::daemon_pid_path(&app.state_dir);
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&pid_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| ExitError::new(1, "daemon already running?"))?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let logs_dir = paths::logs_dir(&app.state_dir);
    std::fs::create_dir_all(&logs_dir)?;
    let appender = tracing_appender::rolling::never(&logs_dir, "daemon.log");
    let (writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    let runner = app.build_runner();
    runner.shutdown().register_signals();
    println!("READY (pid {})", std::process::id());

    runner.run_loop().await;

    let _ = std::fs::remove_file(&pid_path);
    if runner.shutdown().is_requested() {
        return Err(ExitError::interrupted().into());
    }
    Ok(())
}

/// Spawn `quill daemon` detached, logging to the daemon log file.
pub fn start() -> Result<()> {
    let app = App::load()?;
    let pid_path = paths::daemon_pid_path(&app.state_dir);
    if let Some(pid) = read_pid(&pid_path) {
        if SignalProbe.is_alive(pid) {
            return Err(ExitError::new(1, format!("daemon already running (pid {pid})")).into());
        }
    }

    let logs_dir = paths::logs_dir(&app.state_dir);
    std::fs::create_dir_all(&logs_dir)?;
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join("daemon.out"))?;

    let exe = std::env::current_exe().context("locating the quill binary")?;
    let child = std::process::Command::new(exe)
        .arg("daemon")
        .stdin(std::process::Stdio::null())
        .stdout(log.try_clone()?)
        .stderr(log)
        .spawn()
        .context("spawning the daemon process")?;
    println!("Daemon started (pid {})", child.id());
    Ok(())
}

/// Signal the running daemon to shut down after its current job.
pub fn stop() -> Result<()> {
    let app = App::load()?;
    let pid_path = paths::daemon_pid_path(&app.state_dir);
    let Some(pid) = read_pid(&pid_path) else {
        println!("Daemon not running.");
        return Ok(());
    };
    if !SignalProbe.is_alive(pid) {
        println!("Daemon not running (stale pid file).");
        let _ = std::fs::remove_file(&pid_path);
        return Ok(());
    }

    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::SIGTERM)
        .map_err(|e| ExitError::new(1, format!("could not signal pid {pid}: {e}")))?;
    println!("Sent SIGTERM to daemon (pid {pid}); it stops at the next checkpoint boundary.");
    Ok(())
}

fn read_pid(path: &std::path::Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}
