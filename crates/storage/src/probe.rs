// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process liveness probing for checkpoint ownership.

/// Answers "is this PID currently alive?" for checkpoint owner entries.
///
/// Failure to probe is reported as dead: a checkpoint whose owner cannot be
/// signalled is resumable. PID reuse makes this racy on long uptimes; a
/// heartbeat lease is the substitute on platforms without signal probing.
pub trait ProcessProbe: Clone + Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probes liveness with a zero-effect signal to the PID.
#[derive(Clone, Copy, Default)]
pub struct SignalProbe;

impl ProcessProbe for SignalProbe {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        // No signal probing here; report dead so crashed work stays resumable.
        false
    }
}

/// Controllable probe for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct FakeProbe {
    alive: std::sync::Arc<parking_lot::Mutex<std::collections::HashSet<u32>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A probe that already reports this process's own PID alive.
    pub fn with_self_alive() -> Self {
        let probe = Self::new();
        probe.set_alive(std::process::id());
        probe
    }

    pub fn set_alive(&self, pid: u32) {
        self.alive.lock().insert(pid);
    }

    pub fn set_dead(&self, pid: u32) {
        self.alive.lock().remove(&pid);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ProcessProbe for FakeProbe {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().contains(&pid)
    }
}
