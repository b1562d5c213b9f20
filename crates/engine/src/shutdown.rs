// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative shutdown: a one-shot signal and the interruptible wait used
//! by every long sleep in the runner.
//!
//! Cancellation is cooperative only: an in-flight phase always finishes,
//! and shutdown takes effect at the next wait or checkpoint boundary, so
//! the last written checkpoint is always a valid resume point.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent on repeat.
    pub fn request(&self) {
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleep up to `timeout`, waking immediately on shutdown.
    ///
    /// Returns `true` if shutdown fired during the wait, `false` on an
    /// ordinary timeout.
    pub async fn wait_or_shutdown(&self, timeout: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(timeout) => false,
        }
    }

    /// Install best-effort SIGINT/SIGTERM handlers that trip the signal.
    ///
    /// Platform-dependent; registration failure is logged and ignored.
    pub fn register_signals(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            let interrupted = wait_for_os_signal().await;
            if interrupted {
                info!("shutdown signal received, finishing current work");
                token.cancel();
            }
        });
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "could not register SIGTERM handler");
            return tokio::signal::ctrl_c().await.is_ok();
        }
    };
    tokio::select! {
        r = tokio::signal::ctrl_c() => r.is_ok(),
        _ = term.recv() => true,
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> bool {
    tokio::signal::ctrl_c().await.is_ok()
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;
