// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic file writes and fail-open reads with quarantine.

use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const MAX_BAK_FILES: u32 = 3;

/// Write `bytes` to `path` atomically: serialize to a uniquely-named temp
/// file in the same directory, then rename over the target.
///
/// The temp suffix is random per write so two processes racing on the same
/// target never clobber each other's temp file. If the temp file vanishes
/// before the rename (observed under concurrent cleanup), fall back to a
/// direct write, a known weak point rather than a guarantee.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir)?;

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("state");
    let tmp = dir.join(format!("{}.tmp-{}", name, nanoid::nanoid!(8)));
    fs::write(&tmp, bytes)?;

    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound && !tmp.exists() => {
            warn!(path = %path.display(), "temp file vanished before rename, writing directly");
            fs::write(path, bytes)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Read and deserialize a JSON file, failing open.
///
/// Returns `None` when the file is missing. Invalid JSON is treated as "no
/// state": the unreadable file is renamed aside (rotating `.bak` files) for
/// forensics rather than deleted.
pub fn read_json_or_quarantine<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = fs::read(path).ok()?;
    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt state file, quarantining");
            quarantine(path);
            None
        }
    }
}

/// Rename a corrupt file aside to the next `.bak` slot.
pub(crate) fn quarantine(path: &Path) {
    let bak = rotate_bak_path(path);
    let _ = fs::rename(path, bak);
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    // Remove the oldest if at capacity
    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    // Shift existing backups up by one
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "fsio_tests.rs"]
mod tests;
