// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! quill-storage: durable state for the quill job runner.
//!
//! Every file in the queue directory is mutated via temp-file-then-rename
//! only. The queue file is additionally protected by a cross-process
//! advisory lock; the other stores rely on atomic renames alone.

mod fsio;
pub mod checkpoint;
pub mod cost_cache;
pub mod incremental;
pub mod paths;
pub mod probe;
pub mod queue;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use cost_cache::{CostCache, CostCacheError, CostCacheStore, CostEntry, MAX_TRACKED_RUN_IDS};
pub use fsio::write_atomic;
pub use incremental::{IncrementalError, IncrementalState, IncrementalStore};
#[cfg(any(test, feature = "test-support"))]
pub use probe::FakeProbe;
pub use probe::{ProcessProbe, SignalProbe};
pub use queue::{Queue, QueueStore, QueueStoreError, QUEUE_SCHEMA_VERSION};
