// Copyright (c) 2025 - Cowboy AI, LLC.

//! Snapshot strategies deciding when a new snapshot is worth taking.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Decides, after a successful `confirm()`, whether to take a snapshot.
pub trait SnapshotStrategy: Send + Sync {
    /// `version` is the version just reached; `pending_count` is the number
    /// of events just confirmed in this batch.
    fn should_snapshot(&self, version: u64, pending_count: usize) -> bool;
}

/// Snapshot every `N` versions. `N == 0` disables snapshotting.
#[derive(Debug, Clone, Copy)]
pub struct IntervalStrategy {
    interval: u64,
}

impl IntervalStrategy {
    pub fn new(interval: u64) -> Self {
        Self { interval }
    }
}

impl SnapshotStrategy for IntervalStrategy {
    fn should_snapshot(&self, version: u64, _pending_count: usize) -> bool {
        self.interval != 0 && version % self.interval == 0
    }
}

/// Snapshots on whichever of three conditions triggers first: a version
/// interval, a wall-clock deadline since the last snapshot, or a
/// large-batch commit — capturing both steady-state and bursty workloads
/// (design notes, "snapshot placement trade-off").
pub struct HybridStrategy {
    interval: u64,
    time_deadline: Duration,
    large_batch_threshold: usize,
    last_snapshot_at: Mutex<Instant>,
}

impl HybridStrategy {
    pub fn new(interval: u64, time_deadline: Duration, large_batch_threshold: usize) -> Self {
        Self {
            interval,
            time_deadline,
            large_batch_threshold,
            last_snapshot_at: Mutex::new(Instant::now()),
        }
    }
}

impl SnapshotStrategy for HybridStrategy {
    fn should_snapshot(&self, version: u64, pending_count: usize) -> bool {
        let interval_hit = self.interval != 0 && version % self.interval == 0;
        let batch_hit = pending_count >= self.large_batch_threshold;

        let mut last = self.last_snapshot_at.lock().unwrap();
        let deadline_hit = last.elapsed() >= self.time_deadline;

        let triggered = interval_hit || batch_hit || deadline_hit;
        if triggered {
            *last = Instant::now();
        }
        triggered
    }
}
