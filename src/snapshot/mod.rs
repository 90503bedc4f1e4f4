// Copyright (c) 2025 - Cowboy AI, LLC.

//! Snapshot store and snapshot strategy (C3)
//!
//! A snapshot lets the event-sourced path skip replaying the full event log
//! on activation. Correctness never depends on a snapshot existing — it is
//! purely an optimization, so a failed `save_snapshot` is non-fatal.

mod in_memory;
mod strategy;

pub use in_memory::InMemorySnapshotStore;
pub use strategy::{HybridStrategy, IntervalStrategy, SnapshotStrategy};

use crate::error::KernelResult;
use crate::state_store::AgentState;
use crate::value_objects::AgentId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A point-in-time, deep-copied state associated with an event version.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord<S> {
    pub agent_id: AgentId,
    pub version: u64,
    pub state: S,
    pub timestamp: DateTime<Utc>,
    pub metadata: std::collections::HashMap<String, String>,
}

/// Snapshot persistence contract (section 4.3).
#[async_trait]
pub trait SnapshotStore<S: AgentState>: Send + Sync {
    async fn save_snapshot(&self, snapshot: SnapshotRecord<S>) -> KernelResult<()>;

    async fn get_latest_snapshot(&self, agent_id: AgentId) -> KernelResult<Option<SnapshotRecord<S>>>;

    /// Delete snapshots strictly older than `before_version`, used to bound
    /// storage growth once newer snapshots exist.
    async fn delete_snapshots_before(&self, agent_id: AgentId, before_version: u64) -> KernelResult<()>;
}
