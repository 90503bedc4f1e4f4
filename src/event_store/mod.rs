// Copyright (c) 2025 - Cowboy AI, LLC.

//! Event Store (C3)
//!
//! An append-only, per-agent event log with a gap-free version sequence
//! starting at 1, enforced by optimistic concurrency on `append`.

mod in_memory;

pub use in_memory::InMemoryEventStore;

use crate::envelope::Payload;
use crate::error::KernelResult;
use crate::value_objects::AgentId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single persisted event (`AgentStateEvent`, section 3), typed over the
/// agent's declared event payload `E`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord<E> {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Monotonically increasing per agent, starting at 1.
    pub version: u64,
    pub event_type: &'static str,
    pub event_payload: E,
    pub agent_id: AgentId,
    pub correlation_id: Option<Uuid>,
    pub metadata: std::collections::HashMap<String, String>,
}

/// Optional bounds for [`EventStore::get_events`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRange {
    pub from_version: Option<u64>,
    pub to_version: Option<u64>,
    pub max_count: Option<usize>,
}

impl EventRange {
    pub fn from(from_version: u64) -> Self {
        Self {
            from_version: Some(from_version),
            ..Default::default()
        }
    }
}

/// Append-only event log contract (section 4.3).
#[async_trait]
pub trait EventStore<E: Payload>: Send + Sync {
    /// All-or-nothing append; fails with
    /// [`crate::error::KernelError::ConcurrencyConflict`] if `expected_version`
    /// does not match the store's current version before the append.
    /// Returns the new current version on success.
    async fn append(
        &self,
        agent_id: AgentId,
        events: Vec<E>,
        expected_version: u64,
    ) -> KernelResult<u64>;

    /// Events in ascending version order, restricted to `range`.
    async fn get_events(&self, agent_id: AgentId, range: EventRange) -> KernelResult<Vec<EventRecord<E>>>;

    /// Current version for this agent (0 if no events).
    async fn current_version(&self, agent_id: AgentId) -> KernelResult<u64>;
}
