// Copyright (c) 2025 - Cowboy AI, LLC.

//! State Store abstraction (C2)
//!
//! Load/save/exists/delete keyed by agent ID, plus an optional versioned
//! variant for optimistic concurrency. `save` is atomic with respect to
//! concurrent `save`/`load` for the *same* agent ID; cross-agent operations
//! are independent, so implementations only need to serialize per key.

mod document;
mod in_memory;

pub use document::{DocumentRecord, DocumentStateStore, DocumentStore};
pub use in_memory::InMemoryStateStore;

use crate::error::KernelResult;
use crate::value_objects::AgentId;
use async_trait::async_trait;

/// Application-defined agent state (`TState`).
///
/// The core only requires that a state type be serializable by the
/// reflective binary schema, default-constructible to a valid initial
/// state, and deep-copyable (`Clone` here is required to be a true deep
/// copy — a clone must be equal to, yet independent of, the original).
pub trait AgentState: prost::Message + Default + Clone + PartialEq + 'static {}

impl<T> AgentState for T where T: prost::Message + Default + Clone + PartialEq + 'static {}

/// Load/save/exists/delete keyed by agent ID (section 4.2).
#[async_trait]
pub trait StateStore<S: AgentState>: Send + Sync {
    /// Returns `None` if no state was ever saved for this agent.
    async fn load(&self, agent_id: AgentId) -> KernelResult<Option<S>>;

    /// Upsert; a subsequent `load` returns the new state.
    async fn save(&self, agent_id: AgentId, state: &S) -> KernelResult<()>;

    /// Idempotent delete.
    async fn delete(&self, agent_id: AgentId) -> KernelResult<()>;

    /// Whether any state has been saved for this agent.
    async fn exists(&self, agent_id: AgentId) -> KernelResult<bool>;
}

/// Adds optimistic concurrency to [`StateStore`].
#[async_trait]
pub trait VersionedStateStore<S: AgentState>: StateStore<S> {
    /// Save only if `expected_version` matches the store's current version;
    /// otherwise fails with [`crate::error::KernelError::ConcurrencyConflict`].
    async fn save_versioned(
        &self,
        agent_id: AgentId,
        state: &S,
        expected_version: u64,
    ) -> KernelResult<()>;

    /// Current version for this agent (0 if never saved).
    async fn current_version(&self, agent_id: AgentId) -> KernelResult<u64>;
}
