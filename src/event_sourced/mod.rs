// Copyright (c) 2025 - Cowboy AI, LLC.

//! Event-sourced state store (C3)
//!
//! Composes an [`EventStore`] with a pure `transition` function and a
//! [`SnapshotStrategy`] to derive current state by replaying events from the
//! latest snapshot. `save` is never called directly on this path — the
//! kernel stages events raised during dispatch and calls [`confirm`]
//! (section 4.3) once the handler batch completes.

use crate::envelope::Payload;
use crate::error::KernelResult;
use crate::event_store::{EventRange, EventStore};
use crate::snapshot::{SnapshotRecord, SnapshotStore, SnapshotStrategy};
use crate::state_store::AgentState;
use crate::value_objects::AgentId;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// Pure, deterministic state transition declared by the agent type.
///
/// Must have no side effects: replaying the same `(state, event)` pairs
/// always yields the same resulting state (section 3, "pure-function
/// property of state transitions").
pub trait Transition<S: AgentState, E: Payload>: Send + Sync {
    fn apply(&self, state: &S, event: &E) -> S;
}

/// Blanket impl so a plain closure can serve as a `Transition`.
impl<S, E, F> Transition<S, E> for F
where
    S: AgentState,
    E: Payload,
    F: Fn(&S, &E) -> S + Send + Sync,
{
    fn apply(&self, state: &S, event: &E) -> S {
        self(state, event)
    }
}

/// Composes an event store, snapshot store, transition function, and
/// snapshot strategy into the event-sourced persistence path for one
/// agent type.
pub struct EventSourcedStore<S: AgentState, E: Payload> {
    event_store: Arc<dyn EventStore<E>>,
    snapshot_store: Arc<dyn SnapshotStore<S>>,
    strategy: Arc<dyn SnapshotStrategy>,
    transition: Arc<dyn Transition<S, E>>,
    /// How many versions' worth of older snapshots to retain once a new one
    /// is taken; `None` keeps every snapshot ever written.
    snapshot_retention_window: Option<u64>,
}

impl<S: AgentState, E: Payload> EventSourcedStore<S, E> {
    pub fn new(
        event_store: Arc<dyn EventStore<E>>,
        snapshot_store: Arc<dyn SnapshotStore<S>>,
        strategy: Arc<dyn SnapshotStrategy>,
        transition: Arc<dyn Transition<S, E>>,
    ) -> Self {
        Self {
            event_store,
            snapshot_store,
            strategy,
            transition,
            snapshot_retention_window: None,
        }
    }

    pub fn with_snapshot_retention_window(mut self, versions: u64) -> Self {
        self.snapshot_retention_window = Some(versions);
        self
    }

    /// Reconstruct state by replaying events from the latest snapshot
    /// (section 4.3, `load` algorithm). Returns `None` if the agent has
    /// never been saved (no snapshot and no events).
    pub async fn load(&self, agent_id: AgentId) -> KernelResult<Option<(S, u64)>> {
        let (mut state, mut version) = match self.snapshot_store.get_latest_snapshot(agent_id).await? {
            Some(snapshot) => (snapshot.state, snapshot.version),
            None => (S::default(), 0),
        };

        let events = self
            .event_store
            .get_events(agent_id, EventRange::from(version + 1))
            .await?;

        if events.is_empty() && version == 0 {
            return Ok(None);
        }

        for record in events {
            state = self.transition.apply(&state, &record.event_payload);
            version = record.version;
        }

        Ok(Some((state, version)))
    }

    /// Append `pending_events` atomically, fold them onto `current_state`,
    /// and take a snapshot if the strategy says to.
    ///
    /// Fails with [`crate::error::KernelError::ConcurrencyConflict`] if
    /// `current_version` is stale; the caller's pending events remain
    /// staged so it can retry or discard them.
    pub async fn confirm(
        &self,
        agent_id: AgentId,
        current_state: &S,
        current_version: u64,
        pending_events: Vec<E>,
    ) -> KernelResult<(S, u64)> {
        let pending_count = pending_events.len();
        let new_version = self
            .event_store
            .append(agent_id, pending_events.clone(), current_version)
            .await?;

        let mut state = current_state.clone();
        for event in &pending_events {
            state = self.transition.apply(&state, event);
        }

        if self.strategy.should_snapshot(new_version, pending_count) {
            let snapshot = SnapshotRecord {
                agent_id,
                version: new_version,
                state: state.clone(),
                timestamp: Utc::now(),
                metadata: Default::default(),
            };
            if let Err(err) = self.snapshot_store.save_snapshot(snapshot).await {
                warn!(%agent_id, %err, "snapshot save failed; correctness unaffected, events remain authoritative");
            } else if let Some(window) = self.snapshot_retention_window {
                if new_version > window {
                    let _ = self
                        .snapshot_store
                        .delete_snapshots_before(agent_id, new_version - window)
                        .await;
                }
            }
        }

        Ok((state, new_version))
    }

    pub async fn current_version(&self, agent_id: AgentId) -> KernelResult<u64> {
        self.event_store.current_version(agent_id).await
    }

    pub async fn exists(&self, agent_id: AgentId) -> KernelResult<bool> {
        Ok(self.current_version(agent_id).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::snapshot::{InMemorySnapshotStore, IntervalStrategy};

    #[derive(Debug, Clone, Default, PartialEq, prost::Message)]
    struct Balance {
        #[prost(int64, tag = "1")]
        amount: i64,
    }

    #[derive(Debug, Clone, PartialEq, prost::Message)]
    struct Deposited {
        #[prost(int64, tag = "1")]
        amount: i64,
    }

    impl Payload for Deposited {
        const TYPE_NAME: &'static str = "test.v1.Deposited";
    }

    fn store() -> EventSourcedStore<Balance, Deposited> {
        EventSourcedStore::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(IntervalStrategy::new(3)),
            Arc::new(|state: &Balance, event: &Deposited| Balance {
                amount: state.amount + event.amount,
            }),
        )
    }

    #[tokio::test]
    async fn load_of_unknown_agent_is_none() {
        let store = store();
        assert_eq!(store.load(AgentId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn confirm_then_load_replays_to_same_state() {
        let store = store();
        let id = AgentId::new();
        let (state, version) = store
            .confirm(id, &Balance::default(), 0, vec![Deposited { amount: 10 }])
            .await
            .unwrap();
        assert_eq!(state.amount, 10);
        assert_eq!(version, 1);

        let (loaded, loaded_version) = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded_version, version);
    }

    #[tokio::test]
    async fn ten_deposits_with_interval_snapshot_replays_to_same_total() {
        let store = store();
        let id = AgentId::new();
        let mut state = Balance::default();
        let mut version = 0;
        for _ in 0..10 {
            let (next_state, next_version) = store
                .confirm(id, &state, version, vec![Deposited { amount: 10 }])
                .await
                .unwrap();
            state = next_state;
            version = next_version;
        }
        assert_eq!(state.amount, 100);

        let (replayed, replayed_version) = store.load(id).await.unwrap().unwrap();
        assert_eq!(replayed.amount, 100);
        assert_eq!(replayed_version, 10);
    }

    #[tokio::test]
    async fn confirm_rejects_stale_expected_version() {
        let store = store();
        let id = AgentId::new();
        store
            .confirm(id, &Balance::default(), 0, vec![Deposited { amount: 10 }])
            .await
            .unwrap();
        let result = store
            .confirm(id, &Balance::default(), 0, vec![Deposited { amount: 5 }])
            .await;
        assert!(result.is_err());
    }
}
