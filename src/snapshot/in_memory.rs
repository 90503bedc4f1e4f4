// Copyright (c) 2025 - Cowboy AI, LLC.

//! In-memory snapshot store, used for tests and development.

use super::{SnapshotRecord, SnapshotStore};
use crate::error::KernelResult;
use crate::state_store::AgentState;
use crate::value_objects::AgentId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::RwLock;

#[derive(Debug)]
pub struct InMemorySnapshotStore<S> {
    snapshots: RwLock<HashMap<AgentId, Vec<SnapshotRecord<S>>>>,
    _marker: PhantomData<S>,
}

impl<S> InMemorySnapshotStore<S> {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }
}

impl<S> Default for InMemorySnapshotStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: AgentState> SnapshotStore<S> for InMemorySnapshotStore<S> {
    async fn save_snapshot(&self, snapshot: SnapshotRecord<S>) -> KernelResult<()> {
        self.snapshots
            .write()
            .unwrap()
            .entry(snapshot.agent_id)
            .or_default()
            .push(snapshot);
        Ok(())
    }

    async fn get_latest_snapshot(&self, agent_id: AgentId) -> KernelResult<Option<SnapshotRecord<S>>> {
        Ok(self
            .snapshots
            .read()
            .unwrap()
            .get(&agent_id)
            .and_then(|snapshots| snapshots.last().cloned()))
    }

    async fn delete_snapshots_before(&self, agent_id: AgentId, before_version: u64) -> KernelResult<()> {
        if let Some(snapshots) = self.snapshots.write().unwrap().get_mut(&agent_id) {
            snapshots.retain(|s| s.version >= before_version);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[derive(Debug, Clone, PartialEq, prost::Message)]
    struct Balance {
        #[prost(int64, tag = "1")]
        amount: i64,
    }

    fn record(agent_id: AgentId, version: u64) -> SnapshotRecord<Balance> {
        SnapshotRecord {
            agent_id,
            version,
            state: Balance { amount: version as i64 },
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn no_snapshot_returns_none() {
        let store: InMemorySnapshotStore<Balance> = InMemorySnapshotStore::new();
        assert_eq!(store.get_latest_snapshot(AgentId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_latest_returns_most_recently_saved() {
        let store: InMemorySnapshotStore<Balance> = InMemorySnapshotStore::new();
        let id = AgentId::new();
        for v in 1..=5 {
            store.save_snapshot(record(id, v)).await.unwrap();
        }
        let latest = store.get_latest_snapshot(id).await.unwrap().unwrap();
        assert_eq!(latest.version, 5);
    }

    #[tokio::test]
    async fn delete_snapshots_before_prunes_older_generations() {
        let store: InMemorySnapshotStore<Balance> = InMemorySnapshotStore::new();
        let id = AgentId::new();
        for v in 1..=5 {
            store.save_snapshot(record(id, v)).await.unwrap();
        }
        store.delete_snapshots_before(id, 3).await.unwrap();
        let remaining = store.snapshots.read().unwrap().get(&id).unwrap().len();
        assert_eq!(remaining, 3);
    }
}
