// Copyright (c) 2025 - Cowboy AI, LLC.

//! Document-store backed [`StateStore`] with a pluggable driver.
//!
//! `DocumentStore` is the seam an embedding application implements against
//! whatever database it runs (Postgres, Mongo, a KV store); this module only
//! defines the record shape and the adapter that turns raw document
//! operations into the typed `StateStore`/`VersionedStateStore` contract.
//! One collection per state type by default (section 6, "Persisted state
//! layout"), each document keyed by `agent_id`.

use super::{AgentState, StateStore, VersionedStateStore};
use crate::error::{KernelError, KernelResult};
use crate::value_objects::AgentId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prost::Message;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::RwLock;

/// A single persisted document: the encoded state plus store-managed metadata.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub agent_id: AgentId,
    pub state_payload: Vec<u8>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Low-level driver contract a document database backend must implement.
///
/// `collection` lets one physical database serve multiple state types under
/// distinct namespaces, matching the "one collection per state type"
/// default from the external interfaces section.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, agent_id: AgentId) -> KernelResult<Option<DocumentRecord>>;

    /// Upsert. If `expected_version` is `Some`, the driver must fail with
    /// [`KernelError::ConcurrencyConflict`] when the stored version differs.
    async fn put(
        &self,
        collection: &str,
        record: DocumentRecord,
        expected_version: Option<u64>,
    ) -> KernelResult<()>;

    async fn delete(&self, collection: &str, agent_id: AgentId) -> KernelResult<()>;
}

/// Adapts a [`DocumentStore`] driver into the typed [`StateStore`] contract
/// for a specific `AgentState` type `S`.
pub struct DocumentStateStore<S: AgentState, D: DocumentStore> {
    driver: D,
    collection: String,
    _marker: PhantomData<S>,
}

impl<S: AgentState, D: DocumentStore> DocumentStateStore<S, D> {
    /// Use the default collection name: the state type's Rust type name.
    pub fn new(driver: D) -> Self {
        Self::with_collection(driver, std::any::type_name::<S>())
    }

    /// Override the collection/table name the driver namespaces records under.
    pub fn with_collection(driver: D, collection: impl Into<String>) -> Self {
        Self {
            driver,
            collection: collection.into(),
            _marker: PhantomData,
        }
    }

    fn decode(record: DocumentRecord) -> KernelResult<S> {
        S::decode(record.state_payload.as_slice())
            .map_err(|e| KernelError::Fatal(record.agent_id, Box::new(e)))
    }
}

#[async_trait]
impl<S: AgentState, D: DocumentStore> StateStore<S> for DocumentStateStore<S, D> {
    async fn load(&self, agent_id: AgentId) -> KernelResult<Option<S>> {
        match self.driver.get(&self.collection, agent_id).await? {
            Some(record) => Ok(Some(Self::decode(record)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, agent_id: AgentId, state: &S) -> KernelResult<()> {
        let current_version = self.current_version(agent_id).await?;
        let record = DocumentRecord {
            agent_id,
            state_payload: state.encode_to_vec(),
            version: current_version + 1,
            updated_at: Utc::now(),
        };
        self.driver.put(&self.collection, record, None).await
    }

    async fn delete(&self, agent_id: AgentId) -> KernelResult<()> {
        self.driver.delete(&self.collection, agent_id).await
    }

    async fn exists(&self, agent_id: AgentId) -> KernelResult<bool> {
        Ok(self.driver.get(&self.collection, agent_id).await?.is_some())
    }
}

#[async_trait]
impl<S: AgentState, D: DocumentStore> VersionedStateStore<S> for DocumentStateStore<S, D> {
    async fn save_versioned(
        &self,
        agent_id: AgentId,
        state: &S,
        expected_version: u64,
    ) -> KernelResult<()> {
        let record = DocumentRecord {
            agent_id,
            state_payload: state.encode_to_vec(),
            version: expected_version + 1,
            updated_at: Utc::now(),
        };
        self.driver
            .put(&self.collection, record, Some(expected_version))
            .await
    }

    async fn current_version(&self, agent_id: AgentId) -> KernelResult<u64> {
        Ok(self
            .driver
            .get(&self.collection, agent_id)
            .await?
            .map(|r| r.version)
            .unwrap_or(0))
    }
}

/// In-memory [`DocumentStore`] driver, useful for tests and for embedding
/// applications that have not wired a real database yet.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, HashMap<AgentId, DocumentRecord>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, agent_id: AgentId) -> KernelResult<Option<DocumentRecord>> {
        Ok(self
            .collections
            .read()
            .unwrap()
            .get(collection)
            .and_then(|docs| docs.get(&agent_id))
            .cloned())
    }

    async fn put(
        &self,
        collection: &str,
        record: DocumentRecord,
        expected_version: Option<u64>,
    ) -> KernelResult<()> {
        let mut collections = self.collections.write().unwrap();
        let docs = collections.entry(collection.to_string()).or_default();

        if let Some(expected) = expected_version {
            let actual = docs.get(&record.agent_id).map(|r| r.version).unwrap_or(0);
            if actual != expected {
                return Err(KernelError::ConcurrencyConflict {
                    agent_id: record.agent_id,
                    expected,
                    actual,
                });
            }
        }

        docs.insert(record.agent_id, record);
        Ok(())
    }

    async fn delete(&self, collection: &str, agent_id: AgentId) -> KernelResult<()> {
        if let Some(docs) = self.collections.write().unwrap().get_mut(collection) {
            docs.remove(&agent_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Counter {
        #[prost(int64, tag = "1")]
        count: i64,
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = DocumentStateStore::<Counter, _>::new(InMemoryDocumentStore::new());
        let id = AgentId::new();
        store.save(id, &Counter { count: 3 }).await.unwrap();
        assert_eq!(store.load(id).await.unwrap(), Some(Counter { count: 3 }));
    }

    #[tokio::test]
    async fn versioned_save_rejects_stale_version() {
        let store = DocumentStateStore::<Counter, _>::new(InMemoryDocumentStore::new());
        let id = AgentId::new();
        store.save_versioned(id, &Counter { count: 1 }, 0).await.unwrap();
        let result = store.save_versioned(id, &Counter { count: 2 }, 0).await;
        assert!(matches!(result, Err(KernelError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn distinct_state_types_use_distinct_collections() {
        #[derive(Clone, PartialEq, prost::Message)]
        struct Other {
            #[prost(int64, tag = "1")]
            n: i64,
        }
        let driver = InMemoryDocumentStore::new();
        let counters = DocumentStateStore::<Counter, _>::with_collection(
            InMemoryDocumentStore::new(),
            "counters",
        );
        let _ = &driver; // driver not shared across stores in this test
        let id = AgentId::new();
        counters.save(id, &Counter { count: 5 }).await.unwrap();
        let others = DocumentStateStore::<Other, _>::with_collection(
            InMemoryDocumentStore::new(),
            "others",
        );
        assert_eq!(others.load(id).await.unwrap(), None);
    }
}
