// Copyright (c) 2025 - Cowboy AI, LLC.

//! In-memory event store, used for tests and development.

use super::{EventRange, EventRecord, EventStore};
use crate::envelope::Payload;
use crate::error::{KernelError, KernelResult};
use crate::value_objects::AgentId;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
pub struct InMemoryEventStore<E> {
    events: RwLock<HashMap<AgentId, Vec<EventRecord<E>>>>,
    _marker: PhantomData<E>,
}

impl<E> InMemoryEventStore<E> {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }
}

impl<E> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Payload> EventStore<E> for InMemoryEventStore<E> {
    async fn append(
        &self,
        agent_id: AgentId,
        events: Vec<E>,
        expected_version: u64,
    ) -> KernelResult<u64> {
        let mut store = self.events.write().unwrap();
        let log = store.entry(agent_id).or_default();

        let current_version = log.len() as u64;
        if current_version != expected_version {
            return Err(KernelError::ConcurrencyConflict {
                agent_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        for (i, payload) in events.into_iter().enumerate() {
            log.push(EventRecord {
                event_id: Uuid::now_v7(),
                timestamp: Utc::now(),
                version: current_version + i as u64 + 1,
                event_type: E::TYPE_NAME,
                event_payload: payload,
                agent_id,
                correlation_id: None,
                metadata: HashMap::new(),
            });
        }

        Ok(log.len() as u64)
    }

    async fn get_events(&self, agent_id: AgentId, range: EventRange) -> KernelResult<Vec<EventRecord<E>>> {
        let store = self.events.read().unwrap();
        let Some(log) = store.get(&agent_id) else {
            return Ok(Vec::new());
        };
        let from = range.from_version.unwrap_or(1);
        let to = range.to_version.unwrap_or(u64::MAX);
        let mut events: Vec<_> = log
            .iter()
            .filter(|e| e.version >= from && e.version <= to)
            .cloned()
            .collect();
        if let Some(max) = range.max_count {
            events.truncate(max);
        }
        Ok(events)
    }

    async fn current_version(&self, agent_id: AgentId) -> KernelResult<u64> {
        Ok(self
            .events
            .read()
            .unwrap()
            .get(&agent_id)
            .map(|log| log.len() as u64)
            .unwrap_or(0))
    }
}
