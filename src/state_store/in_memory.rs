// Copyright (c) 2025 - Cowboy AI, LLC.

//! Concurrent in-memory state store, used for tests and simple agents.

use super::{AgentState, StateStore};
use crate::error::KernelResult;
use crate::value_objects::AgentId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::RwLock;

/// In-memory [`StateStore`] backed by a concurrent map.
#[derive(Debug)]
pub struct InMemoryStateStore<S: AgentState> {
    states: RwLock<HashMap<AgentId, S>>,
    _marker: PhantomData<S>,
}

impl<S: AgentState> InMemoryStateStore<S> {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }
}

impl<S: AgentState> Default for InMemoryStateStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: AgentState> StateStore<S> for InMemoryStateStore<S> {
    async fn load(&self, agent_id: AgentId) -> KernelResult<Option<S>> {
        Ok(self.states.read().unwrap().get(&agent_id).cloned())
    }

    async fn save(&self, agent_id: AgentId, state: &S) -> KernelResult<()> {
        self.states.write().unwrap().insert(agent_id, state.clone());
        Ok(())
    }

    async fn delete(&self, agent_id: AgentId) -> KernelResult<()> {
        self.states.write().unwrap().remove(&agent_id);
        Ok(())
    }

    async fn exists(&self, agent_id: AgentId) -> KernelResult<bool> {
        Ok(self.states.read().unwrap().contains_key(&agent_id))
    }
}
