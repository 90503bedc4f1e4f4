// Copyright (c) 2025 - Cowboy AI, LLC.

//! Agent configuration (`TConfig`, section 3)
//!
//! Distinct from [`crate::state_store::AgentState`]: an `AgentConfig` holds
//! rarely-mutating parameters, is persisted separately from state, and is
//! loaded once at activation and again only on an explicit
//! [`AgentKernel::reconfigure`](crate::kernel::AgentKernel::reconfigure) call
//! rather than on every dispatch.

use crate::error::KernelResult;
use crate::value_objects::AgentId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Application-defined, rarely-mutating agent configuration. Optional —
/// agent types with nothing to configure use [`crate::kernel::NoConfig`].
pub trait AgentConfig: prost::Message + Default + Clone + PartialEq + 'static {}

impl<T> AgentConfig for T where T: prost::Message + Default + Clone + PartialEq + 'static {}

/// Load/save keyed by agent ID, independent of [`crate::state_store::StateStore`].
#[async_trait]
pub trait ConfigStore<C: AgentConfig>: Send + Sync {
    /// Returns `None` if no config was ever saved for this agent.
    async fn load(&self, agent_id: AgentId) -> KernelResult<Option<C>>;

    /// Upsert.
    async fn save(&self, agent_id: AgentId, config: &C) -> KernelResult<()>;
}

/// In-memory [`ConfigStore`], used for tests and simple agents.
#[derive(Debug)]
pub struct InMemoryConfigStore<C: AgentConfig> {
    configs: RwLock<HashMap<AgentId, C>>,
}

impl<C: AgentConfig> InMemoryConfigStore<C> {
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }
}

impl<C: AgentConfig> Default for InMemoryConfigStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<C: AgentConfig> ConfigStore<C> for InMemoryConfigStore<C> {
    async fn load(&self, agent_id: AgentId) -> KernelResult<Option<C>> {
        Ok(self.configs.read().unwrap().get(&agent_id).cloned())
    }

    async fn save(&self, agent_id: AgentId, config: &C) -> KernelResult<()> {
        self.configs.write().unwrap().insert(agent_id, config.clone());
        Ok(())
    }
}
