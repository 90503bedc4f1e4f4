// Copyright (c) 2025 - Cowboy AI, LLC.

//! Value objects shared across the kernel, stores, and routing engine.

mod agent_id;

pub use agent_id::AgentId;
