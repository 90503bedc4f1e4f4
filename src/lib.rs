// Copyright (c) 2025 - Cowboy AI, LLC.

//! # agent-kernel-core
//!
//! Core runtime for building distributed applications as a tree of
//! stateful, event-driven agents: a virtual-actor abstraction built from
//! three tightly coupled subsystems.
//!
//! ## Design Principles
//!
//! 1. **Single-threaded dispatch per agent**: the actor mailbox serializes
//!    every envelope an agent sees, so handler code never needs locks.
//! 2. **State is private**: no agent reads or writes another agent's state
//!    directly — all communication happens through envelopes.
//! 3. **Pluggable persistence**: state is either a plain keyed store or an
//!    event-sourced log with snapshots; both speak the same `StateStore`-shaped
//!    contract from the kernel's point of view.
//! 4. **Direction-based propagation**: Up, Down, Both, and UpThenDown select
//!    the neighbor set a published envelope fans out to across the
//!    parent/child graph, bounded by hop count and self-suppression.
//! 5. **No silent failure**: handler errors are classified retryable or
//!    fatal, bubbled as `AgentExceptionEvent`s, or dead-lettered — nothing
//!    escapes the actor loop uncaught.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Manager (registry + factory)                │
//! │   register_agent_type::<S,E>(...)   dead_letters()   activate_all │
//! └───────────────────────────┬──────────────────────────────────────┘
//!                             │ creates
//!                             v
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Actor — single-reader mailbox, serializes dispatch               │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │ AgentKernel<S, E> — handler registry, state, dispatch loop  │  │
//! │  │   activate / handle / publish / deactivate                 │  │
//! │  └──────────────────────────┬─────────────────────────────────┘  │
//! │                             │ state store or event-sourced store  │
//! └─────────────────────────────┼──────────────────────────────────────┘
//!                               v
//!                 routing::forward(envelope, graph) ──> neighbor Actors
//! ```
//!
//! ## Module Structure
//!
//! - `value_objects`: [`AgentId`] and other identifiers shared across the crate.
//! - `envelope`: the typed-payload, routing-metadata record (C1).
//! - `wire`: generated schema-described binary types (`prost`), compiled
//!   from `proto/agent_runtime.proto`.
//! - `state_store`: direct keyed persistence with an optional versioned
//!   variant (C2).
//! - `event_store` / `snapshot` / `event_sourced`: append-only event log,
//!   snapshot strategies, and the event-sourced persistence path (C3).
//! - `kernel`: per-agent dispatch, handler discovery, and lifecycle (C4).
//! - `graph` / `routing`: the parent/child agent graph and direction-based
//!   propagation engine (C5).
//! - `actor` / `manager`: the mailbox wrapper and process-wide registry,
//!   factory, and dead-letter sink (C6).
//! - `config`: separately persisted, rarely-mutating agent configuration
//!   (`TConfig`).
//! - `error`: the shared error taxonomy.

pub mod actor;
pub mod config;
pub mod envelope;
pub mod error;
pub mod event_sourced;
pub mod event_store;
pub mod graph;
pub mod kernel;
pub mod manager;
pub mod routing;
pub mod snapshot;
pub mod state_store;
pub mod value_objects;
mod wire;

// Re-export primary types so application code can `use agent_kernel_core::*;`
// for the common path, matching the way the rest of the pack surfaces its
// domain types at the crate root.
pub use actor::{Actor, OverflowPolicy};
pub use config::{AgentConfig, ConfigStore, InMemoryConfigStore};
pub use envelope::{build, BuildOptions, Direction, Envelope, Payload};
pub use error::{KernelError, KernelResult, RequestError, ValidationError};
pub use event_sourced::{EventSourcedStore, Transition};
pub use event_store::{EventRange, EventRecord, EventStore, InMemoryEventStore};
pub use graph::AgentGraph;
pub use kernel::{
    AgentExceptionEvent, AgentKernel, CatchAll, CatchAllHandler, DispatchContext, DispatchOutcome,
    Handler, HandlerDescriptor, LifecycleHooks, NoConfig, NoEvents, NoHooks, Persistence, RetryPolicy,
    Typed, TypedHandler,
};
pub use manager::{AgentTypeRegistration, DeadLetter, DeadLetterReason, Manager, ManagerOptions};
pub use routing::forward;
pub use snapshot::{HybridStrategy, IntervalStrategy, SnapshotRecord, SnapshotStore, SnapshotStrategy};
pub use state_store::{AgentState, InMemoryStateStore, StateStore, VersionedStateStore};
pub use value_objects::AgentId;
