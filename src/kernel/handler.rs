// Copyright (c) 2025 - Cowboy AI, LLC.

//! Handler discovery and invocation (section 4.4.2).
//!
//! Rather than runtime reflection, agent types register handlers explicitly
//! at construction — the design notes call this out as the right strategy
//! for statically typed targets ("tagged-union dispatch or a registry
//! mapping name to decoder + handler-invocation closure"). A `HandlerDescriptor`
//! is still built per handler and cached in the registry, matching the
//! "compiled once at registration, no per-event reflection" requirement.

use crate::config::AgentConfig;
use crate::envelope::{Direction, Envelope, Payload};
use crate::error::{KernelError, KernelResult, ValidationError};
use crate::state_store::AgentState;
use crate::value_objects::AgentId;
use async_trait::async_trait;

/// Placeholder event-payload type for kernels with no event-sourced path.
/// `Handler<S>` defaults its event parameter to this so direct-state-store
/// agents never need to name an event type.
#[derive(Debug, Clone, PartialEq, prost::Message)]
pub struct NoEvents {}

impl Payload for NoEvents {
    const TYPE_NAME: &'static str = "agent_kernel.v1.NoEvents";
}

/// Placeholder config type for agent types with nothing to configure
/// (section 3, `AgentConfig (TConfig)` is explicitly optional).
#[derive(Debug, Clone, Default, PartialEq, prost::Message)]
pub struct NoConfig {}

/// Cached per-handler metadata (section 3).
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    pub name: &'static str,
    pub payload_type: &'static str,
    /// Lower runs first; ties broken by registration order.
    pub priority: i32,
    pub allow_self_handling: bool,
    /// If true, the handler receives the raw `Envelope` instead of a typed payload.
    pub is_catch_all: bool,
}

/// Mutable context passed to a handler during dispatch: state access, the
/// outgoing-envelope batch (`publish`), and, for event-sourced agents, the
/// pending-events batch (`raise_event`). `config` is the agent's last-loaded
/// [`AgentConfig`](crate::config::AgentConfig), `None` until activation has
/// completed at least once.
pub struct DispatchContext<'a, S, E, C = NoConfig> {
    pub state: &'a mut S,
    pub config: Option<&'a C>,
    self_id: AgentId,
    outgoing: Vec<Envelope>,
    pending_events: Vec<E>,
}

impl<'a, S, E: Payload, C: AgentConfig> DispatchContext<'a, S, E, C> {
    pub(crate) fn new(state: &'a mut S, config: Option<&'a C>, self_id: AgentId) -> Self {
        Self {
            state,
            config,
            self_id,
            outgoing: Vec::new(),
            pending_events: Vec::new(),
        }
    }

    /// Stage an outgoing envelope (section 4.4.1, `publish`).
    pub fn publish<T: Payload>(&mut self, payload: &T, direction: Direction) -> Result<(), ValidationError> {
        let envelope = crate::envelope::build(
            self.self_id,
            payload,
            direction,
            crate::envelope::BuildOptions::default(),
        )?;
        self.outgoing.push(envelope);
        Ok(())
    }

    /// Stage a domain event for the event-sourced commit path. A no-op in
    /// effect for agents on the direct state-store path (the kernel simply
    /// never drains it there).
    pub fn raise_event(&mut self, event: E) {
        self.pending_events.push(event);
    }

    pub(crate) fn into_parts(self) -> (Vec<Envelope>, Vec<E>) {
        (self.outgoing, self.pending_events)
    }
}

/// A registered event handler for agent state type `S`, optionally raising
/// events of type `E` (event-sourced agents only) and reading config `C`.
#[async_trait]
pub trait Handler<S: AgentState, E: Payload = NoEvents, C: AgentConfig = NoConfig>: Send + Sync {
    fn descriptor(&self) -> HandlerDescriptor;

    async fn handle(&self, envelope: &Envelope, ctx: &mut DispatchContext<'_, S, E, C>) -> KernelResult<()>;
}

/// Ergonomic entry point for a handler bound to one typed payload: implement
/// this instead of [`Handler`] directly and wrap in [`Typed`] at registration.
#[async_trait]
pub trait TypedHandler<S: AgentState, T: Payload, E: Payload = NoEvents, C: AgentConfig = NoConfig>:
    Send + Sync
{
    const PRIORITY: i32 = 0;
    const ALLOW_SELF_HANDLING: bool = true;

    fn name(&self) -> &'static str;

    async fn handle(&self, payload: T, ctx: &mut DispatchContext<'_, S, E, C>) -> KernelResult<()>;
}

/// Adapts a [`TypedHandler`] into the registry's uniform [`Handler`] contract.
pub struct Typed<H>(pub H);

#[async_trait]
impl<S, T, E, C, H> Handler<S, E, C> for Typed<H>
where
    S: AgentState,
    T: Payload,
    E: Payload,
    C: AgentConfig,
    H: TypedHandler<S, T, E, C>,
{
    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            name: self.0.name(),
            payload_type: T::TYPE_NAME,
            priority: H::PRIORITY,
            allow_self_handling: H::ALLOW_SELF_HANDLING,
            is_catch_all: false,
        }
    }

    async fn handle(&self, envelope: &Envelope, ctx: &mut DispatchContext<'_, S, E, C>) -> KernelResult<()> {
        let payload: T = envelope
            .payload_as()
            .map_err(|e| KernelError::Validation(e))?;
        self.0.handle(payload, ctx).await
    }
}

/// A handler that receives the raw [`Envelope`] regardless of payload type
/// (section 4.4.2, "catch-all marker").
pub struct CatchAll<H>(pub H);

#[async_trait]
pub trait CatchAllHandler<S: AgentState, E: Payload = NoEvents, C: AgentConfig = NoConfig>: Send + Sync {
    const PRIORITY: i32 = 0;
    const ALLOW_SELF_HANDLING: bool = true;

    fn name(&self) -> &'static str;

    async fn handle(&self, envelope: &Envelope, ctx: &mut DispatchContext<'_, S, E, C>) -> KernelResult<()>;
}

#[async_trait]
impl<S, E, C, H> Handler<S, E, C> for CatchAll<H>
where
    S: AgentState,
    E: Payload,
    C: AgentConfig,
    H: CatchAllHandler<S, E, C>,
{
    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            name: self.0.name(),
            payload_type: "*",
            priority: H::PRIORITY,
            allow_self_handling: H::ALLOW_SELF_HANDLING,
            is_catch_all: true,
        }
    }

    async fn handle(&self, envelope: &Envelope, ctx: &mut DispatchContext<'_, S, E, C>) -> KernelResult<()> {
        self.0.handle(envelope, ctx).await
    }
}

/// Immutable, per-agent-type table of registered handlers, keyed implicitly
/// by payload type and ordered by priority (section 4.4.2).
pub struct HandlerRegistry<S: AgentState, E: Payload = NoEvents, C: AgentConfig = NoConfig> {
    handlers: Vec<std::sync::Arc<dyn Handler<S, E, C>>>,
}

impl<S: AgentState, E: Payload, C: AgentConfig> HandlerRegistry<S, E, C> {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register(&mut self, handler: impl Handler<S, E, C> + 'static) -> &mut Self {
        self.handlers.push(std::sync::Arc::new(handler));
        self
    }

    /// Handlers matching `payload_type`, in ascending priority order
    /// (declaration order breaks ties since registration order is stable).
    pub fn matching(&self, payload_type: &str) -> Vec<std::sync::Arc<dyn Handler<S, E, C>>> {
        let mut matched: Vec<_> = self
            .handlers
            .iter()
            .filter(|h| {
                let d = h.descriptor();
                d.is_catch_all || d.payload_type == payload_type
            })
            .cloned()
            .collect();
        matched.sort_by_key(|h| h.descriptor().priority);
        matched
    }
}

impl<S: AgentState, E: Payload, C: AgentConfig> Default for HandlerRegistry<S, E, C> {
    fn default() -> Self {
        Self::new()
    }
}
