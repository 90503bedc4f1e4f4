// Copyright (c) 2025 - Cowboy AI, LLC.

//! Manager (C6)
//!
//! The process-wide registry, factory, and lifecycle coordinator for
//! actors (section 4.6.2). The Manager is the only authorized mutator of
//! the agent graph — `set_parent` goes through it so parent/child
//! consistency is preserved across failures — and it owns the dead-letter
//! sink for envelopes whose targets are missing or saturated.
//!
//! Rust has no runtime reflection to resolve `create<AgentType>(id)` against
//! an arbitrary state/event/config triple at the call site, so
//! [`register_agent_type`](Manager::register_agent_type) takes the
//! type-erasure route the design notes recommend for statically typed
//! targets (section 9): a closure that knows its own `S`, `E`, and `C` is
//! captured once behind an [`AgentTypeRegistration`], keyed by a type name
//! chosen by the embedding application, and `create` looks it up by that
//! name rather than by a generic parameter.

use crate::actor::{Actor, OverflowPolicy};
use crate::config::AgentConfig;
use crate::envelope::{Envelope, Payload};
use crate::error::{KernelError, KernelResult, RequestError};
use crate::graph::AgentGraph;
use crate::kernel::AgentKernel;
use crate::routing::DEFAULT_MAILBOX_CAPACITY;
use crate::state_store::AgentState;
use crate::value_objects::AgentId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// An envelope the Manager could not deliver or that poisoned its target
/// (section 7, "dead-letter sink").
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: Envelope,
    pub target: AgentId,
    pub reason: DeadLetterReason,
}

/// Why an envelope ended up in the dead-letter sink.
#[derive(Debug, Clone)]
pub enum DeadLetterReason {
    /// No actor is registered under this `AgentId`.
    TargetMissing,
    /// The target's mailbox was full under a `Drop` overflow policy.
    MailboxOverflow,
    /// `kernel.handle` itself returned an error (store failure after retry
    /// exhaustion, fatal error, etc).
    HandlerFailed(String),
}

type ActorFactory = Box<
    dyn Fn(
            AgentId,
            Arc<AgentGraph>,
            Arc<Mutex<HashMap<AgentId, Actor>>>,
            OverflowPolicy,
            usize,
            mpsc::UnboundedSender<DeadLetter>,
        ) -> Actor
        + Send
        + Sync,
>;

/// A registered agent type: a type name plus a closure that knows how to
/// build a fresh kernel (and thus its `S`, `E`, `C`) for a new `AgentId`.
/// `register_agent_type<T,S>(config?)` from section 6 is this value,
/// constructed with [`AgentTypeRegistration::new`] and handed to
/// [`Manager::register_agent_type`].
pub struct AgentTypeRegistration {
    description: String,
    factory: ActorFactory,
}

impl AgentTypeRegistration {
    /// `build_kernel` is called once per `create` call with the new agent's
    /// ID; it is expected to resolve the kernel's collaborators (state
    /// store, event store, logger) itself — there being no DI container in
    /// this crate, the closure's captures *are* the container.
    pub fn new<S, E, C, F>(description: impl Into<String>, build_kernel: F) -> Self
    where
        S: AgentState,
        E: Payload,
        C: AgentConfig,
        F: Fn(AgentId) -> AgentKernel<S, E, C> + Send + Sync + 'static,
    {
        let factory: ActorFactory = Box::new(
            move |id, graph, neighbors, overflow_policy, mailbox_capacity, dead_letters| {
                let kernel = Arc::new(build_kernel(id));
                Actor::spawn(kernel, graph, neighbors, overflow_policy, mailbox_capacity, Some(dead_letters))
            },
        );
        Self {
            description: description.into(),
            factory,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Options a Manager must be constructed with. The mailbox overflow policy
/// default is deliberately not `Default`-derived: it is left to the
/// embedding application, which must make either choice (`Block` or
/// `Drop`) explicit at construction.
#[derive(Debug, Clone, Copy)]
pub struct ManagerOptions {
    pub overflow_policy: OverflowPolicy,
    pub mailbox_capacity: usize,
}

impl ManagerOptions {
    pub fn new(overflow_policy: OverflowPolicy) -> Self {
        Self {
            overflow_policy,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }
}

/// Process-wide registry, factory, and lifecycle coordinator for actors
/// (section 4.6.2).
pub struct Manager {
    graph: Arc<AgentGraph>,
    actors: Arc<Mutex<HashMap<AgentId, Actor>>>,
    registrations: RwLock<HashMap<String, Arc<AgentTypeRegistration>>>,
    dead_letter_tx: mpsc::UnboundedSender<DeadLetter>,
    dead_letter_rx: Mutex<mpsc::UnboundedReceiver<DeadLetter>>,
    options: ManagerOptions,
}

impl Manager {
    pub fn new(options: ManagerOptions) -> Self {
        let (dead_letter_tx, dead_letter_rx) = mpsc::unbounded_channel();
        Self {
            graph: Arc::new(AgentGraph::new()),
            actors: Arc::new(Mutex::new(HashMap::new())),
            registrations: RwLock::new(HashMap::new()),
            dead_letter_tx,
            dead_letter_rx: Mutex::new(dead_letter_rx),
            options,
        }
    }

    /// The shared parent/child graph backing the propagation engine (C5).
    pub fn graph(&self) -> Arc<AgentGraph> {
        self.graph.clone()
    }

    /// `register_agent_type<T,S>(config?)` (section 6): register an agent
    /// type under `type_name`, once per process. Calling this again for the
    /// same name replaces the prior registration — an outright conflict
    /// could instead be treated as a fatal configuration error, but
    /// re-registration during embedding-application startup (hot config
    /// reload, test setup) is common enough that this crate treats it as an
    /// explicit overwrite rather than a panic; callers that want the
    /// conflict to be fatal should check
    /// [`Manager::is_registered_type`] first.
    pub fn register_agent_type(&self, type_name: impl Into<String>, registration: AgentTypeRegistration) {
        self.registrations
            .write()
            .unwrap()
            .insert(type_name.into(), Arc::new(registration));
    }

    pub fn is_registered_type(&self, type_name: &str) -> bool {
        self.registrations.read().unwrap().contains_key(type_name)
    }

    /// Factory: `create<AgentType>(id) -> Actor` (section 4.6.2). Builds the
    /// kernel from the registration's closure, wraps it in an [`Actor`], and
    /// registers it. Fails with [`KernelError::Configuration`] if
    /// `type_name` was never registered.
    pub async fn create(&self, type_name: &str, id: AgentId) -> KernelResult<AgentId> {
        let registration = self
            .registrations
            .read()
            .unwrap()
            .get(type_name)
            .cloned()
            .ok_or_else(|| KernelError::Configuration(format!("agent type '{type_name}' is not registered")))?;

        let actor = (registration.factory)(
            id,
            self.graph.clone(),
            self.actors.clone(),
            self.options.overflow_policy,
            self.options.mailbox_capacity,
            self.dead_letter_tx.clone(),
        );
        self.actors.lock().await.insert(id, actor);
        Ok(id)
    }

    /// The Manager is the only authorized mutator of the graph (section
    /// 4.6.2): `set_parent` goes through it rather than `AgentGraph`
    /// directly so that parent/child consistency survives a failed or
    /// partial call from the embedding application.
    pub fn set_parent(&self, child: AgentId, parent: AgentId) -> KernelResult<()> {
        self.graph.set_parent(child, parent)
    }

    /// Hand an envelope to a registered agent's mailbox. Dead-letters it
    /// (`TargetMissing` / `MailboxOverflow`) and surfaces the matching
    /// [`RequestError`] if delivery is not possible.
    pub async fn dispatch(&self, target: AgentId, envelope: Envelope) -> Result<(), RequestError> {
        let actors = self.actors.lock().await;
        match actors.get(&target) {
            Some(actor) => actor.enqueue(envelope.clone()).await.map_err(|_| {
                let _ = self.dead_letter_tx.send(DeadLetter {
                    envelope,
                    target,
                    reason: DeadLetterReason::MailboxOverflow,
                });
                RequestError::Overflow(target)
            }),
            None => {
                warn!(%target, "dispatch target not registered");
                let _ = self.dead_letter_tx.send(DeadLetter {
                    envelope,
                    target,
                    reason: DeadLetterReason::TargetMissing,
                });
                Err(RequestError::TargetMissing(target))
            }
        }
    }

    /// Activate every currently registered actor concurrently. Actors
    /// already activate themselves as soon as [`Actor::spawn`] runs (so this
    /// is never strictly required to make a freshly created agent handle
    /// events), but it is kept as an explicit, idempotent lifecycle call for
    /// API parity and for embedding applications that
    /// want a single "now everything is live" synchronization point after a
    /// batch of `create` calls. Agents are independent (section 5), so
    /// there's no reason to activate them one at a time.
    pub async fn activate_all(&self) {
        let actors = self.actors.lock().await;
        futures::future::join_all(actors.values().map(|actor| actor.activate())).await;
    }

    /// Deactivate every registered actor concurrently, in arbitrary order.
    pub async fn deactivate_all(&self) {
        let actors = self.actors.lock().await;
        futures::future::join_all(actors.values().map(|actor| actor.deactivate())).await;
    }

    /// Deactivate and unregister a single agent, detaching it from the
    /// graph (orphaning its children, per [`AgentGraph::remove`]).
    pub async fn remove(&self, agent_id: AgentId) {
        if let Some(actor) = self.actors.lock().await.remove(&agent_id) {
            actor.deactivate().await;
        }
        self.graph.remove(agent_id);
    }

    pub async fn is_active(&self, agent_id: AgentId) -> bool {
        self.actors.lock().await.contains_key(&agent_id)
    }

    /// Drain everything currently buffered in the dead-letter sink.
    pub async fn drain_dead_letters(&self) -> Vec<DeadLetter> {
        let mut rx = self.dead_letter_rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(dead_letter) = rx.try_recv() {
            drained.push(dead_letter);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{build, BuildOptions, Direction};
    use crate::kernel::{DispatchContext, NoEvents, Persistence, Typed, TypedHandler};
    use crate::state_store::InMemoryStateStore;
    use async_trait::async_trait;
    use tokio::time::{sleep, Duration};

    #[derive(Debug, Default, Clone, PartialEq, prost::Message)]
    struct Counter {
        #[prost(int64, tag = "1")]
        count: i64,
    }

    #[derive(Debug, Clone, PartialEq, prost::Message)]
    struct IncrementEvent {
        #[prost(int64, tag = "1")]
        delta: i64,
    }

    impl Payload for IncrementEvent {
        const TYPE_NAME: &'static str = "test.v1.IncrementEvent";
    }

    struct IncrementHandler;

    #[async_trait]
    impl TypedHandler<Counter, IncrementEvent> for IncrementHandler {
        fn name(&self) -> &'static str {
            "IncrementHandler"
        }

        async fn handle(
            &self,
            payload: IncrementEvent,
            ctx: &mut DispatchContext<'_, Counter, NoEvents>,
        ) -> KernelResult<()> {
            ctx.state.count += payload.delta;
            Ok(())
        }
    }

    fn counter_registration(store: Arc<InMemoryStateStore<Counter>>) -> AgentTypeRegistration {
        AgentTypeRegistration::new("Counter", move |id| {
            let mut kernel = AgentKernel::new(id, "Counter", Persistence::Direct(store.clone()));
            kernel.register(Typed(IncrementHandler));
            kernel
        })
    }

    #[tokio::test]
    async fn create_fails_for_unregistered_type() {
        let manager = Manager::new(ManagerOptions::new(OverflowPolicy::Block));
        let result = manager.create("Counter", AgentId::new()).await;
        assert!(matches!(result, Err(KernelError::Configuration(_))));
    }

    #[tokio::test]
    async fn create_and_dispatch_routes_to_the_registered_agent() {
        let manager = Manager::new(ManagerOptions::new(OverflowPolicy::Block));
        manager.register_agent_type("Counter", counter_registration(Arc::new(InMemoryStateStore::new())));

        let id = AgentId::new();
        manager.create("Counter", id).await.unwrap();
        assert!(manager.is_active(id).await);

        let envelope = build(id, &IncrementEvent { delta: 4 }, Direction::Down, BuildOptions::default()).unwrap();
        manager.dispatch(id, envelope).await.unwrap();

        sleep(Duration::from_millis(50)).await;
        manager.deactivate_all().await;
    }

    #[tokio::test]
    async fn dispatch_to_missing_target_dead_letters() {
        let manager = Manager::new(ManagerOptions::new(OverflowPolicy::Block));
        let missing = AgentId::new();
        let envelope = build(missing, &IncrementEvent { delta: 1 }, Direction::Down, BuildOptions::default()).unwrap();

        let result = manager.dispatch(missing, envelope).await;
        assert!(matches!(result, Err(RequestError::TargetMissing(_))));

        let dead_letters = manager.drain_dead_letters().await;
        assert_eq!(dead_letters.len(), 1);
        assert!(matches!(dead_letters[0].reason, DeadLetterReason::TargetMissing));
    }

    #[tokio::test]
    async fn remove_detaches_agent_from_graph() {
        let manager = Manager::new(ManagerOptions::new(OverflowPolicy::Block));
        manager.register_agent_type("Counter", counter_registration(Arc::new(InMemoryStateStore::new())));

        let parent = AgentId::new();
        let child = AgentId::new();
        manager.create("Counter", parent).await.unwrap();
        manager.create("Counter", child).await.unwrap();
        manager.set_parent(child, parent).unwrap();

        manager.remove(parent).await;
        assert!(!manager.is_active(parent).await);
        assert_eq!(manager.graph().get_parent(child), None);
    }
}
