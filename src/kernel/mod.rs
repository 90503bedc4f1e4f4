// Copyright (c) 2025 - Cowboy AI, LLC.

//! Agent Kernel (C4)
//!
//! Per-agent state, handler discovery, dispatch, and lifecycle — the
//! hardest part of the runtime (section 4.4). One [`AgentKernel`] instance
//! lives behind each [`crate::actor::Actor`], which is what actually
//! guarantees the single-threaded dispatch this module assumes.

mod dedup;
mod dispatch_state;
mod handler;
mod retry;

pub use dedup::{DedupWindow, DEFAULT_DEDUP_WINDOW};
pub use dispatch_state::DispatchState;
pub use handler::{
    CatchAll, CatchAllHandler, DispatchContext, Handler, HandlerDescriptor, HandlerRegistry, NoConfig,
    NoEvents, Typed, TypedHandler,
};
pub use retry::RetryPolicy;

use crate::config::{AgentConfig, ConfigStore};
use crate::envelope::{Direction, Envelope, Payload};
use crate::error::{KernelError, KernelResult};
use crate::event_sourced::EventSourcedStore;
use crate::state_store::{AgentState, StateStore};
use crate::value_objects::AgentId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fully-qualified schema name for the error envelope published Up on a
/// non-retryable handler failure (section 4.4.5).
#[derive(Debug, Clone, PartialEq, prost::Message)]
pub struct AgentExceptionEvent {
    #[prost(string, tag = "1")]
    pub handler_name: String,
    #[prost(string, tag = "2")]
    pub error_kind: String,
    #[prost(string, tag = "3")]
    pub message: String,
    #[prost(string, tag = "4")]
    pub original_envelope_id: String,
}

impl Payload for AgentExceptionEvent {
    const TYPE_NAME: &'static str = "agent_kernel.v1.AgentExceptionEvent";
}

/// Activation/deactivation hooks an agent type may override.
#[async_trait]
pub trait LifecycleHooks<S: AgentState>: Send + Sync {
    async fn on_activate(&self, _state: &mut S) -> KernelResult<()> {
        Ok(())
    }

    async fn on_deactivate(&self, _state: &mut S) -> KernelResult<()> {
        Ok(())
    }
}

/// No-op hooks, the default for agent types that don't need them.
pub struct NoHooks;

impl<S: AgentState> LifecycleHooks<S> for NoHooks {}

/// Selects which of C2 (direct state store) or C3 (event-sourced) backs a
/// kernel instance.
pub enum Persistence<S: AgentState, E: Payload> {
    Direct(Arc<dyn StateStore<S>>),
    EventSourced(Arc<EventSourcedStore<S, E>>),
}

struct Inner<S, C> {
    dispatch_state: DispatchState,
    state: Option<S>,
    config: Option<C>,
    version: u64,
    dedup: DedupWindow,
}

/// The result of one [`AgentKernel::handle`] call: envelopes this agent
/// wants forwarded from its position, fed into [`crate::routing::forward`]
/// by the owning actor. Includes the received envelope itself (to continue
/// propagating it per its direction) plus anything handlers published.
pub struct DispatchOutcome {
    pub to_forward: Vec<Envelope>,
}

/// Soft/hard handler execution timeouts (section 5, "Timeouts").
///
/// Exceeding the soft timeout only logs a warning; exceeding the hard
/// timeout classifies the actor unhealthy but a running handler is never
/// forcibly terminated — user code cannot be mid-interrupted.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            soft_timeout: Duration::from_secs(30),
            hard_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Per-agent kernel: state + handler registry + dispatch (section 4.4).
pub struct AgentKernel<S: AgentState, E: Payload = NoEvents, C: AgentConfig = NoConfig> {
    id: AgentId,
    description: String,
    handlers: HandlerRegistry<S, E, C>,
    persistence: Persistence<S, E>,
    config_store: Option<Arc<dyn ConfigStore<C>>>,
    hooks: Arc<dyn LifecycleHooks<S>>,
    retry_policy: RetryPolicy,
    timeout_policy: TimeoutPolicy,
    unhealthy: std::sync::atomic::AtomicBool,
    inner: Mutex<Inner<S, C>>,
}

impl<S: AgentState, E: Payload, C: AgentConfig> AgentKernel<S, E, C> {
    pub fn new(id: AgentId, description: impl Into<String>, persistence: Persistence<S, E>) -> Self {
        Self::with_hooks(id, description, persistence, Arc::new(NoHooks))
    }

    pub fn with_hooks(
        id: AgentId,
        description: impl Into<String>,
        persistence: Persistence<S, E>,
        hooks: Arc<dyn LifecycleHooks<S>>,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            handlers: HandlerRegistry::new(),
            persistence,
            config_store: None,
            hooks,
            retry_policy: RetryPolicy::default(),
            timeout_policy: TimeoutPolicy::default(),
            unhealthy: std::sync::atomic::AtomicBool::new(false),
            inner: Mutex::new(Inner {
                dispatch_state: DispatchState::Created,
                state: None,
                config: None,
                version: 0,
                dedup: DedupWindow::default(),
            }),
        }
    }

    pub fn register(&mut self, handler: impl Handler<S, E, C> + 'static) -> &mut Self {
        self.handlers.register(handler);
        self
    }

    /// Bind a [`ConfigStore`] for this agent's `TConfig`. Loaded once at
    /// activation and again only via [`Self::reconfigure`] (section 3).
    pub fn set_config_store(&mut self, store: Arc<dyn ConfigStore<C>>) -> &mut Self {
        self.config_store = Some(store);
        self
    }

    pub fn set_timeout_policy(&mut self, policy: TimeoutPolicy) -> &mut Self {
        self.timeout_policy = policy;
        self
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) -> &mut Self {
        self.retry_policy = policy;
        self
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Agent-type supplied description, used for discovery and debugging
    /// (`get_description`, section 4.4.1).
    pub fn get_description(&self) -> &str {
        &self.description
    }

    /// Whether a prior handler invocation exceeded the hard timeout (section 5).
    pub fn is_unhealthy(&self) -> bool {
        self.unhealthy.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Idempotent: loads state, runs `on_activate`, transitions to Active.
    pub async fn activate(&self) -> KernelResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.dispatch_state != DispatchState::Created {
            return Ok(());
        }
        inner.dispatch_state = DispatchState::Activating;

        let (mut state, version) = match &self.persistence {
            Persistence::Direct(store) => (store.load(self.id).await?.unwrap_or_default(), 0),
            Persistence::EventSourced(es) => match es.load(self.id).await? {
                Some((state, version)) => (state, version),
                None => (S::default(), 0),
            },
        };

        self.hooks.on_activate(&mut state).await?;

        let config = match &self.config_store {
            Some(store) => store.load(self.id).await?,
            None => None,
        };

        inner.state = Some(state);
        inner.config = config;
        inner.version = version;
        inner.dispatch_state = DispatchState::Active;
        info!(agent_id = %self.id, "agent activated");
        Ok(())
    }

    /// Reload config from the bound [`ConfigStore`] outside of activation
    /// (section 3, "loaded once at activation and on explicit reconfigure
    /// calls"). A no-op if no store is bound.
    pub async fn reconfigure(&self) -> KernelResult<()> {
        let Some(store) = &self.config_store else {
            return Ok(());
        };
        let mut inner = self.inner.lock().await;
        inner.config = store.load(self.id).await?;
        info!(agent_id = %self.id, "agent reconfigured");
        Ok(())
    }

    /// Flushes pending events (none remain across calls in this design —
    /// each `handle` confirms its own batch), runs `on_deactivate`, saves
    /// state, transitions to Deactivated.
    pub async fn deactivate(&self) -> KernelResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.dispatch_state.is_terminal() {
            return Ok(());
        }
        inner.dispatch_state = DispatchState::Deactivating;
        if let Some(state) = inner.state.as_mut() {
            self.run_deactivation_hooks(state).await?;
        }
        inner.dispatch_state = DispatchState::Deactivated;
        info!(agent_id = %self.id, "agent deactivated");
        Ok(())
    }

    /// The `on_deactivate` hook plus, for the direct state-store path, a
    /// final save. Shared by [`Self::deactivate`] and the fatal-error
    /// shutdown branch of [`Self::handle`], which cannot call `deactivate`
    /// itself without deadlocking on the `inner` lock it already holds —
    /// taking `state` directly (rather than the whole `Inner`) lets the
    /// fatal-error branch reuse its already-borrowed `&mut S` in place.
    async fn run_deactivation_hooks(&self, state: &mut S) -> KernelResult<()> {
        self.hooks.on_deactivate(state).await?;
        if let Persistence::Direct(store) = &self.persistence {
            store.save(self.id, state).await?;
        }
        Ok(())
    }

    /// Dispatch algorithm (section 4.4.4). `cancel` is checked between
    /// handler invocations: a cancelled token still lets the in-flight
    /// handler run to completion, but skips any handlers still queued and
    /// drops their outgoing envelopes (section 5).
    pub async fn handle(&self, envelope: &Envelope, cancel: &CancellationToken) -> KernelResult<DispatchOutcome> {
        let mut inner = self.inner.lock().await;

        if !inner.dispatch_state.can_handle() {
            return Err(KernelError::Configuration(format!(
                "agent {} is not Active (state: {:?})",
                self.id, inner.dispatch_state
            )));
        }

        // Step 1: hop check.
        if envelope.exceeds_hop_bound() {
            return Ok(DispatchOutcome { to_forward: vec![] });
        }

        // Step 4: deduplication.
        if inner.dedup.contains(envelope.envelope_id) {
            return Ok(DispatchOutcome { to_forward: vec![] });
        }

        inner.dispatch_state = DispatchState::Handling;

        // Step 2: min-hop check.
        let skip_handlers = envelope.current_hop < envelope.min_hop;

        // Step 6: payload unpack / resolve type.
        let payload_type = envelope.payload_type_name().to_string();

        let mut outgoing = Vec::new();
        let mut pending_events: Vec<E> = Vec::new();
        let original_state = inner.state.clone();
        let mut cancelled = false;

        if !skip_handlers {
            let matching = self.handlers.matching(&payload_type);
            let Inner { state, config, dispatch_state, .. } = &mut *inner;
            let state = state.as_mut().expect("state loaded after activate");
            let config_ref = config.as_ref();

            for handler in matching {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }

                let descriptor = handler.descriptor();

                // Step 3: self-suppression.
                if !descriptor.allow_self_handling && envelope.is_self_suppressed(self.id) {
                    continue;
                }

                match self
                    .invoke_with_retry(handler.as_ref(), &descriptor, envelope, state, config_ref)
                    .await
                {
                    Ok((mut handler_outgoing, mut handler_events)) => {
                        outgoing.append(&mut handler_outgoing);
                        pending_events.append(&mut handler_events);
                    }
                    Err(KernelError::Fatal(agent_id, source)) => {
                        error!(agent_id = %self.id, handler = descriptor.name, %source, "fatal error, deactivating agent");
                        *dispatch_state = DispatchState::Deactivating;
                        if let Err(cleanup_err) = self.run_deactivation_hooks(state).await {
                            warn!(agent_id = %self.id, %cleanup_err, "cleanup failed during fatal-error shutdown");
                        }
                        *dispatch_state = DispatchState::Deactivated;
                        return Err(KernelError::Fatal(agent_id, source));
                    }
                    Err(err) => {
                        error!(agent_id = %self.id, handler = descriptor.name, %err, "handler raised non-retryable error");
                        outgoing.push(self.exception_envelope(&descriptor, envelope, &err)?);
                    }
                }
            }
        }

        if cancelled {
            warn!(agent_id = %self.id, envelope_id = %envelope.envelope_id, "dispatch cancelled, dropping outgoing envelopes");
            outgoing.clear();
        }

        // Step 8: state commit. Even a cancelled dispatch commits whatever
        // handlers already completed before the cancellation was observed.
        // Commit failures are retried with the same backoff policy as
        // handler invocation before propagating to the actor, which
        // dead-letters the envelope once retries are exhausted (section 7).
        match &self.persistence {
            Persistence::Direct(store) => {
                let changed = match (&original_state, inner.state.as_ref()) {
                    (Some(before), Some(after)) => before != after,
                    _ => inner.state.is_some(),
                };
                if changed {
                    if let Some(state) = inner.state.as_ref() {
                        self.commit_with_retry(|| store.save(self.id, state)).await?;
                    }
                }
            }
            Persistence::EventSourced(es) => {
                if !pending_events.is_empty() {
                    let current_state = inner.state.clone().unwrap_or_default();
                    let (new_state, new_version) = self
                        .commit_with_retry(|| {
                            es.confirm(self.id, &current_state, inner.version, pending_events.clone())
                        })
                        .await?;
                    inner.state = Some(new_state);
                    inner.version = new_version;
                }
            }
        }

        // Step 10: record in dedup window.
        inner.dedup.record(envelope.envelope_id);
        inner.dispatch_state = DispatchState::Active;

        if cancelled {
            return Ok(DispatchOutcome { to_forward: vec![] });
        }

        // Step 9: the received envelope continues propagating from here,
        // plus anything handlers published.
        let mut to_forward = vec![envelope.clone()];
        to_forward.append(&mut outgoing);

        Ok(DispatchOutcome { to_forward })
    }

    async fn invoke_with_retry(
        &self,
        handler: &dyn Handler<S, E, C>,
        descriptor: &HandlerDescriptor,
        envelope: &Envelope,
        state: &mut S,
        config: Option<&C>,
    ) -> KernelResult<(Vec<Envelope>, Vec<E>)> {
        let mut attempt = 0;
        loop {
            let mut ctx = DispatchContext::new(state, config, self.id);
            let result = self.run_with_timeouts(handler, envelope, &mut ctx, descriptor).await;
            let (outgoing, events) = ctx.into_parts();

            match result {
                Ok(()) => return Ok((outgoing, events)),
                Err(err) if err.is_retryable() && attempt < self.retry_policy.max_retries => {
                    attempt += 1;
                    let delay = retry::backoff(attempt, self.retry_policy.base_backoff);
                    warn!(agent_id = %self.id, handler = descriptor.name, attempt, ?delay, "retrying handler after error");
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Retries a state-commit operation (store save, event-sourced confirm)
    /// with the same backoff policy `invoke_with_retry` uses for handlers.
    /// These are distinct failure sources — a handler error happens inside
    /// the handler's own logic, a commit error happens in the kernel's save
    /// step after all handlers ran — so retrying both is not double-retrying
    /// the same failure.
    async fn commit_with_retry<T, F, Fut>(&self, mut op: F) -> KernelResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = KernelResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry_policy.max_retries => {
                    attempt += 1;
                    let delay = retry::backoff(attempt, self.retry_policy.base_backoff);
                    warn!(agent_id = %self.id, attempt, ?delay, "retrying state commit after error");
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs a single handler invocation to completion, logging a warning if
    /// it runs past the soft timeout and marking the kernel unhealthy if it
    /// runs past the hard timeout. Neither timeout interrupts the handler
    /// itself (section 5): user code is never mid-cancelled.
    async fn run_with_timeouts(
        &self,
        handler: &dyn Handler<S, E, C>,
        envelope: &Envelope,
        ctx: &mut DispatchContext<'_, S, E, C>,
        descriptor: &HandlerDescriptor,
    ) -> KernelResult<()> {
        let handler_fut = handler.handle(envelope, ctx);
        tokio::pin!(handler_fut);

        let soft_sleep = sleep(self.timeout_policy.soft_timeout);
        tokio::pin!(soft_sleep);
        let hard_sleep = sleep(self.timeout_policy.hard_timeout);
        tokio::pin!(hard_sleep);

        let mut soft_fired = false;
        let mut hard_fired = false;

        loop {
            tokio::select! {
                biased;
                result = &mut handler_fut => return result,
                _ = &mut soft_sleep, if !soft_fired => {
                    soft_fired = true;
                    warn!(agent_id = %self.id, handler = descriptor.name, soft_timeout = ?self.timeout_policy.soft_timeout, "handler exceeded soft timeout");
                }
                _ = &mut hard_sleep, if !hard_fired => {
                    hard_fired = true;
                    self.unhealthy.store(true, std::sync::atomic::Ordering::Relaxed);
                    error!(agent_id = %self.id, handler = descriptor.name, hard_timeout = ?self.timeout_policy.hard_timeout, "handler exceeded hard timeout, marking agent unhealthy");
                }
            }
        }
    }

    fn exception_envelope(
        &self,
        descriptor: &HandlerDescriptor,
        envelope: &Envelope,
        err: &KernelError,
    ) -> KernelResult<Envelope> {
        let event = AgentExceptionEvent {
            handler_name: descriptor.name.to_string(),
            error_kind: format!("{err:?}"),
            message: err.to_string(),
            original_envelope_id: envelope.envelope_id.to_string(),
        };
        crate::envelope::build(self.id, &event, Direction::Up, crate::envelope::BuildOptions::default())
            .map_err(KernelError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{build, BuildOptions};
    use crate::state_store::InMemoryStateStore;

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

    fn envelope(publisher: AgentId, delta: i64) -> Envelope {
        build(publisher, &IncrementEvent { delta }, Direction::Down, BuildOptions::default()).unwrap()
    }

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn three_increments_sum_to_six_and_persist() {
        let store = Arc::new(InMemoryStateStore::<Counter>::new());
        let id = AgentId::new();
        let mut kernel = AgentKernel::new(id, "Counter", Persistence::Direct(store.clone()));
        kernel.register(Typed(IncrementHandler));
        kernel.activate().await.unwrap();

        for delta in [1, 2, 3] {
            kernel.handle(&envelope(id, delta), &no_cancel()).await.unwrap();
        }

        let state = store.load(id).await.unwrap().unwrap();
        assert_eq!(state.count, 6);
    }

    #[tokio::test]
    async fn duplicate_envelope_id_is_idempotent() {
        let store = Arc::new(InMemoryStateStore::<Counter>::new());
        let id = AgentId::new();
        let mut kernel = AgentKernel::new(id, "Counter", Persistence::Direct(store.clone()));
        kernel.register(Typed(IncrementHandler));
        kernel.activate().await.unwrap();

        let env = envelope(id, 5);
        kernel.handle(&env, &no_cancel()).await.unwrap();
        kernel.handle(&env, &no_cancel()).await.unwrap();

        let state = store.load(id).await.unwrap().unwrap();
        assert_eq!(state.count, 5);
    }

    #[tokio::test]
    async fn handle_before_activate_is_rejected() {
        let store = Arc::new(InMemoryStateStore::<Counter>::new());
        let id = AgentId::new();
        let mut kernel = AgentKernel::new(id, "Counter", Persistence::Direct(store));
        kernel.register(Typed(IncrementHandler));
        let result = kernel.handle(&envelope(id, 1), &no_cancel()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn min_hop_skips_handler_but_still_forwards() {
        let store = Arc::new(InMemoryStateStore::<Counter>::new());
        let id = AgentId::new();
        let mut kernel = AgentKernel::new(id, "Counter", Persistence::Direct(store.clone()));
        kernel.register(Typed(IncrementHandler));
        kernel.activate().await.unwrap();

        let mut env = envelope(id, 1);
        env.min_hop = 5;
        let outcome = kernel.handle(&env, &no_cancel()).await.unwrap();
        assert_eq!(outcome.to_forward.len(), 1);

        let state = store.load(id).await.unwrap().unwrap();
        assert_eq!(state.count, 0);
    }

    #[tokio::test]
    async fn cancelled_token_skips_handlers_and_drops_outgoing() {
        let store = Arc::new(InMemoryStateStore::<Counter>::new());
        let id = AgentId::new();
        let mut kernel = AgentKernel::new(id, "Counter", Persistence::Direct(store.clone()));
        kernel.register(Typed(IncrementHandler));
        kernel.activate().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = kernel.handle(&envelope(id, 1), &cancel).await.unwrap();
        assert!(outcome.to_forward.is_empty());

        let state = store.load(id).await.unwrap().unwrap();
        assert_eq!(state.count, 0);
    }

    #[tokio::test]
    async fn reconfigure_with_no_bound_store_is_a_noop() {
        let store = Arc::new(InMemoryStateStore::<Counter>::new());
        let id = AgentId::new();
        let kernel = AgentKernel::new(id, "Counter", Persistence::Direct(store));
        kernel.reconfigure().await.unwrap();
    }

    /// A [`StateStore`] that fails the first `fail_count` saves with a
    /// retryable error, then delegates to an in-memory store.
    struct FlakyStateStore {
        inner: InMemoryStateStore<Counter>,
        fail_count: std::sync::atomic::AtomicU32,
    }

    impl FlakyStateStore {
        fn new(fail_count: u32) -> Self {
            Self {
                inner: InMemoryStateStore::new(),
                fail_count: std::sync::atomic::AtomicU32::new(fail_count),
            }
        }
    }

    #[async_trait]
    impl StateStore<Counter> for FlakyStateStore {
        async fn load(&self, agent_id: AgentId) -> KernelResult<Option<Counter>> {
            self.inner.load(agent_id).await
        }

        async fn save(&self, agent_id: AgentId, state: &Counter) -> KernelResult<()> {
            if self
                .fail_count
                .fetch_update(std::sync::atomic::Ordering::SeqCst, std::sync::atomic::Ordering::SeqCst, |n| {
                    (n > 0).then_some(n - 1)
                })
                .is_ok()
            {
                return Err(KernelError::Transient("store unavailable".into()));
            }
            self.inner.save(agent_id, state).await
        }

        async fn delete(&self, agent_id: AgentId) -> KernelResult<()> {
            self.inner.delete(agent_id).await
        }

        async fn exists(&self, agent_id: AgentId) -> KernelResult<bool> {
            self.inner.exists(agent_id).await
        }
    }

    #[tokio::test]
    async fn commit_retries_transient_store_errors_before_succeeding() {
        let store = Arc::new(FlakyStateStore::new(2));
        let id = AgentId::new();
        let mut kernel = AgentKernel::new(id, "Counter", Persistence::Direct(store.clone()));
        kernel.register(Typed(IncrementHandler));
        kernel.set_retry_policy(RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(1),
        });
        kernel.activate().await.unwrap();

        kernel.handle(&envelope(id, 4), &no_cancel()).await.unwrap();

        let state = store.load(id).await.unwrap().unwrap();
        assert_eq!(state.count, 4);
    }

    #[tokio::test]
    async fn commit_propagates_after_exhausting_retries() {
        let store = Arc::new(FlakyStateStore::new(100));
        let id = AgentId::new();
        let mut kernel = AgentKernel::new(id, "Counter", Persistence::Direct(store));
        kernel.register(Typed(IncrementHandler));
        kernel.set_retry_policy(RetryPolicy {
            max_retries: 2,
            base_backoff: Duration::from_millis(1),
        });
        kernel.activate().await.unwrap();

        let result = kernel.handle(&envelope(id, 1), &no_cancel()).await;
        assert!(result.is_err());
    }

    struct FatalHandler;

    #[async_trait]
    impl TypedHandler<Counter, IncrementEvent> for FatalHandler {
        fn name(&self) -> &'static str {
            "FatalHandler"
        }

        async fn handle(
            &self,
            _payload: IncrementEvent,
            _ctx: &mut DispatchContext<'_, Counter, NoEvents>,
        ) -> KernelResult<()> {
            Err(KernelError::Fatal(AgentId::new(), "corrupt state".into()))
        }
    }

    #[tokio::test]
    async fn fatal_error_runs_deactivate_hook_and_saves_state_before_deactivating() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct DeactivateFlag(Arc<AtomicBool>);

        #[async_trait]
        impl LifecycleHooks<Counter> for DeactivateFlag {
            async fn on_deactivate(&self, _state: &mut Counter) -> KernelResult<()> {
                self.0.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let store = Arc::new(InMemoryStateStore::<Counter>::new());
        let id = AgentId::new();
        let called = Arc::new(AtomicBool::new(false));
        let mut kernel = AgentKernel::with_hooks(
            id,
            "Counter",
            Persistence::Direct(store.clone()),
            Arc::new(DeactivateFlag(called.clone())),
        );
        kernel.register(Typed(FatalHandler));
        kernel.activate().await.unwrap();

        let result = kernel.handle(&envelope(id, 1), &no_cancel()).await;
        assert!(matches!(result, Err(KernelError::Fatal(..))));
        assert!(called.load(Ordering::SeqCst));
    }
}
