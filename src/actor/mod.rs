// Copyright (c) 2025 - Cowboy AI, LLC.

//! Actor wrapper (C6)
//!
//! Wraps an [`AgentKernel`] in a bounded, single-reader mailbox so that at
//! most one envelope is processed at a time for that agent (section 4.6.1).
//! The actor loop is the thing that actually makes the kernel's "no
//! concurrent handler" invariant true — the kernel itself only assumes it.

use crate::config::AgentConfig;
use crate::envelope::{Envelope, Payload};
use crate::error::{KernelError, KernelResult, RequestError};
use crate::graph::AgentGraph;
use crate::kernel::AgentKernel;
use crate::manager::{DeadLetter, DeadLetterReason};
use crate::routing;
use crate::state_store::AgentState;
use crate::value_objects::AgentId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

/// Backpressure policy when a target's mailbox is full (section 4.5.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Block the sender until space frees up (the cooperative-scheduler default).
    Block,
    /// Drop the envelope and report an `OverflowEvent` to the Manager.
    Drop,
}

enum Command {
    Handle(Envelope, CancellationToken),
    Activate(oneshot::Sender<()>),
    Deactivate(oneshot::Sender<()>),
}

/// A single pending `publish_and_wait` reply, keyed by `correlation_id`.
type ReplyWaiters = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Envelope>>>>;

/// Per-agent actor: owns the mailbox and runs the dequeue -> `kernel.handle`
/// -> forward loop.
pub struct Actor {
    id: AgentId,
    mailbox: mpsc::Sender<Command>,
    overflow_policy: OverflowPolicy,
    waiters: ReplyWaiters,
    dead_letters: Option<mpsc::UnboundedSender<DeadLetter>>,
}

impl Actor {
    /// Spawn the actor loop for an already-constructed kernel. `graph` and
    /// `neighbors` let the loop resolve forwarding targets and deliver to
    /// them without going through the Manager for every hop. `dead_letters`,
    /// when set, receives envelopes this actor could not deliver or process
    /// (section 7).
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<S, E, C>(
        kernel: Arc<AgentKernel<S, E, C>>,
        graph: Arc<AgentGraph>,
        neighbors: Arc<Mutex<HashMap<AgentId, Actor>>>,
        overflow_policy: OverflowPolicy,
        mailbox_capacity: usize,
        dead_letters: Option<mpsc::UnboundedSender<DeadLetter>>,
    ) -> Actor
    where
        S: AgentState,
        E: Payload,
        C: AgentConfig,
    {
        let (tx, mut rx) = mpsc::channel(mailbox_capacity);
        let waiters: ReplyWaiters = Arc::new(Mutex::new(HashMap::new()));
        let id = kernel.id();

        let loop_waiters = waiters.clone();
        let loop_dead_letters = dead_letters.clone();
        tokio::spawn(async move {
            kernel.activate().await.ok();

            while let Some(command) = rx.recv().await {
                match command {
                    Command::Handle(envelope, cancel) => {
                        if let Some(correlation_id) = envelope.correlation_id {
                            let mut waiters = loop_waiters.lock().await;
                            if let Some(reply_tx) = waiters.remove(&correlation_id) {
                                let _ = reply_tx.send(envelope.clone());
                            }
                        }

                        match kernel.handle(&envelope, &cancel).await {
                            Ok(outcome) => {
                                for to_forward in outcome.to_forward {
                                    let deliveries = routing::forward(&to_forward, id, &graph);
                                    let neighbors = neighbors.lock().await;
                                    for (target, forwarded) in deliveries {
                                        match neighbors.get(&target) {
                                            Some(actor) => {
                                                if let Err(err) = actor.enqueue(forwarded.clone()).await {
                                                    warn!(%target, %err, "forward delivery failed");
                                                    if let Some(tx) = &loop_dead_letters {
                                                        let _ = tx.send(DeadLetter {
                                                            envelope: forwarded,
                                                            target,
                                                            reason: DeadLetterReason::MailboxOverflow,
                                                        });
                                                    }
                                                }
                                            }
                                            None => {
                                                if let Some(tx) = &loop_dead_letters {
                                                    let _ = tx.send(DeadLetter {
                                                        envelope: forwarded,
                                                        target,
                                                        reason: DeadLetterReason::TargetMissing,
                                                    });
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                            Err(err) => {
                                error!(agent_id = %id, %err, "kernel.handle failed; envelope dropped from this actor's view");
                                if let Some(tx) = &loop_dead_letters {
                                    let _ = tx.send(DeadLetter {
                                        envelope,
                                        target: id,
                                        reason: DeadLetterReason::HandlerFailed(err.to_string()),
                                    });
                                }
                            }
                        }
                    }
                    Command::Activate(done) => {
                        if let Err(err) = kernel.activate().await {
                            error!(agent_id = %id, %err, "activate failed");
                        }
                        let _ = done.send(());
                    }
                    Command::Deactivate(done) => {
                        kernel.deactivate().await.ok();
                        let _ = done.send(());
                        break;
                    }
                }
            }
        });

        Actor {
            id,
            mailbox: tx,
            overflow_policy,
            waiters,
            dead_letters,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Place an envelope into the mailbox with a fresh cancellation token.
    /// Returns once queued.
    pub async fn enqueue(&self, envelope: Envelope) -> KernelResult<()> {
        self.enqueue_with_cancel(envelope, CancellationToken::new()).await
    }

    /// Like [`Self::enqueue`], but lets the caller retain `cancel` to
    /// request cancellation of this dispatch once it starts running
    /// (section 5).
    pub async fn enqueue_with_cancel(&self, envelope: Envelope, cancel: CancellationToken) -> KernelResult<()> {
        match self.overflow_policy {
            OverflowPolicy::Block => self
                .mailbox
                .send(Command::Handle(envelope, cancel))
                .await
                .map_err(|_| KernelError::Transient("actor mailbox closed".into())),
            OverflowPolicy::Drop => self
                .mailbox
                .try_send(Command::Handle(envelope, cancel))
                .map_err(|_| KernelError::Transient("mailbox full; envelope dropped per overflow policy".into())),
        }
    }

    /// Enqueue, then await a reply envelope keyed by `correlation_id`
    /// (section 4.6.1). Honors `timeout`.
    pub async fn publish_and_wait(
        &self,
        envelope: Envelope,
        request_timeout: Duration,
    ) -> Result<Envelope, RequestError> {
        let correlation_id = envelope.correlation_id.ok_or(RequestError::Cancelled)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.waiters.lock().await.insert(correlation_id, reply_tx);

        self.enqueue(envelope)
            .await
            .map_err(|_| RequestError::TargetMissing(self.id))?;

        match timeout(request_timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RequestError::Cancelled),
            Err(_) => {
                self.waiters.lock().await.remove(&correlation_id);
                Err(RequestError::Timeout)
            }
        }
    }

    /// Re-invoke activation on the underlying kernel. Harmless to call more
    /// than once: [`AgentKernel::activate`] is idempotent, and `spawn`
    /// already activates once before the loop starts. Exposed so
    /// [`crate::manager::Manager::activate_all`] has something concrete to
    /// drive (section 4.6.2).
    pub async fn activate(&self) {
        let (tx, rx) = oneshot::channel();
        if self.mailbox.send(Command::Activate(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn deactivate(&self) {
        let (tx, rx) = oneshot::channel();
        if self.mailbox.send(Command::Deactivate(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}
