// Copyright (c) 2025 - Cowboy AI, LLC.

//! Error taxonomy for the agent kernel.
//!
//! Kinds are grouped by how they should be handled: configuration
//! errors are fatal at startup, validation errors are dropped and counted,
//! concurrency and transient I/O errors are retried, handler errors are
//! classified retryable/non-retryable, and fatal errors deactivate the
//! agent and dead-letter the envelope that triggered them.

use crate::value_objects::AgentId;

/// Result type used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors raised by the agent kernel, stores, and routing engine.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A required collaborator (state store, event store) was not configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An envelope or payload failed validation and was dropped.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An event-store append failed its optimistic-concurrency check.
    #[error("concurrency conflict for {agent_id}: expected version {expected}, store is at {actual}")]
    ConcurrencyConflict {
        agent_id: AgentId,
        expected: u64,
        actual: u64,
    },

    /// A store or mailbox operation failed for a reason that may clear on retry.
    #[error("transient I/O error: {0}")]
    Transient(String),

    /// A handler raised an error while processing an envelope.
    #[error("handler error in {handler}: {source}")]
    Handler {
        handler: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        retryable: bool,
    },

    /// State is corrupt or undecodable; the agent must be deactivated.
    #[error("fatal error for agent {0}: {1}")]
    Fatal(
        AgentId,
        #[source] Box<dyn std::error::Error + Send + Sync>,
    ),

    /// No agent exists under this ID.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// set_parent would introduce a cycle or self-parenting.
    #[error("invalid graph operation: {0}")]
    InvalidGraph(String),
}

impl KernelError {
    /// Whether the retry policy should attempt this error again.
    ///
    /// Transient I/O and concurrency conflicts are retryable; handler errors
    /// carry their own classification; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            KernelError::Transient(_) => true,
            KernelError::ConcurrencyConflict { .. } => true,
            KernelError::Handler { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Whether this error is classified Fatal (state corruption, schema decode
    /// failure on persisted data) and must deactivate the agent.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KernelError::Fatal(..))
    }
}

/// Validation failures for envelope construction (C1).
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A payload was supplied without a resolvable schema type name.
    #[error("payload carries no schema descriptor")]
    InvalidPayload,

    /// `max_hop` or `min_hop` was negative and not the unbounded sentinel (-1).
    #[error("invalid hop value: {0}")]
    InvalidHop(i32),

    /// A payload's schema type name was not found in the registry at receive time.
    #[error("unknown payload type: {0}")]
    UnknownPayloadType(String),
}

/// User-visible outcomes of `publish_and_wait` (section 7).
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request timed out waiting for a reply")]
    Timeout,
    #[error("request was cancelled")]
    Cancelled,
    #[error("target agent {0} is not registered")]
    TargetMissing(AgentId),
    #[error("mailbox overflow delivering to {0}")]
    Overflow(AgentId),
    #[error("remote agent returned an error: {0}")]
    RemoteError(String),
}
