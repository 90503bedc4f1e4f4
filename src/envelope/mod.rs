// Copyright (c) 2025 - Cowboy AI, LLC.

//! Event & Envelope Model (C1)
//!
//! The [`Envelope`] is the immutable record carrying a typed payload plus
//! routing metadata across the parent/child agent graph. Envelopes are
//! freely cloneable; only `publishers`, `current_hop`, and `direction`
//! mutate when the propagation engine retransmits a copy (see
//! [`crate::routing`]).

mod direction;
mod payload;

pub use direction::Direction;
pub use payload::{pack, type_name, unpack, Payload};

use crate::error::ValidationError;
use crate::value_objects::AgentId;
use crate::wire;
use chrono::{DateTime, Utc};
use prost_types::Any;
use std::collections::HashMap;
use uuid::Uuid;

/// Hop bound meaning "unbounded" (no maximum).
pub const UNBOUNDED_HOP: i32 = -1;

/// The typed-payload envelope carrying routing metadata (section 3).
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub envelope_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub schema_version: i32,
    pub payload: Any,
    pub publisher_id: AgentId,
    pub publishers: Vec<AgentId>,
    pub direction: Direction,
    pub current_hop: i32,
    pub max_hop: i32,
    pub min_hop: i32,
    pub correlation_id: Option<Uuid>,
    pub metadata: HashMap<String, String>,
}

/// Optional parameters for [`build`]: `max_hop=-1, min_hop=0,
/// correlation_id=None` unless overridden.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub max_hop: Option<i32>,
    pub min_hop: Option<i32>,
    pub correlation_id: Option<Uuid>,
    pub metadata: HashMap<String, String>,
}

/// Build a new envelope from a typed payload.
///
/// `publisher_id` is the agent first emitting it; `publishers` starts empty
/// and gains an entry each time the propagation engine forwards a copy.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidHop`] if `max_hop` or `min_hop` is
/// negative and not the unbounded sentinel `-1`.
pub fn build<T: Payload>(
    publisher_id: AgentId,
    payload: &T,
    direction: Direction,
    options: BuildOptions,
) -> Result<Envelope, ValidationError> {
    let max_hop = options.max_hop.unwrap_or(UNBOUNDED_HOP);
    let min_hop = options.min_hop.unwrap_or(0);
    validate_hop(max_hop)?;
    if min_hop < 0 {
        return Err(ValidationError::InvalidHop(min_hop));
    }

    Ok(Envelope {
        envelope_id: Uuid::now_v7(),
        timestamp: Utc::now(),
        schema_version: 1,
        payload: pack(payload),
        publisher_id,
        publishers: Vec::new(),
        direction,
        current_hop: 0,
        max_hop,
        min_hop,
        correlation_id: options.correlation_id,
        metadata: options.metadata,
    })
}

fn validate_hop(hop: i32) -> Result<(), ValidationError> {
    if hop < 0 && hop != UNBOUNDED_HOP {
        return Err(ValidationError::InvalidHop(hop));
    }
    Ok(())
}

impl Envelope {
    /// Decode the typed payload, failing if it does not match `T`.
    pub fn payload_as<T: Payload>(&self) -> Result<T, ValidationError> {
        unpack(&self.payload)
    }

    /// Schema type name of the carried payload.
    pub fn payload_type_name(&self) -> &str {
        type_name(&self.payload)
    }

    /// Whether `current_hop` has exceeded `max_hop` (4.4.4 step 1 / 4.5.3 step 2).
    ///
    /// The effective ceiling is never less than 1: a publish always reaches
    /// the immediate target set for its direction (one hop) even when
    /// `max_hop=0`, since `max_hop` bounds further re-propagation beyond the
    /// direct neighbors, not the direct delivery itself (the `max_hop=0`
    /// Up boundary case: the parent still receives and does not re-forward).
    pub fn exceeds_hop_bound(&self) -> bool {
        self.max_hop != UNBOUNDED_HOP && self.current_hop > self.max_hop.max(1)
    }

    /// Whether a handler with `allow_self_handling = false` must skip this
    /// envelope because `self_id` published or re-published it (4.4.4 step 3).
    pub fn is_self_suppressed(&self, self_id: AgentId) -> bool {
        self.publisher_id == self_id || self.publishers.contains(&self_id)
    }

    /// Return a copy prepared for forwarding to one more hop: `publisher`
    /// appended to `publishers`, `current_hop` incremented, and `direction`
    /// set to the direction the receiving hop should see.
    pub fn forwarded(&self, publisher: AgentId, direction: Direction) -> Envelope {
        let mut next = self.clone();
        if !next.publishers.contains(&publisher) {
            next.publishers.push(publisher);
        }
        next.current_hop += 1;
        next.direction = direction;
        next
    }

    /// Convert to the wire representation compiled from `agent_runtime.proto`.
    pub fn to_wire(&self) -> wire::Envelope {
        wire::Envelope {
            envelope_id: self.envelope_id.to_string(),
            timestamp_ms: self.timestamp.timestamp_millis(),
            schema_version: self.schema_version,
            payload: Some(self.payload.clone()),
            publisher_id: self.publisher_id.to_string(),
            publishers: self.publishers.iter().map(ToString::to_string).collect(),
            direction: wire::Direction::from(self.direction) as i32,
            current_hop: self.current_hop,
            max_hop: self.max_hop,
            min_hop: self.min_hop,
            correlation_id: self.correlation_id.map(|c| c.to_string()).unwrap_or_default(),
            metadata: self.metadata.clone(),
        }
    }

    /// Reconstruct an envelope decoded off the wire.
    pub fn from_wire(w: wire::Envelope) -> Result<Envelope, ValidationError> {
        let direction = wire::Direction::try_from(w.direction)
            .map_err(|_| ValidationError::InvalidPayload)?
            .into();
        Ok(Envelope {
            envelope_id: Uuid::parse_str(&w.envelope_id).map_err(|_| ValidationError::InvalidPayload)?,
            timestamp: DateTime::from_timestamp_millis(w.timestamp_ms)
                .ok_or(ValidationError::InvalidPayload)?,
            schema_version: w.schema_version,
            payload: w.payload.ok_or(ValidationError::InvalidPayload)?,
            publisher_id: w
                .publisher_id
                .parse()
                .map_err(|_| ValidationError::InvalidPayload)?,
            publishers: w
                .publishers
                .iter()
                .map(|p| p.parse())
                .collect::<Result<_, _>>()
                .map_err(|_| ValidationError::InvalidPayload)?,
            direction,
            current_hop: w.current_hop,
            max_hop: w.max_hop,
            min_hop: w.min_hop,
            correlation_id: if w.correlation_id.is_empty() {
                None
            } else {
                Some(Uuid::parse_str(&w.correlation_id).map_err(|_| ValidationError::InvalidPayload)?)
            },
            metadata: w.metadata,
        })
    }
}
