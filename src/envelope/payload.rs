// Copyright (c) 2025 - Cowboy AI, LLC.

//! Typed payloads carried by an [`Envelope`](super::Envelope).
//!
//! A payload is any `prost::Message` that declares a stable, fully-qualified
//! schema type name. That name becomes the `type_url` of the
//! `google.protobuf.Any` wrapper the wire format requires, so a receiver can
//! resolve the concrete Rust type from a registry populated at agent-type
//! registration time (design notes, section 9) without any shared
//! compile-time knowledge of the sender.

use crate::error::ValidationError;
use prost::Message;
use prost_types::Any;

/// A schema-described message that can travel inside an [`Envelope`](super::Envelope).
pub trait Payload: Message + Default + Clone + 'static {
    /// Fully-qualified schema name, e.g. `"myapp.events.v1.IncrementEvent"`.
    const TYPE_NAME: &'static str;
}

const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

/// Encode a typed payload into the wire's `arbitrary-message-wrapper` (`Any`).
pub fn pack<T: Payload>(payload: &T) -> Any {
    Any {
        type_url: format!("{TYPE_URL_PREFIX}{}", T::TYPE_NAME),
        value: payload.encode_to_vec(),
    }
}

/// Decode a typed payload back out of an `Any`, failing if the wrapped type
/// name does not match `T::TYPE_NAME`.
pub fn unpack<T: Payload>(any: &Any) -> Result<T, ValidationError> {
    if type_name(any) != T::TYPE_NAME {
        return Err(ValidationError::UnknownPayloadType(type_name(any).to_string()));
    }
    T::decode(any.value.as_slice()).map_err(|_| ValidationError::InvalidPayload)
}

/// Extract the schema type name from an `Any`'s `type_url`.
pub fn type_name(any: &Any) -> &str {
    any.type_url
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(any.type_url.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Ping {
        #[prost(string, tag = "1")]
        message: String,
    }

    impl Payload for Ping {
        const TYPE_NAME: &'static str = "test.v1.Ping";
    }

    #[test]
    fn pack_unpack_round_trips() {
        let ping = Ping {
            message: "hello".to_string(),
        };
        let any = pack(&ping);
        assert_eq!(type_name(&any), "test.v1.Ping");
        let back: Ping = unpack(&any).unwrap();
        assert_eq!(back, ping);
    }

    #[test]
    fn unpack_rejects_mismatched_type() {
        #[derive(Clone, PartialEq, prost::Message)]
        struct Other {
            #[prost(int32, tag = "1")]
            n: i32,
        }
        impl Payload for Other {
            const TYPE_NAME: &'static str = "test.v1.Other";
        }

        let any = pack(&Other { n: 1 });
        let result: Result<Ping, _> = unpack(&any);
        assert!(result.is_err());
    }
}
