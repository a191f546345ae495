// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payload Encodings
//!
//! Two wire encodings are supported. [`JsonCodec`] is self-describing text;
//! [`BincodeCodec`] is compact binary and needs producer and consumer to agree
//! on the payload type. Each codec carries the content-type tag stamped on
//! published messages. Consumers never dispatch on that tag: the subscription
//! variant decides how a payload is decoded.

use crate::errors::AmqpError;
use serde::{de::DeserializeOwned, Serialize};

/// Content type tag of JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type tag of binary messages, shared with existing peers
pub const BINARY_CONTENT_TYPE: &str = "application/gob";

/// Converts typed payloads to message bodies and back.
pub trait Codec: Send + Sync + 'static {
    /// Tag published as the message content type.
    const CONTENT_TYPE: &'static str;

    /// Serializes a value into a message body.
    ///
    /// # Errors
    /// `AmqpError::EncodeError` when the value cannot be represented.
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, AmqpError>;

    /// Deserializes a message body.
    ///
    /// # Errors
    /// `AmqpError::DecodeError` when the body is malformed or does not match `T`.
    fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, AmqpError>;
}

/// JSON text encoding, via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    const CONTENT_TYPE: &'static str = JSON_CONTENT_TYPE;

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(value).map_err(|err| AmqpError::EncodeError(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, AmqpError> {
        serde_json::from_slice(data).map_err(|err| AmqpError::DecodeError(err.to_string()))
    }
}

/// Compact binary encoding, via `bincode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    const CONTENT_TYPE: &'static str = BINARY_CONTENT_TYPE;

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, AmqpError> {
        bincode::serialize(value).map_err(|err| AmqpError::EncodeError(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, AmqpError> {
        bincode::deserialize(data).map_err(|err| AmqpError::DecodeError(err.to_string()))
    }
}
