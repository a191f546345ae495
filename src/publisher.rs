// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Typed Publishing
//!
//! Serializes a value with one of the two codecs and publishes it to an
//! exchange. Messages are always persistent, tagged with the codec's content
//! type and a fresh message id, and carry the current trace context in their
//! headers. Publishing is not buffered: the call returns once the broker has
//! taken the write, or with the error it raised.

use crate::{
    codec::{BincodeCodec, Codec, JsonCodec},
    errors::AmqpError,
    otel,
};
use lapin::{
    options::BasicPublishOptions,
    publisher_confirm::Confirmation,
    types::{FieldTable, ShortString},
    BasicProperties, Channel,
};
use opentelemetry::Context;
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

/// AMQP delivery mode for messages that survive a broker restart
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Builds the properties stamped on every published message.
pub fn message_properties(content_type: &str, headers: FieldTable) -> BasicProperties {
    BasicProperties::default()
        .with_content_type(ShortString::from(content_type))
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(headers)
}

/// Publishes `value` as JSON.
///
/// # Parameters
/// * `channel` - An open channel
/// * `exchange` - Target exchange
/// * `key` - Routing key
/// * `value` - Payload to serialize
///
/// # Returns
/// Ok(()) once the broker accepted the message, `AmqpError::EncodeError` when
/// the value cannot be serialized, `AmqpError::PublishingError` when the
/// broker write fails
pub async fn publish_json<T: Serialize>(
    channel: &Channel,
    exchange: &str,
    key: &str,
    value: &T,
) -> Result<(), AmqpError> {
    publish::<JsonCodec, T>(channel, exchange, key, value).await
}

/// Publishes `value` with the binary encoding. Same contract as [`publish_json`].
pub async fn publish_bincode<T: Serialize>(
    channel: &Channel,
    exchange: &str,
    key: &str,
    value: &T,
) -> Result<(), AmqpError> {
    publish::<BincodeCodec, T>(channel, exchange, key, value).await
}

/// Publishes `value` encoded with codec `C`.
pub async fn publish<C: Codec, T: Serialize>(
    channel: &Channel,
    exchange: &str,
    key: &str,
    value: &T,
) -> Result<(), AmqpError> {
    let body = C::encode(value).map_err(|err| {
        error!(error = err.to_string(), exchange, key, "error encoding message");
        err
    })?;

    let headers = otel::injected_headers(&Context::current());

    let confirm = match channel
        .basic_publish(
            exchange,
            key,
            BasicPublishOptions {
                mandatory: false,
                immediate: false,
            },
            &body,
            message_properties(C::CONTENT_TYPE, headers),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), exchange, key, "error publishing message");
            Err(AmqpError::PublishingError(err.to_string()))
        }
        Ok(confirm) => Ok(confirm),
    }?;

    match confirm.await {
        Err(err) => {
            error!(error = err.to_string(), exchange, key, "error publishing message");
            Err(AmqpError::PublishingError(err.to_string()))
        }
        Ok(Confirmation::Nack(_)) => {
            error!(exchange, key, "message rejected by the broker");
            Err(AmqpError::PublishingError(format!(
                "message to `{}` with key `{}` rejected by the broker",
                exchange, key
            )))
        }
        Ok(_) => {
            debug!(exchange, key, content_type = C::CONTENT_TYPE, "message published");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BINARY_CONTENT_TYPE, JSON_CONTENT_TYPE};

    #[test]
    fn messages_are_persistent_and_tagged() {
        let props = message_properties(JSON_CONTENT_TYPE, FieldTable::default());

        assert_eq!(*props.delivery_mode(), Some(PERSISTENT_DELIVERY_MODE));
        assert_eq!(
            props.content_type().as_ref().map(|ct| ct.as_str()),
            Some(JSON_CONTENT_TYPE)
        );
    }

    #[test]
    fn binary_messages_carry_their_own_tag() {
        let props = message_properties(BINARY_CONTENT_TYPE, FieldTable::default());

        assert_eq!(
            props.content_type().as_ref().map(|ct| ct.as_str()),
            Some(BINARY_CONTENT_TYPE)
        );
    }

    #[test]
    fn every_message_gets_a_distinct_id() {
        let first = message_properties(JSON_CONTENT_TYPE, FieldTable::default());
        let second = message_properties(JSON_CONTENT_TYPE, FieldTable::default());

        assert!(first.message_id().is_some());
        assert_ne!(first.message_id(), second.message_id());
    }
}
