// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Pub/Sub Layer
//!
//! This module provides the error taxonomy for every broker-facing operation:
//! dialing, topology declaration, publishing, consumer setup and the
//! acknowledgment writes performed by the dispatch loops.

use thiserror::Error;

/// Represents errors that can occur while talking to the broker.
///
/// Setup-time variants (connection, channel, declarations, QoS, consumer) are
/// returned to the caller of the failing operation. Per-delivery variants
/// (decode, ack, nack) are contained by the dispatch loop that produced them.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error loading the application configuration
    #[error("failure to load configuration `{0}`")]
    ConfigError(String),

    /// Error establishing a connection to the broker
    #[error("failure to connect `{0}`")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel `{0}`")]
    ChannelError(String),

    /// Error declaring an exchange: name, broker reason
    #[error("failure to declare an exchange `{0}`: {1}")]
    DeclareExchangeError(String, String),

    /// Error declaring a queue: name, broker reason
    #[error("failure to declare a queue `{0}`: {1}")]
    DeclareQueueError(String, String),

    /// Error binding a queue to an exchange: exchange, queue, broker reason
    #[error("failure to binding exchange `{0}` to queue `{1}`: {2}")]
    BindingExchangeToQueueError(String, String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error opening a delivery stream on a declared queue
    #[error("consumer declaration error `{0}`")]
    ConsumerDeclarationError(String),

    /// Error serializing a payload before publishing
    #[error("failure to encode payload `{0}`")]
    EncodeError(String),

    /// Error deserializing a delivered payload
    #[error("failure to decode payload `{0}`")]
    DecodeError(String),

    /// Error publishing a message
    #[error("failure to publish `{0}`")]
    PublishingError(String),

    /// Error acknowledging a message
    #[error("failure to ack message `{0}`")]
    AckMessageError(String),

    /// Error negative-acknowledging a message
    #[error("failure to nack message `{0}`")]
    NackMessageError(String),
}

impl AmqpError {
    /// Whether the error comes from declaring or binding topology.
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            AmqpError::ChannelError(_)
                | AmqpError::DeclareExchangeError(_, _)
                | AmqpError::DeclareQueueError(_, _)
                | AmqpError::BindingExchangeToQueueError(_, _, _)
        )
    }
}
