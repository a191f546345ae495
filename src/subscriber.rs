// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Typed Subscriptions
//!
//! Entry points that declare a queue, start consuming it and hand every
//! decoded payload to a handler on a dedicated background loop.
//!
//! `subscribe_json` leaves prefetch unbounded, for latency-sensitive handlers
//! that return quickly. `subscribe_bincode` caps the channel at
//! [`BINARY_PREFETCH`] unacknowledged deliveries so slow handlers push back
//! on the broker instead of buffering everything in memory.
//!
//! Setup errors are returned before anything is spawned. Once running, a
//! subscription lives until its channel or connection closes; there is no
//! per-subscription cancellation.

use crate::{
    codec::{BincodeCodec, Codec, JsonCodec},
    consumer::Inbound,
    dispatcher::spawn_dispatch_loop,
    errors::AmqpError,
    handler::{Handler, Outcome},
    queue::DurabilityClass,
    topology::declare_and_bind,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    acker::Acker,
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection,
};
use serde::de::DeserializeOwned;
use std::{fmt::Debug, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

/// Unacknowledged deliveries allowed on a binary subscription's channel
pub const BINARY_PREFETCH: u16 = 10;

/// Longest value an AMQP short string, and so a consumer tag, can hold
pub const MAX_CONSUMER_TAG_LEN: usize = 255;

/// Per-subscription consumption settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Cap on unacknowledged deliveries for the channel; `None` is unbounded.
    pub prefetch: Option<u16>,
    /// Outcome applied to deliveries whose payload fails to decode.
    pub on_decode_failure: Outcome,
}

impl SubscribeOptions {
    /// Settings used by [`subscribe_json`].
    pub fn json() -> Self {
        SubscribeOptions {
            prefetch: None,
            on_decode_failure: Outcome::DiscardDrop,
        }
    }

    /// Settings used by [`subscribe_bincode`].
    pub fn bincode() -> Self {
        SubscribeOptions {
            prefetch: Some(BINARY_PREFETCH),
            on_decode_failure: Outcome::DiscardDrop,
        }
    }
}

/// A running subscription.
///
/// Dropping it leaves the dispatch loop running.
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    consumer_tag: String,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Waits until the delivery stream closes and the dispatch loop exits.
    pub async fn closed(self) -> Result<(), AmqpError> {
        self.handle.await.map_err(|err| {
            error!(error = err.to_string(), "dispatch loop failure");
            AmqpError::InternalError
        })
    }
}

/// The channel operations needed to start consuming a declared queue.
#[cfg_attr(test, mockall::automock(type Consumer = ();))]
#[async_trait]
pub trait ConsumeChannel: Send + Sync {
    type Consumer: Send;

    /// Caps the unacknowledged deliveries outstanding on the channel.
    async fn qos(&self, prefetch: u16) -> Result<(), AmqpError>;

    /// Starts a consumer with manual acknowledgment on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Self::Consumer, AmqpError>;
}

#[async_trait]
impl ConsumeChannel for Channel {
    type Consumer = lapin::Consumer;

    async fn qos(&self, prefetch: u16) -> Result<(), AmqpError> {
        set_prefetch(self, prefetch).await
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<lapin::Consumer, AmqpError> {
        match self
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), queue, "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(err.to_string()))
            }
            Ok(c) => Ok(c),
        }
    }
}

/// Subscribes a handler to JSON payloads.
///
/// # Parameters
/// * `conn` - An established connection
/// * `exchange` - Exchange the queue is bound to
/// * `queue_name` - Queue to declare and consume
/// * `routing_key` - Routing key or pattern of the binding
/// * `durability` - Durability class of the queue
/// * `handler` - Called once per delivery with the decoded payload
///
/// # Returns
/// The running subscription once topology and consumer are set up
pub async fn subscribe_json<T, H>(
    conn: &Connection,
    exchange: &str,
    queue_name: &str,
    routing_key: &str,
    durability: DurabilityClass,
    handler: H,
) -> Result<Subscription, AmqpError>
where
    T: DeserializeOwned + Debug + Send + 'static,
    H: Handler<T>,
{
    subscribe_with::<JsonCodec, T, H>(
        conn,
        exchange,
        queue_name,
        routing_key,
        durability,
        SubscribeOptions::json(),
        handler,
    )
    .await
}

/// Subscribes a handler to bincode payloads, with a bounded prefetch.
///
/// Same parameters as [`subscribe_json`].
pub async fn subscribe_bincode<T, H>(
    conn: &Connection,
    exchange: &str,
    queue_name: &str,
    routing_key: &str,
    durability: DurabilityClass,
    handler: H,
) -> Result<Subscription, AmqpError>
where
    T: DeserializeOwned + Debug + Send + 'static,
    H: Handler<T>,
{
    subscribe_with::<BincodeCodec, T, H>(
        conn,
        exchange,
        queue_name,
        routing_key,
        durability,
        SubscribeOptions::bincode(),
        handler,
    )
    .await
}

/// Subscribes a handler with an explicit codec and options.
pub async fn subscribe_with<C, T, H>(
    conn: &Connection,
    exchange: &str,
    queue_name: &str,
    routing_key: &str,
    durability: DurabilityClass,
    options: SubscribeOptions,
    handler: H,
) -> Result<Subscription, AmqpError>
where
    C: Codec,
    T: DeserializeOwned + Debug + Send + 'static,
    H: Handler<T>,
{
    let (channel, queue) =
        declare_and_bind(conn, exchange, queue_name, routing_key, durability).await?;

    let consumer_tag = new_consumer_tag(queue_name);

    let consumer = match start_consumer(&channel, queue.name().as_str(), &consumer_tag, options).await
    {
        Ok(consumer) => consumer,
        Err(err) => {
            if let Err(close_err) = channel.close(200, "subscription aborted").await {
                error!(error = close_err.to_string(), "error to close the channel");
            }
            return Err(err);
        }
    };

    debug!(
        queue = queue_name,
        consumer_tag,
        content_type = C::CONTENT_TYPE,
        prefetch = ?options.prefetch,
        "subscription started"
    );

    let deliveries = consumer.map(|result| result.map(Inbound::<Acker>::from));
    let handle = spawn_dispatch_loop::<C, T, H, _, _, _, _>(
        queue_name.to_owned(),
        deliveries,
        Arc::new(handler),
        options.on_decode_failure,
        channel,
    );

    Ok(Subscription {
        queue: queue_name.to_owned(),
        consumer_tag,
        handle,
    })
}

/// Builds a unique consumer tag from the queue name.
///
/// The queue name is cut at a char boundary so that the tag, queue prefix
/// plus `-<uuid>`, never exceeds [`MAX_CONSUMER_TAG_LEN`] bytes.
pub fn new_consumer_tag(queue_name: &str) -> String {
    let suffix = Uuid::new_v4().to_string();
    let mut end = queue_name
        .len()
        .min(MAX_CONSUMER_TAG_LEN - suffix.len() - 1);

    while !queue_name.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}-{}", &queue_name[..end], suffix)
}

/// Applies the prefetch cap, if any, then starts consuming `queue`.
async fn start_consumer<K: ConsumeChannel>(
    channel: &K,
    queue: &str,
    consumer_tag: &str,
    options: SubscribeOptions,
) -> Result<K::Consumer, AmqpError> {
    if let Some(prefetch) = options.prefetch {
        channel.qos(prefetch).await?;
    }

    channel.consume(queue, consumer_tag).await
}

/// Caps the unacknowledged deliveries outstanding on `channel`.
///
/// RabbitMQ applies `global` QoS to the whole channel rather than to each
/// consumer on it.
pub async fn set_prefetch(channel: &Channel, prefetch: u16) -> Result<(), AmqpError> {
    match channel
        .basic_qos(prefetch, BasicQosOptions { global: true })
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), prefetch, "error to configure qos");
            Err(AmqpError::QoSDeclarationError(err.to_string()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_subscriptions_are_unbounded() {
        let options = SubscribeOptions::json();
        assert_eq!(options.prefetch, None);
        assert_eq!(options.on_decode_failure, Outcome::DiscardDrop);
    }

    #[test]
    fn bincode_subscriptions_cap_prefetch() {
        let options = SubscribeOptions::bincode();
        assert_eq!(options.prefetch, Some(BINARY_PREFETCH));
        assert_eq!(BINARY_PREFETCH, 10);
        assert_eq!(options.on_decode_failure, Outcome::DiscardDrop);
    }

    #[test]
    fn options_can_be_tuned() {
        let options = SubscribeOptions {
            prefetch: Some(1),
            on_decode_failure: Outcome::RequeueRetry,
        };

        assert_ne!(options, SubscribeOptions::json());
        assert_eq!(
            SubscribeOptions {
                prefetch: None,
                ..options
            }
            .on_decode_failure,
            Outcome::RequeueRetry
        );
    }

    #[test]
    fn consumer_tag_fits_a_short_string_for_the_longest_queue_name() {
        let queue_name = "q".repeat(255);

        let tag = new_consumer_tag(&queue_name);

        assert!(tag.len() <= MAX_CONSUMER_TAG_LEN);
        assert!(tag.starts_with(&"q".repeat(218)));
    }

    #[test]
    fn consumer_tag_keeps_short_queue_names_whole() {
        let tag = new_consumer_tag("pause.alice");

        assert!(tag.starts_with("pause.alice-"));
        assert_eq!(tag.len(), "pause.alice-".len() + 36);
        assert_ne!(tag, new_consumer_tag("pause.alice"));
    }

    #[test]
    fn consumer_tag_cuts_multibyte_names_on_a_char_boundary() {
        let queue_name = format!("a{}", "é".repeat(120));

        let tag = new_consumer_tag(&queue_name);

        assert!(tag.len() <= MAX_CONSUMER_TAG_LEN);
        assert!(tag.starts_with(&format!("a{}-", "é".repeat(108))));
    }

    #[tokio::test]
    async fn bincode_options_set_qos_before_consuming() {
        let mut channel = MockConsumeChannel::new();
        channel
            .expect_qos()
            .withf(|prefetch| *prefetch == BINARY_PREFETCH)
            .times(1)
            .returning(|_| Ok(()));
        channel.expect_consume().times(1).returning(|_, _| Ok(()));

        start_consumer(&channel, "game_logs", "game_logs-tag", SubscribeOptions::bincode())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn json_options_leave_qos_untouched() {
        let mut channel = MockConsumeChannel::new();
        channel.expect_qos().never();
        channel.expect_consume().times(1).returning(|_, _| Ok(()));

        start_consumer(&channel, "pause.alice", "pause.alice-tag", SubscribeOptions::json())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn qos_failure_stops_before_consuming() {
        let mut channel = MockConsumeChannel::new();
        channel
            .expect_qos()
            .times(1)
            .returning(|_| Err(AmqpError::QoSDeclarationError("channel closed".to_owned())));
        channel.expect_consume().never();

        let err = start_consumer(&channel, "game_logs", "game_logs-tag", SubscribeOptions::bincode())
            .await
            .unwrap_err();

        assert_eq!(err, AmqpError::QoSDeclarationError("channel closed".to_owned()));
    }

    #[tokio::test]
    async fn consumer_failure_keeps_the_broker_reason() {
        let mut channel = MockConsumeChannel::new();
        channel.expect_qos().never();
        channel.expect_consume().times(1).returning(|_, _| {
            Err(AmqpError::ConsumerDeclarationError(
                "ACCESS_REFUSED - queue 'pause.alice' in exclusive use".to_owned(),
            ))
        });

        let err = start_consumer(&channel, "pause.alice", "pause.alice-tag", SubscribeOptions::json())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("ACCESS_REFUSED"));
    }
}
