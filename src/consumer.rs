// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Consumption
//!
//! This module handles a single delivery from start to finish:
//! 1. Opens a consumer span parented on the delivery's trace headers
//! 2. Decodes the payload with the subscription's codec
//! 3. Runs the handler on the blocking pool and waits for its outcome
//! 4. Settles the delivery with ack, nack+requeue or nack
//! 5. Logs the routing key, the payload and the acknowledgment sent
//!
//! A payload that fails to decode never reaches the handler; it is settled
//! with the subscription's decode-failure outcome so no delivery is left
//! pending. A handler that panics is settled as [`Outcome::DiscardDrop`].

use crate::{
    codec::Codec,
    errors::AmqpError,
    handler::{AckAction, Handler, Outcome},
    otel,
};
use async_trait::async_trait;
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    protocol::basic::AMQPProperties,
};
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use serde::de::DeserializeOwned;
use std::{fmt::Debug, sync::Arc};
use tracing::{error, info, warn};

/// Settles a delivery with the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Confirms the delivery was processed.
    async fn ack(&self) -> Result<(), AmqpError>;

    /// Rejects the delivery, asking for redelivery when `requeue` is set.
    async fn nack(&self, requeue: bool) -> Result<(), AmqpError>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack(&self) -> Result<(), AmqpError> {
        match Acker::ack(self, BasicAckOptions { multiple: false }).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), "error whiling ack msg");
                Err(AmqpError::AckMessageError(err.to_string()))
            }
        }
    }

    async fn nack(&self, requeue: bool) -> Result<(), AmqpError> {
        match Acker::nack(
            self,
            BasicNackOptions {
                multiple: false,
                requeue,
            },
        )
        .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), requeue, "error whiling nack msg");
                Err(AmqpError::NackMessageError(err.to_string()))
            }
        }
    }
}

/// The parts of a delivery the dispatch loop needs.
pub struct Inbound<A> {
    pub routing_key: String,
    pub data: Vec<u8>,
    pub properties: AMQPProperties,
    pub acker: A,
}

impl From<Delivery> for Inbound<Acker> {
    fn from(delivery: Delivery) -> Self {
        Inbound {
            routing_key: delivery.routing_key.to_string(),
            data: delivery.data,
            properties: delivery.properties,
            acker: delivery.acker,
        }
    }
}

/// Writes the acknowledgment matching `action`.
pub(crate) async fn settle<A: Acknowledger + ?Sized>(
    acker: &A,
    action: AckAction,
) -> Result<(), AmqpError> {
    match action {
        AckAction::Ack => acker.ack().await,
        _ => acker.nack(action.requeue()).await,
    }
}

/// Runs the handler on the blocking pool so it cannot stall the async workers.
async fn run_handler<T, H>(handler: &Arc<H>, payload: T) -> Outcome
where
    T: Send + 'static,
    H: Handler<T>,
{
    let handler = Arc::clone(handler);

    match tokio::task::spawn_blocking(move || handler.handle(payload)).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(error = err.to_string(), "handler failed, discarding msg");
            Outcome::DiscardDrop
        }
    }
}

/// Consumes one delivery and returns the acknowledgment that was sent.
///
/// # Parameters
/// * `tracer` - OpenTelemetry tracer for the consumer span
/// * `inbound` - The delivery to handle
/// * `handler` - The subscription's handler
/// * `on_decode_failure` - Outcome applied when the payload does not decode
///
/// # Returns
/// The acknowledgment written, or the error from writing it
pub(crate) async fn consume<C, T, H, A>(
    tracer: &BoxedTracer,
    inbound: Inbound<A>,
    handler: &Arc<H>,
    on_decode_failure: Outcome,
) -> Result<AckAction, AmqpError>
where
    C: Codec,
    T: DeserializeOwned + Debug + Send + 'static,
    H: Handler<T>,
    A: Acknowledger,
{
    let mut span = otel::new_span(&inbound.properties, tracer, &inbound.routing_key);

    let (payload, outcome) = match C::decode::<T>(&inbound.data) {
        Ok(value) => {
            let payload = format!("{:?}", value);
            (payload, run_handler(handler, value).await)
        }
        Err(err) => {
            warn!(
                error = err.to_string(),
                routing_key = inbound.routing_key,
                content_type = C::CONTENT_TYPE,
                "failure to decode msg"
            );
            span.record_error(&err);
            (String::from("<undecodable>"), on_decode_failure)
        }
    };

    let action = AckAction::from(outcome);

    if let Err(err) = settle(&inbound.acker, action).await {
        span.record_error(&err);
        span.set_status(Status::error(err.to_string()));
        span.end();
        return Err(err);
    }

    match action {
        AckAction::NackRequeue => warn!(
            routing_key = inbound.routing_key,
            payload,
            action = %action,
            "msg requeued"
        ),
        _ => info!(
            routing_key = inbound.routing_key,
            payload,
            action = %action,
            "msg settled"
        ),
    }

    span.set_status(Status::Ok);
    span.end();

    Ok(action)
}
