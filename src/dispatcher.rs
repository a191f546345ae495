// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Dispatch Loops
//!
//! Every subscription runs one background task that pulls deliveries off its
//! stream and hands each one to [`consume`](crate::consumer). Loops share
//! nothing with each other, handle deliveries strictly in stream order and
//! exit when the stream closes, which happens when the channel or connection
//! is torn down.

use crate::{
    codec::Codec,
    consumer::{consume, Acknowledger, Inbound},
    handler::{Handler, Outcome},
};
use futures_util::{Stream, StreamExt};
use opentelemetry::global;
use serde::de::DeserializeOwned;
use std::{fmt::Debug, fmt::Display, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawns the dispatch loop of one subscription.
///
/// `resources` is held by the loop and dropped when it exits; subscriptions
/// use it to keep their channel alive for as long as they consume.
pub(crate) fn spawn_dispatch_loop<C, T, H, A, S, E, R>(
    name: String,
    mut stream: S,
    handler: Arc<H>,
    on_decode_failure: Outcome,
    resources: R,
) -> JoinHandle<()>
where
    C: Codec,
    T: DeserializeOwned + Debug + Send + 'static,
    H: Handler<T>,
    A: Acknowledger + 'static,
    S: Stream<Item = Result<Inbound<A>, E>> + Send + Unpin + 'static,
    E: Display + Send,
    R: Send + 'static,
{
    tokio::spawn(async move {
        let _resources = resources;
        let tracer = global::tracer("amqp consumer");

        while let Some(result) = stream.next().await {
            match result {
                Ok(inbound) => {
                    if let Err(err) =
                        consume::<C, T, H, A>(&tracer, inbound, &handler, on_decode_failure).await
                    {
                        error!(error = err.to_string(), queue = name, "error consume msg");
                    }
                }

                Err(err) => error!(error = err.to_string(), queue = name, "errors consume msg"),
            }
        }

        debug!(queue = name, "delivery stream closed, dispatch loop finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{BincodeCodec, JsonCodec},
        consumer::MockAcknowledger,
        errors::AmqpError,
    };
    use futures_util::stream;
    use lapin::BasicProperties;
    use serde::{Deserialize, Serialize};
    use std::{
        sync::{mpsc, Mutex},
        time::Duration,
    };
    use tokio::sync::mpsc as async_mpsc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Units {
        count: u32,
    }

    fn acked() -> MockAcknowledger {
        let mut acker = MockAcknowledger::new();
        acker.expect_ack().times(1).returning(|| Ok(()));
        acker
    }

    fn delivery<C: Codec>(count: u32, acker: MockAcknowledger) -> Result<Inbound<MockAcknowledger>, AmqpError> {
        Ok(Inbound {
            routing_key: format!("units.{count}"),
            data: C::encode(&Units { count }).unwrap(),
            properties: BasicProperties::default(),
            acker,
        })
    }

    #[tokio::test]
    async fn handles_deliveries_in_stream_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let handler = Arc::new(move |units: Units| {
            recorder.lock().unwrap().push(units.count);
            Outcome::Accept
        });

        let deliveries = stream::iter(vec![
            delivery::<JsonCodec>(1, acked()),
            delivery::<JsonCodec>(2, acked()),
            delivery::<JsonCodec>(3, acked()),
        ]);

        spawn_dispatch_loop::<JsonCodec, Units, _, _, _, _, _>(
            "ordered".to_owned(),
            deliveries,
            handler,
            Outcome::DiscardDrop,
            (),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stream_errors_do_not_stop_the_loop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let handler = Arc::new(move |units: Units| {
            recorder.lock().unwrap().push(units.count);
            Outcome::Accept
        });

        let deliveries = stream::iter(vec![
            Err(AmqpError::ConsumerDeclarationError("stream reset".to_owned())),
            delivery::<BincodeCodec>(7, acked()),
        ]);

        spawn_dispatch_loop::<BincodeCodec, Units, _, _, _, _, _>(
            "errors".to_owned(),
            deliveries,
            handler,
            Outcome::DiscardDrop,
            (),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn undecodable_delivery_does_not_block_the_next_one() {
        let mut discarded = MockAcknowledger::new();
        discarded
            .expect_nack()
            .withf(|requeue| !*requeue)
            .times(1)
            .returning(|_| Ok(()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let handler = Arc::new(move |units: Units| {
            recorder.lock().unwrap().push(units.count);
            Outcome::Accept
        });

        let deliveries = stream::iter(vec![
            Ok(Inbound {
                routing_key: "units.bad".to_owned(),
                data: vec![0xff],
                properties: BasicProperties::default(),
                acker: discarded,
            }),
            delivery::<BincodeCodec>(4, acked()),
        ]);

        spawn_dispatch_loop::<BincodeCodec, Units, _, _, _, _, _>(
            "mixed".to_owned(),
            deliveries,
            handler,
            Outcome::DiscardDrop,
            (),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn blocked_handler_does_not_delay_other_subscriptions() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let stuck = Arc::new(move |_: Units| {
            let _ = release_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(10));
            Outcome::Accept
        });

        let (seen_tx, mut seen_rx) = async_mpsc::unbounded_channel();
        let quick = Arc::new(move |units: Units| {
            let _ = seen_tx.send(units.count);
            Outcome::Accept
        });

        let loop_a = spawn_dispatch_loop::<JsonCodec, Units, _, _, _, _, _>(
            "a".to_owned(),
            stream::iter(vec![delivery::<JsonCodec>(1, acked())]),
            stuck,
            Outcome::DiscardDrop,
            (),
        );
        let loop_b = spawn_dispatch_loop::<JsonCodec, Units, _, _, _, _, _>(
            "b".to_owned(),
            stream::iter(vec![delivery::<JsonCodec>(2, acked())]),
            quick,
            Outcome::DiscardDrop,
            (),
        );

        let handled = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .expect("subscription b was blocked");
        assert_eq!(handled, Some(2));

        loop_b.await.unwrap();
        assert!(!loop_a.is_finished());

        release_tx.send(()).unwrap();
        loop_a.await.unwrap();
    }

    #[tokio::test]
    async fn resources_live_until_the_stream_closes() {
        let (closed_tx, mut closed_rx) = async_mpsc::unbounded_channel::<()>();

        struct Guard(async_mpsc::UnboundedSender<()>);
        impl Drop for Guard {
            fn drop(&mut self) {
                let _ = self.0.send(());
            }
        }

        let handler = Arc::new(|_: Units| Outcome::Accept);
        let deliveries = stream::iter(vec![delivery::<JsonCodec>(5, acked())]);

        let handle = spawn_dispatch_loop::<JsonCodec, Units, _, _, _, _, _>(
            "guarded".to_owned(),
            deliveries,
            handler,
            Outcome::DiscardDrop,
            Guard(closed_tx),
        );

        handle.await.unwrap();
        assert_eq!(closed_rx.recv().await, Some(()));
    }
}
