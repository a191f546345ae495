// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Declaration
//!
//! This module declares exchanges, queues and the bindings between them.
//!
//! The main components are:
//! - `Topology` trait: collects definitions and installs them on a channel
//! - `AmqpTopology`: the lapin implementation of that trait
//! - `TopologyBinding`: one queue bound to one exchange, with its dead-letter wiring
//! - `declare_and_bind`: opens a dedicated channel and installs a `TopologyBinding`
//!
//! Every queue except the dead-letter queue itself dead-letters into
//! [`DEAD_LETTER_EXCHANGE`]. Declarations are idempotent on the broker side,
//! so setting up the same binding twice is harmless.

use crate::{
    channel::open_channel,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{DurabilityClass, QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions},
    types::FieldTable,
    Channel, Connection, Queue,
};
use tracing::{debug, error};

/// Fanout exchange receiving every dead-lettered message
pub const DEAD_LETTER_EXCHANGE: &str = "peril_dlx";
/// Queue bound to [`DEAD_LETTER_EXCHANGE`]; never dead-letters itself
pub const DEAD_LETTER_QUEUE: &str = "peril_dlq";

/// Trait defining the interface for topology management.
#[async_trait]
pub trait Topology {
    /// Adds an exchange definition to the topology.
    fn exchange(self, def: ExchangeDefinition) -> Self;

    /// Adds a queue definition to the topology.
    fn queue(self, def: QueueDefinition) -> Self;

    /// Adds a queue-to-exchange binding to the topology.
    fn queue_binding(self, binding: QueueBinding) -> Self;

    /// Declares exchanges, then queues, then bindings.
    ///
    /// Stops at the first broker error. Returns the declared queues in
    /// registration order.
    async fn install(&self) -> Result<Vec<Queue>, AmqpError>;
}

/// Broker implementation of the Topology trait, bound to one channel.
pub struct AmqpTopology {
    channel: Channel,
    pub(crate) queues: Vec<QueueDefinition>,
    pub(crate) queues_binding: Vec<QueueBinding>,
    pub(crate) exchanges: Vec<ExchangeDefinition>,
}

impl AmqpTopology {
    pub fn new(channel: Channel) -> AmqpTopology {
        AmqpTopology {
            channel,
            queues: vec![],
            queues_binding: vec![],
            exchanges: vec![],
        }
    }
}

#[async_trait]
impl Topology for AmqpTopology {
    fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    async fn install(&self) -> Result<Vec<Queue>, AmqpError> {
        self.install_exchange().await?;
        let queues = self.install_queue().await?;
        self.binding_queues().await?;
        Ok(queues)
    }
}

impl AmqpTopology {
    async fn install_exchange(&self) -> Result<(), AmqpError> {
        for exch in &self.exchanges {
            debug!("creating exchange: {}", exch.name);

            match self
                .channel
                .exchange_declare(
                    &exch.name,
                    exch.kind.into(),
                    ExchangeDeclareOptions {
                        passive: false,
                        durable: exch.durable,
                        auto_delete: exch.delete,
                        internal: false,
                        nowait: false,
                    },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        name = exch.name,
                        "error to declare the exchange"
                    );
                    Err(AmqpError::DeclareExchangeError(
                        exch.name.clone(),
                        err.to_string(),
                    ))
                }
                _ => Ok(()),
            }?;

            debug!("exchange: {} was created", exch.name);
        }

        Ok(())
    }

    async fn install_queue(&self) -> Result<Vec<Queue>, AmqpError> {
        let mut declared = Vec::with_capacity(self.queues.len());

        for def in &self.queues {
            debug!("creating queue: {}", def.name);

            let queue = match self
                .channel
                .queue_declare(&def.name, def.declare_options(), def.arguments())
                .await
            {
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        name = def.name,
                        "error to declare the queue"
                    );
                    Err(AmqpError::DeclareQueueError(
                        def.name.clone(),
                        err.to_string(),
                    ))
                }
                Ok(queue) => {
                    debug!("queue: {} was created", def.name);
                    Ok(queue)
                }
            }?;

            declared.push(queue);
        }

        Ok(declared)
    }

    async fn binding_queues(&self) -> Result<(), AmqpError> {
        for binding in &self.queues_binding {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue_name, binding.exchange_name, binding.routing_key
            );

            match self
                .channel
                .queue_bind(
                    &binding.queue_name,
                    &binding.exchange_name,
                    &binding.routing_key,
                    QueueBindOptions { nowait: false },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(error = err.to_string(), "error to bind queue to exchange");

                    Err(AmqpError::BindingExchangeToQueueError(
                        binding.exchange_name.clone(),
                        binding.queue_name.clone(),
                        err.to_string(),
                    ))
                }
                _ => Ok(()),
            }?;
        }

        Ok(())
    }
}

/// One queue bound to one exchange under a routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyBinding {
    pub exchange: String,
    pub queue_name: String,
    pub routing_key: String,
    pub durability: DurabilityClass,
    pub dead_letter_exchange: Option<String>,
}

impl TopologyBinding {
    /// Builds a binding, wiring the dead-letter exchange unless `queue_name`
    /// is the dead-letter queue.
    pub fn new(
        exchange: &str,
        queue_name: &str,
        routing_key: &str,
        durability: DurabilityClass,
    ) -> TopologyBinding {
        let dead_letter_exchange =
            (queue_name != DEAD_LETTER_QUEUE).then(|| DEAD_LETTER_EXCHANGE.to_owned());

        TopologyBinding {
            exchange: exchange.to_owned(),
            queue_name: queue_name.to_owned(),
            routing_key: routing_key.to_owned(),
            durability,
            dead_letter_exchange,
        }
    }

    pub fn queue_definition(&self) -> QueueDefinition {
        let def = QueueDefinition::new(&self.queue_name).durability(self.durability);

        match &self.dead_letter_exchange {
            Some(dlx) => def.dead_letter_exchange(dlx),
            None => def,
        }
    }

    pub fn queue_binding(&self) -> QueueBinding {
        QueueBinding::new(&self.queue_name)
            .exchange(&self.exchange)
            .routing_key(&self.routing_key)
    }
}

/// Opens a dedicated channel, declares the queue and binds it to `exchange`.
///
/// The channel is left open and handed back to the caller, who owns its
/// lifetime. Failures are returned as they occur, without retrying.
///
/// # Parameters
/// * `conn` - An established connection
/// * `exchange` - Exchange the queue is bound to
/// * `queue_name` - Queue to declare
/// * `routing_key` - Routing key or pattern of the binding
/// * `durability` - Durability class of the queue
///
/// # Returns
/// The open channel and the declared queue, or a topology error
pub async fn declare_and_bind(
    conn: &Connection,
    exchange: &str,
    queue_name: &str,
    routing_key: &str,
    durability: DurabilityClass,
) -> Result<(Channel, Queue), AmqpError> {
    let binding = TopologyBinding::new(exchange, queue_name, routing_key, durability);
    let channel = open_channel(conn).await?;

    let queues = AmqpTopology::new(channel.clone())
        .queue(binding.queue_definition())
        .queue_binding(binding.queue_binding())
        .install()
        .await?;

    let queue = queues
        .into_iter()
        .next()
        .ok_or_else(|| {
            AmqpError::DeclareQueueError(
                binding.queue_name.clone(),
                "no queue returned by the declaration".to_owned(),
            )
        })?;

    debug!(
        queue = queue_name,
        exchange, routing_key, "queue declared and bound"
    );

    Ok((channel, queue))
}

/// Declares the dead-letter fanout exchange and the queue collecting its messages.
///
/// Uses a short-lived channel that is closed before returning.
pub async fn declare_dead_letter_sink(conn: &Connection) -> Result<(), AmqpError> {
    let binding = TopologyBinding::new(
        DEAD_LETTER_EXCHANGE,
        DEAD_LETTER_QUEUE,
        "",
        DurabilityClass::Durable,
    );
    let channel = open_channel(conn).await?;

    AmqpTopology::new(channel.clone())
        .exchange(ExchangeDefinition::new(DEAD_LETTER_EXCHANGE).fanout().durable())
        .queue(binding.queue_definition())
        .queue_binding(binding.queue_binding())
        .install()
        .await?;

    close_setup_channel(&channel).await;
    Ok(())
}

/// Declares the given exchanges on a short-lived channel.
pub async fn declare_exchanges(
    conn: &Connection,
    defs: Vec<ExchangeDefinition>,
) -> Result<(), AmqpError> {
    let channel = open_channel(conn).await?;

    defs.into_iter()
        .fold(AmqpTopology::new(channel.clone()), |topology, def| {
            topology.exchange(def)
        })
        .install()
        .await?;

    close_setup_channel(&channel).await;
    Ok(())
}

async fn close_setup_channel(channel: &Channel) {
    if let Err(err) = channel.close(200, "topology declared").await {
        error!(error = err.to_string(), "error to close the setup channel");
    }
}
