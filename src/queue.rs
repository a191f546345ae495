// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! This module provides the queue side of the topology: the durability class
//! a subscription asks for, the queue definition derived from it (including
//! the dead-letter wiring) and the binding of a queue to an exchange.

use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
};
use std::collections::BTreeMap;

/// Constant for the queue argument naming the dead-letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Persistence policy of a declared queue.
///
/// `Durable` queues are shared and long-lived: they survive a broker restart,
/// are never auto-deleted and any connection may consume them. `Transient`
/// queues belong to one client: they are exclusive to the declaring
/// connection and auto-deleted once their last consumer goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurabilityClass {
    Durable,
    Transient,
}

/// Definition of a queue with its declaration flags and arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) dead_letter_exchange: Option<String>,
}

impl QueueDefinition {
    /// Creates a non-durable, non-exclusive queue definition with no arguments.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    /// Applies the flags of a durability class, replacing any set before.
    pub fn durability(mut self, class: DurabilityClass) -> Self {
        let durable = class == DurabilityClass::Durable;
        self.durable = durable;
        self.delete = !durable;
        self.exclusive = !durable;
        self
    }

    /// Routes rejected messages of this queue to the given exchange.
    pub fn dead_letter_exchange(mut self, exchange: &str) -> Self {
        self.dead_letter_exchange = Some(exchange.to_owned());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_auto_delete(&self) -> bool {
        self.delete
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn dead_letter(&self) -> Option<&str> {
        self.dead_letter_exchange.as_deref()
    }

    pub(crate) fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.delete,
            nowait: false,
        }
    }

    pub(crate) fn arguments(&self) -> FieldTable {
        let mut args = BTreeMap::new();

        if let Some(dlx) = &self.dead_letter_exchange {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(dlx.as_str())),
            );
        }

        FieldTable::from(args)
    }
}

/// Binding of a queue to an exchange under a routing key or pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a binding for the given queue. Exchange and key start empty.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    /// Sets the exchange to bind the queue to.
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    /// Sets the routing key for the binding.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_queue_is_exclusive_and_auto_deleted() {
        let def = QueueDefinition::new("pause.alice").durability(DurabilityClass::Transient);
        let opts = def.declare_options();

        assert!(!opts.durable);
        assert!(opts.auto_delete);
        assert!(opts.exclusive);
    }

    #[test]
    fn durable_queue_is_shared_and_kept() {
        let def = QueueDefinition::new("game_logs").durability(DurabilityClass::Durable);
        let opts = def.declare_options();

        assert!(opts.durable);
        assert!(!opts.auto_delete);
        assert!(!opts.exclusive);
    }

    #[test]
    fn later_durability_class_wins() {
        let def = QueueDefinition::new("q")
            .durability(DurabilityClass::Transient)
            .durability(DurabilityClass::Durable);

        assert!(def.is_durable());
        assert!(!def.is_auto_delete());
        assert!(!def.is_exclusive());
    }

    #[test]
    fn dead_letter_exchange_becomes_queue_argument() {
        let def = QueueDefinition::new("army_moves.bob").dead_letter_exchange("peril_dlx");
        let args = def.arguments();

        assert_eq!(
            args.inner().get(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            Some(&AMQPValue::LongString(LongString::from("peril_dlx")))
        );
    }

    #[test]
    fn no_arguments_without_dead_letter_exchange() {
        let def = QueueDefinition::new("peril_dlq");
        assert!(def.arguments().inner().is_empty());
    }
}
