// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Outcomes
//!
//! A subscription handler turns a decoded payload into an [`Outcome`]; the
//! dispatch loop maps that outcome onto the acknowledgment sent back to the
//! broker through [`AckAction`].

use std::{convert::Infallible, fmt, str::FromStr};

/// What a handler decided about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Fully processed; the broker drops the message.
    Accept,
    /// Failed for a possibly transient reason; the broker redelivers it.
    RequeueRetry,
    /// Failed for good; the broker drops it, dead-lettering it when the queue
    /// has a dead-letter exchange.
    DiscardDrop,
}

/// The acknowledgment written back to the broker for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckAction {
    Ack,
    NackRequeue,
    NackDiscard,
}

impl AckAction {
    /// Whether the action is a negative acknowledgment asking for redelivery.
    pub fn requeue(&self) -> bool {
        matches!(self, AckAction::NackRequeue)
    }
}

impl From<Outcome> for AckAction {
    fn from(outcome: Outcome) -> AckAction {
        match outcome {
            Outcome::Accept => AckAction::Ack,
            Outcome::RequeueRetry => AckAction::NackRequeue,
            Outcome::DiscardDrop => AckAction::NackDiscard,
        }
    }
}

impl fmt::Display for AckAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckAction::Ack => write!(f, "Ack"),
            AckAction::NackRequeue => write!(f, "NackRequeue"),
            AckAction::NackDiscard => write!(f, "NackDiscard"),
        }
    }
}

/// Parses the string outcomes older peers and handlers report.
///
/// Unknown strings fall back to [`Outcome::DiscardDrop`].
impl FromStr for Outcome {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Ack" => Outcome::Accept,
            "NackRequeue" => Outcome::RequeueRetry,
            _ => Outcome::DiscardDrop,
        })
    }
}

/// A subscription handler: a synchronous function from payload to outcome.
///
/// Implemented for every `Fn(T) -> Outcome` closure that can be moved to
/// another thread. Handlers may publish further messages but should not block
/// forever; a stuck handler stalls its own subscription.
pub trait Handler<T>: Send + Sync + 'static {
    fn handle(&self, payload: T) -> Outcome;
}

impl<T, F> Handler<T> for F
where
    F: Fn(T) -> Outcome + Send + Sync + 'static,
{
    fn handle(&self, payload: T) -> Outcome {
        self(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_mapping_is_total() {
        assert_eq!(AckAction::from(Outcome::Accept), AckAction::Ack);
        assert_eq!(AckAction::from(Outcome::RequeueRetry), AckAction::NackRequeue);
        assert_eq!(AckAction::from(Outcome::DiscardDrop), AckAction::NackDiscard);
    }

    #[test]
    fn only_requeue_asks_for_redelivery() {
        assert!(AckAction::NackRequeue.requeue());
        assert!(!AckAction::NackDiscard.requeue());
        assert!(!AckAction::Ack.requeue());
    }

    #[test]
    fn legacy_strings_parse_and_unknowns_discard() {
        assert_eq!("Ack".parse::<Outcome>(), Ok(Outcome::Accept));
        assert_eq!("NackRequeue".parse::<Outcome>(), Ok(Outcome::RequeueRetry));
        assert_eq!("NackDiscard".parse::<Outcome>(), Ok(Outcome::DiscardDrop));
        assert_eq!("ack".parse::<Outcome>(), Ok(Outcome::DiscardDrop));
        assert_eq!("".parse::<Outcome>(), Ok(Outcome::DiscardDrop));
    }

    #[test]
    fn closures_are_handlers() {
        let handler = |count: u32| {
            if count > 0 {
                Outcome::Accept
            } else {
                Outcome::RequeueRetry
            }
        };

        assert_eq!(Handler::handle(&handler, 3), Outcome::Accept);
        assert_eq!(Handler::handle(&handler, 0), Outcome::RequeueRetry);
    }
}
