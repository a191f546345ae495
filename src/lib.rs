// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod dispatcher;
mod otel;

pub mod channel;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod logging;
pub mod publisher;
pub mod queue;
pub mod routing;
pub mod subscriber;
pub mod topology;

pub use errors::AmqpError;
pub use handler::Outcome;
pub use queue::DurabilityClass;
