// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Logging Setup
//!
//! Installs the global `tracing` subscriber used by the binaries. The level
//! filter comes from `RUST_LOG` and defaults to `info`.

use crate::errors::AmqpError;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Installs a compact fmt subscriber filtered by `RUST_LOG`.
pub fn init_logging() -> Result<(), AmqpError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let formatting_layer = fmt::layer()
        .with_thread_names(true)
        .with_target(true)
        .compact();

    let subscriber = Registry::default().with(filter).with(formatting_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(|_| AmqpError::InternalError)
}
