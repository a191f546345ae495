// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! This module dials the broker and opens channels on an established
//! connection. The connection is shared by every subscription and publisher;
//! each topology declaration gets its own channel.

use crate::{config::AppConfig, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error};

/// Establishes a connection to the broker described by `cfg`.
///
/// The connection is named after the application so it can be identified in
/// the broker's management tooling.
///
/// # Parameters
/// * `cfg` - Configuration containing the broker host, port, credentials and vhost
///
/// # Returns
/// * `Result<Arc<Connection>, AmqpError>` - the shared connection, or
///   `AmqpError::ConnectionError` when the broker cannot be reached
pub async fn new_amqp_connection(cfg: &AppConfig) -> Result<Arc<Connection>, AmqpError> {
    debug!("creating amqp connection...");
    let options =
        ConnectionProperties::default().with_connection_name(LongString::from(cfg.app.name.clone()));

    let conn = connect_uri(&cfg.rabbitmq.uri(), options).await?;
    debug!("amqp connected");

    Ok(Arc::new(conn))
}

/// Establishes a connection to an explicit AMQP URI.
pub async fn connect_uri(uri: &str, options: ConnectionProperties) -> Result<Connection, AmqpError> {
    match Connection::connect(uri, options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError(err.to_string()))
        }
    }
}

/// Opens a new channel on an established connection.
///
/// Channels are cheap, multiplexed over the single connection, and safe to
/// open concurrently from several tasks.
pub async fn open_channel(conn: &Connection) -> Result<Channel, AmqpError> {
    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!(channel_id = c.id(), "channel created");
            Ok(c)
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError(err.to_string()))
        }
    }
}
