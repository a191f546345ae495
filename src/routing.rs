// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Routing Names and Payloads
//!
//! Exchange names, routing keys and the payload types the server and client
//! binaries exchange over the pub/sub layer.

use crate::exchange::ExchangeDefinition;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub use crate::topology::{DEAD_LETTER_EXCHANGE, DEAD_LETTER_QUEUE};

/// Direct exchange for point-to-point control signals
pub const EXCHANGE_PERIL_DIRECT: &str = "peril_direct";
/// Topic exchange for pattern-routed game events
pub const EXCHANGE_PERIL_TOPIC: &str = "peril_topic";

pub const PAUSE_KEY: &str = "pause";
pub const ARMY_MOVES_PREFIX: &str = "army_moves";
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";
pub const GAME_LOG_SLUG: &str = "game_logs";

/// The exchanges the game publishes to, besides the dead-letter sink.
pub fn game_exchanges() -> Vec<ExchangeDefinition> {
    vec![
        ExchangeDefinition::new(EXCHANGE_PERIL_DIRECT).direct().durable(),
        ExchangeDefinition::new(EXCHANGE_PERIL_TOPIC).topic().durable(),
    ]
}

/// Name of the queue delivering pause signals to one player.
pub fn pause_queue(username: &str) -> String {
    format!("{}.{}", PAUSE_KEY, username)
}

/// Routing key of the game logs written by one player.
pub fn game_log_key(username: &str) -> String {
    format!("{}.{}", GAME_LOG_SLUG, username)
}

/// Topic pattern matching the game logs of every player.
pub fn game_log_pattern() -> String {
    format!("{}.*", GAME_LOG_SLUG)
}

/// Server-wide pause state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayingState {
    #[serde(rename = "IsPaused")]
    pub is_paused: bool,
}

/// A log line written by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLog {
    /// Seconds since the Unix epoch.
    pub current_time: u64,
    pub message: String,
    pub username: String,
}

impl GameLog {
    pub fn new(username: &str, message: &str) -> GameLog {
        let current_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        GameLog {
            current_time,
            message: message.to_owned(),
            username: username.to_owned(),
        }
    }
}
