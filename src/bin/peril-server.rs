// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use pubsub::{
    channel::{new_amqp_connection, open_channel},
    config::load_config,
    logging::init_logging,
    publisher::publish_json,
    routing::{
        game_exchanges, game_log_pattern, GameLog, PlayingState, EXCHANGE_PERIL_DIRECT,
        EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, PAUSE_KEY,
    },
    subscriber::{subscribe_bincode, Subscription},
    topology::{declare_dead_letter_sink, declare_exchanges},
    AmqpError, DurabilityClass, Outcome,
};
use std::time::Duration;
use tokio::{
    io::{stdin, AsyncBufReadExt, BufReader},
    time::timeout,
};
use tracing::{error, info, warn};

/// How long shutdown waits for the dispatch loop to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(err) = init_logging() {
        eprintln!("failure to initialize logging: {err}");
    }

    if let Err(err) = run().await {
        error!(error = err.to_string(), "peril server stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AmqpError> {
    let cfg = load_config()?;

    info!("starting peril server...");
    let conn = new_amqp_connection(&cfg).await?;
    info!("connected to the broker");

    declare_exchanges(&conn, game_exchanges()).await?;
    declare_dead_letter_sink(&conn).await?;

    let logs = subscribe_bincode(
        &conn,
        EXCHANGE_PERIL_TOPIC,
        GAME_LOG_SLUG,
        &game_log_pattern(),
        DurabilityClass::Durable,
        |log: GameLog| {
            info!(
                username = log.username,
                time = log.current_time,
                "{}",
                log.message
            );
            Outcome::Accept
        },
    )
    .await;

    let logs = match logs {
        Ok(subscription) => {
            info!(
                queue = subscription.queue(),
                consumer_tag = subscription.consumer_tag(),
                "game logs subscription started"
            );
            Some(subscription)
        }
        Err(err) => {
            error!(error = err.to_string(), "game logs subscription did not start");
            None
        }
    };

    let channel = open_channel(&conn).await?;
    print_server_help();

    let mut lines = BufReader::new(stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!(error = err.to_string(), "failure to read input");
                break;
            }
        };

        match line.trim() {
            "" => continue,
            "pause" => send_playing_state(&channel, true).await,
            "resume" => send_playing_state(&channel, false).await,
            "quit" => break,
            _ => print_server_help(),
        }
    }

    info!("shutting down peril server...");
    if let Err(err) = conn.close(200, "server shutdown").await {
        error!(error = err.to_string(), "failure to close the connection");
    }

    if let Some(subscription) = logs {
        wait_closed(subscription).await;
    }

    Ok(())
}

async fn send_playing_state(channel: &lapin::Channel, is_paused: bool) {
    let state = PlayingState { is_paused };

    match publish_json(channel, EXCHANGE_PERIL_DIRECT, PAUSE_KEY, &state).await {
        Ok(()) => info!(is_paused, "playing state published"),
        Err(err) => error!(error = err.to_string(), "failure to publish the playing state"),
    }
}

async fn wait_closed(subscription: Subscription) {
    match timeout(SHUTDOWN_GRACE, subscription.closed()).await {
        Ok(Ok(())) => info!("game logs subscription closed"),
        Ok(Err(err)) => error!(error = err.to_string(), "game logs subscription failed"),
        Err(_) => warn!("game logs subscription still draining at shutdown"),
    }
}

fn print_server_help() {
    println!("Possible commands:");
    println!("* pause   pause the game for every player");
    println!("* resume  resume the game");
    println!("* quit    stop the server");
}
