// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use pubsub::{
    channel::{new_amqp_connection, open_channel},
    config::load_config,
    logging::init_logging,
    publisher::publish_bincode,
    routing::{
        game_log_key, pause_queue, GameLog, PlayingState, EXCHANGE_PERIL_DIRECT,
        EXCHANGE_PERIL_TOPIC, PAUSE_KEY,
    },
    subscriber::subscribe_json,
    AmqpError, DurabilityClass, Outcome,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin},
    time::timeout,
};
use tracing::{error, info, warn};

/// How long shutdown waits for the dispatch loop to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// State shared between the command loop and the subscription handlers.
#[derive(Debug, Default)]
struct Session {
    username: String,
    playing: PlayingState,
}

#[tokio::main]
async fn main() {
    if let Err(err) = init_logging() {
        eprintln!("failure to initialize logging: {err}");
    }

    if let Err(err) = run().await {
        error!(error = err.to_string(), "peril client stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AmqpError> {
    let cfg = load_config()?;

    info!("starting peril client...");
    let conn = new_amqp_connection(&cfg).await?;
    info!("connected to the broker");

    let mut lines = BufReader::new(stdin()).lines();

    println!("Please enter your username:");
    let username = match read_line(&mut lines).await? {
        Some(name) if !name.trim().is_empty() => name.trim().to_owned(),
        _ => {
            error!("a username is required");
            return Err(AmqpError::InternalError);
        }
    };

    let session = Arc::new(Mutex::new(Session {
        username: username.clone(),
        ..Default::default()
    }));

    let pause_session = Arc::clone(&session);
    let pause = subscribe_json(
        &conn,
        EXCHANGE_PERIL_DIRECT,
        &pause_queue(&username),
        PAUSE_KEY,
        DurabilityClass::Transient,
        move |state: PlayingState| handle_pause(&pause_session, state),
    )
    .await;

    let pause = match pause {
        Ok(subscription) => {
            info!(
                queue = subscription.queue(),
                consumer_tag = subscription.consumer_tag(),
                "pause subscription started"
            );
            Some(subscription)
        }
        Err(err) => {
            error!(error = err.to_string(), "pause subscription did not start");
            None
        }
    };

    let channel = open_channel(&conn).await?;
    print_client_help();

    loop {
        let line = tokio::select! {
            line = read_line(&mut lines) => line?,
            _ = tokio::signal::ctrl_c() => break,
        };

        let Some(line) = line else { break };
        let line = line.trim();

        match line.split_once(' ').unwrap_or((line, "")) {
            ("", _) => continue,
            ("status", _) => print_status(&session),
            ("log", text) if !text.trim().is_empty() => {
                let log = GameLog::new(&username, text.trim());
                if let Err(err) =
                    publish_bincode(&channel, EXCHANGE_PERIL_TOPIC, &game_log_key(&username), &log)
                        .await
                {
                    error!(error = err.to_string(), "failure to publish the game log");
                }
            }
            ("quit", _) => break,
            _ => print_client_help(),
        }
    }

    info!("shutting down peril client...");
    if let Err(err) = conn.close(200, "client shutdown").await {
        error!(error = err.to_string(), "failure to close the connection");
    }

    if let Some(subscription) = pause {
        match timeout(SHUTDOWN_GRACE, subscription.closed()).await {
            Ok(Ok(())) => info!("pause subscription closed"),
            Ok(Err(err)) => error!(error = err.to_string(), "pause subscription failed"),
            Err(_) => warn!("pause subscription still draining at shutdown"),
        }
    }

    Ok(())
}

fn handle_pause(session: &Mutex<Session>, state: PlayingState) -> Outcome {
    let Ok(mut session) = session.lock() else {
        warn!("session state poisoned, discarding pause signal");
        return Outcome::DiscardDrop;
    };

    session.playing = state;
    if state.is_paused {
        println!("==== Pause Detected ====");
    } else {
        println!("==== Resume Detected ====");
    }

    Outcome::Accept
}

fn print_status(session: &Mutex<Session>) {
    match session.lock() {
        Ok(session) => println!(
            "{}: game is {}",
            session.username,
            if session.playing.is_paused {
                "paused"
            } else {
                "running"
            }
        ),
        Err(_) => warn!("session state poisoned"),
    }
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>, AmqpError> {
    lines.next_line().await.map_err(|err| {
        error!(error = err.to_string(), "failure to read input");
        AmqpError::InternalError
    })
}

fn print_client_help() {
    println!("Possible commands:");
    println!("* status      show whether the game is paused");
    println!("* log <text>  publish a game log line");
    println!("* quit        leave the game");
}
