// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Application Configuration
//!
//! Settings are read from an optional `config/default` file and then from
//! `PERIL__`-prefixed environment variables, e.g. `PERIL__RABBITMQ__HOST`.
//! Anything left unset falls back to the values in [`AppConfig::default`].

use crate::errors::AmqpError;
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::error;

const ENV_PREFIX: &str = "PERIL";

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSettings,
    pub rabbitmq: RabbitMqSettings,
}

/// Application identity, used as the AMQP connection name.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
}

/// Broker location and credentials.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RabbitMqSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            name: "peril".to_owned(),
        }
    }
}

impl Default for RabbitMqSettings {
    fn default() -> Self {
        RabbitMqSettings {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "%2f".to_owned(),
        }
    }
}

impl RabbitMqSettings {
    /// Renders the AMQP URI for these settings.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.vhost
        )
    }
}

/// Loads the configuration from `config/default` and the environment.
pub fn load_config() -> Result<AppConfig, AmqpError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    builder
        .build()
        .and_then(|cfg| cfg.try_deserialize::<AppConfig>())
        .map_err(|err| {
            error!(error = err.to_string(), "failure to load configuration");
            AmqpError::ConfigError(err.to_string())
        })
}
