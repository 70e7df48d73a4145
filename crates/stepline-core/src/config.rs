// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Stepline configuration shared by the worker and embedding services.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Deployment environment name (`dev` or `prod`); controls log formatting
    pub env: String,
    /// Run the schema bootstrap on startup
    pub auto_migrate: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `STEPLINE_DATABASE_URL`: PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `STEPLINE_ENV`: environment name (default: `dev`)
    /// - `STEPLINE_AUTO_MIGRATE`: apply embedded migrations on startup (default: `true`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("STEPLINE_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("STEPLINE_DATABASE_URL"))?;

        let env = std::env::var("STEPLINE_ENV").unwrap_or_else(|_| "dev".to_string());

        let auto_migrate = match std::env::var("STEPLINE_AUTO_MIGRATE") {
            Err(_) => true,
            Ok(v) => match v.as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => {
                    return Err(ConfigError::Invalid(
                        "STEPLINE_AUTO_MIGRATE",
                        "must be one of 1, 0, true, false",
                    ))
                }
            },
        };

        Ok(Self {
            database_url,
            env,
            auto_migrate,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
