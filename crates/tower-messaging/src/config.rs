//! Messenger configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;

/// Upper bound for `initial_subscriber_capacity`.
pub const MAX_SUBSCRIBER_CAPACITY: usize = 65_536;

/// Configuration for a [`Messenger`](crate::Messenger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    /// Emit a `NoSubscribers` warning when a publish finds no handler.
    pub warn_on_unsubscribed_publish: bool,

    /// Pre-allocated subscriber slots per broker.
    pub initial_subscriber_capacity: usize,

    /// Report handler faults to the diagnostic sink.
    pub log_handler_faults: bool,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            warn_on_unsubscribed_publish: false,
            initial_subscriber_capacity: crate::DEFAULT_SUBSCRIBER_CAPACITY,
            log_handler_faults: true,
        }
    }
}

impl MessengerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TOWER_WARN_UNSUBSCRIBED`: warn on publishes nobody handles (default: false)
    /// - `TOWER_SUBSCRIBER_CAPACITY`: initial subscriber slots per broker (default: 8)
    /// - `TOWER_LOG_HANDLER_FAULTS`: report handler faults (default: true)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparseable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            warn_on_unsubscribed_publish: env_flag("TOWER_WARN_UNSUBSCRIBED")
                .unwrap_or(defaults.warn_on_unsubscribed_publish),
            initial_subscriber_capacity: match env::var("TOWER_SUBSCRIBER_CAPACITY") {
                Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "TOWER_SUBSCRIBER_CAPACITY",
                    value: raw.clone(),
                    reason: "not an unsigned integer",
                })?,
                Err(_) => defaults.initial_subscriber_capacity,
            },
            log_handler_faults: env_flag("TOWER_LOG_HANDLER_FAULTS")
                .unwrap_or(defaults.log_handler_faults),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::InvalidValue`] for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a field is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_subscriber_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "initial_subscriber_capacity",
                value: self.initial_subscriber_capacity.to_string(),
                reason: "must be at least 1",
            });
        }
        if self.initial_subscriber_capacity > MAX_SUBSCRIBER_CAPACITY {
            return Err(ConfigError::InvalidValue {
                key: "initial_subscriber_capacity",
                value: self.initial_subscriber_capacity.to_string(),
                reason: "exceeds 65536",
            });
        }
        Ok(())
    }

    pub fn with_warn_on_unsubscribed_publish(mut self, warn: bool) -> Self {
        self.warn_on_unsubscribed_publish = warn;
        self
    }

    pub fn with_initial_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.initial_subscriber_capacity = capacity;
        self
    }

    pub fn with_log_handler_faults(mut self, log: bool) -> Self {
        self.log_handler_faults = log;
        self
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}
