//! Error types for the messaging crate.
//!
//! The publish/subscribe API itself never returns errors: every recoverable
//! condition is contained at the dispatch boundary and reported through a
//! [`DiagnosticSink`](crate::DiagnosticSink). The types here cover
//! configuration and the faults a handler can produce.

use thiserror::Error;

/// Errors raised while loading or validating a [`MessengerConfig`](crate::MessengerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A fault raised by a single handler during dispatch.
///
/// Faults are isolated per handler: they are logged and counted in the
/// [`PublishReport`](crate::PublishReport) but never abort sibling handlers.
#[derive(Debug, Error)]
pub enum HandlerFault {
    /// The handler returned `Err`.
    #[error("handler failed: {0:#}")]
    Failed(anyhow::Error),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerFault {
    /// Build a fault from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

/// Result type produced by a normalised handler invocation.
pub type HandlerResult = Result<(), HandlerFault>;
