//! # Tower Telemetry
//!
//! Log output for services built on `tower-messaging`.
//!
//! The messaging crate only emits `tracing` events; this crate decides where
//! they go. A service installs one subscriber at startup and keeps the
//! returned guard for its lifetime.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tower_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // Application code here
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TOWER_SERVICE_NAME` | `tower` | Service name in logs |
//! | `TOWER_LOG_LEVEL` / `RUST_LOG` | `info` | `EnvFilter` directive |
//! | `TOWER_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `TOWER_JSON_LOGS` | `false` (`true` in containers) | JSON lines output |

mod config;
mod logging;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::init_test_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("A global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Install the global `tracing` subscriber.
///
/// Returns a guard that should be held for the lifetime of the application.
///
/// # Errors
///
/// Fails if the log filter does not parse or a subscriber is already
/// installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    tracing_setup::init_tracing(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that marks telemetry as active. Logs shutdown when dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    service_name: String,
}

impl TelemetryGuard {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}

/// Convenience macro for creating a span around messaging work.
///
/// # Example
///
/// ```rust,ignore
/// use tower_telemetry::messaging_span;
///
/// fn on_score(score: &Score) {
///     let _span = messaging_span!("on_score", message_type = "demo::Score", order = 0).entered();
///     // ... handler logic
/// }
/// ```
#[macro_export]
macro_rules! messaging_span {
    ($name:expr) => {
        tracing::info_span!($name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
