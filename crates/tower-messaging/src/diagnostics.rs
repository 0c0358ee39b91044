//! # Diagnostics
//!
//! Fail-soft reporting for conditions that must never reach the publish call
//! site: invalid publishers, handlers whose state was dropped, handler faults.
//!
//! Diagnostics are never used for control flow. The default sink forwards to
//! `tracing`; tests and hosts may inject their own.

use crate::context::CallerInfo;
use std::fmt;
use tracing::{error, warn};

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Publish through a publisher that is not bound to a messenger.
    InvalidPublisher,
    /// Subscribe through a subscriber that is not bound to a messenger.
    InvalidSubscriber,
    /// A state-bound handler was skipped because its state no longer exists.
    StateDropped,
    /// A handler returned an error or panicked.
    HandlerFault,
    /// A cached publisher outlived its broker.
    BrokerUnavailable,
    /// Pending work could not be scheduled because no runtime is available.
    NoRuntime,
    /// A message was published with no subscriber registered.
    NoSubscribers,
}

impl DiagnosticKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPublisher => "invalid_publisher",
            Self::InvalidSubscriber => "invalid_subscriber",
            Self::StateDropped => "state_dropped",
            Self::HandlerFault => "handler_fault",
            Self::BrokerUnavailable => "broker_unavailable",
            Self::NoRuntime => "no_runtime",
            Self::NoSubscribers => "no_subscribers",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Type name of the message involved.
    pub message_type: &'static str,
    /// Where the publish or subscribe call originated, when known.
    pub caller: Option<CallerInfo>,
    pub detail: String,
}

impl Diagnostic {
    pub(crate) fn new(
        kind: DiagnosticKind,
        message_type: &'static str,
        caller: Option<CallerInfo>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message_type,
            caller,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.message_type, self.detail)?;
        if let Some(caller) = &self.caller {
            write!(f, " (at {caller})")?;
        }
        Ok(())
    }
}

/// Destination for fail-soft diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn log_warning(&self, diagnostic: &Diagnostic);

    fn log_error(&self, diagnostic: &Diagnostic);
}

/// Default sink: forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn log_warning(&self, diagnostic: &Diagnostic) {
        warn!(
            kind = %diagnostic.kind,
            message_type = diagnostic.message_type,
            caller = ?diagnostic.caller.map(|c| c.to_string()),
            "{}",
            diagnostic.detail
        );
    }

    fn log_error(&self, diagnostic: &Diagnostic) {
        error!(
            kind = %diagnostic.kind,
            message_type = diagnostic.message_type,
            caller = ?diagnostic.caller.map(|c| c.to_string()),
            "{}",
            diagnostic.detail
        );
    }
}
