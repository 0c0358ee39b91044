//! # Publishing Context
//!
//! Caller metadata and an optional diagnostic sink override, carried with
//! every publish. Handlers created with
//! [`Handler::sync_with_context`](crate::Handler::sync_with_context) or
//! [`Handler::future_with_context`](crate::Handler::future_with_context)
//! receive it.

use crate::diagnostics::DiagnosticSink;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Source location of a publish or subscribe call.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CallerInfo {
    location: &'static Location<'static>,
    member: Option<&'static str>,
}

impl CallerInfo {
    /// Capture the location of the caller.
    #[track_caller]
    #[must_use]
    pub fn here() -> Self {
        Self {
            location: Location::caller(),
            member: None,
        }
    }

    /// Attach a member label (function or component name).
    #[must_use]
    pub fn with_member(mut self, member: &'static str) -> Self {
        self.member = Some(member);
        self
    }

    #[must_use]
    pub fn file(&self) -> &'static str {
        self.location.file()
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.location.line()
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.location.column()
    }

    #[must_use]
    pub fn member(&self) -> Option<&'static str> {
        self.member
    }
}

impl fmt::Display for CallerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(member) = self.member {
            write!(f, "{member} ")?;
        }
        write!(f, "{}:{}:{}", self.file(), self.line(), self.column())
    }
}

impl fmt::Debug for CallerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Per-publish metadata.
#[derive(Clone)]
pub struct PublishingContext {
    caller: CallerInfo,
    logger: Option<Arc<dyn DiagnosticSink>>,
}

impl PublishingContext {
    /// Context capturing the caller's location.
    #[track_caller]
    #[must_use]
    pub fn get() -> Self {
        Self {
            caller: CallerInfo::here(),
            logger: None,
        }
    }

    /// Context with an explicit caller.
    #[must_use]
    pub fn from_caller(caller: CallerInfo) -> Self {
        Self {
            caller,
            logger: None,
        }
    }

    /// Route diagnostics of this publish to `logger` instead of the
    /// messenger's sink.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn DiagnosticSink>) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn caller(&self) -> CallerInfo {
        self.caller
    }

    #[must_use]
    pub fn logger(&self) -> Option<&Arc<dyn DiagnosticSink>> {
        self.logger.as_ref()
    }

    /// The override if set, otherwise `fallback`.
    pub(crate) fn sink_or(&self, fallback: &Arc<dyn DiagnosticSink>) -> Arc<dyn DiagnosticSink> {
        self.logger.clone().unwrap_or_else(|| Arc::clone(fallback))
    }
}

impl Default for PublishingContext {
    #[track_caller]
    fn default() -> Self {
        Self::get()
    }
}

impl fmt::Debug for PublishingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishingContext")
            .field("caller", &self.caller)
            .field("has_logger", &self.logger.is_some())
            .finish()
    }
}
