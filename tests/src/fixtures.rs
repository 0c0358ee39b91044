//! Shared test fixtures.

use parking_lot::Mutex;
use std::sync::Arc;
use tower_messaging::{
    Diagnostic, DiagnosticKind, DiagnosticSink, Messenger, MessengerConfig, ScopeKey,
};

/// Payload used across the suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping(pub u32);

/// A second message type, to check type separation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong(pub u32);

/// Sink that keeps every diagnostic for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    warnings: Mutex<Vec<Diagnostic>>,
    errors: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Diagnostics of `kind`, warnings and errors together.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.warnings
            .lock()
            .iter()
            .chain(self.errors.lock().iter())
            .filter(|d| d.kind == kind)
            .count()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.warnings.lock().clone()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.errors.lock().clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn log_warning(&self, diagnostic: &Diagnostic) {
        self.warnings.lock().push(diagnostic.clone());
    }

    fn log_error(&self, diagnostic: &Diagnostic) {
        self.errors.lock().push(diagnostic.clone());
    }
}

/// Messenger reporting into a fresh [`RecordingSink`].
pub fn recording_messenger<S: ScopeKey>() -> (Messenger<S>, Arc<RecordingSink>) {
    recording_messenger_with(MessengerConfig::default())
}

pub fn recording_messenger_with<S: ScopeKey>(
    config: MessengerConfig,
) -> (Messenger<S>, Arc<RecordingSink>) {
    tower_telemetry::init_test_logging();
    let sink = RecordingSink::new();
    let messenger = Messenger::builder()
        .config(config)
        .sink(Arc::clone(&sink) as Arc<dyn DiagnosticSink>)
        .build()
        .unwrap_or_else(|e| panic!("test config must be valid: {e}"));
    (messenger, sink)
}
