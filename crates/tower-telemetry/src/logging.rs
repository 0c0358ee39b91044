//! Structured log helpers with the field names used across the messaging
//! crates:
//! - `message_type`: Rust type name of the message
//! - `scope`: the scope key, `Debug`-formatted
//! - additional context fields

/// Log a broker-related event with standard fields.
///
/// ```rust,ignore
/// log_broker_event!(info, "demo::Score", &scope, "Scoreboard ready", handlers = 3);
/// ```
#[macro_export]
macro_rules! log_broker_event {
    ($level:ident, $message_type:expr, $scope:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            message_type = $message_type,
            scope = ?$scope,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a publish outcome, taking the counts from a `PublishReport`.
#[macro_export]
macro_rules! log_publish_report {
    ($level:ident, $message_type:expr, $report:expr, $msg:expr) => {
        tracing::$level!(
            message_type = $message_type,
            invoked = $report.invoked,
            completed = $report.completed,
            faulted = $report.faulted,
            state_dropped = $report.state_dropped,
            detached = $report.detached,
            cancelled = $report.cancelled,
            $msg
        )
    };
}
