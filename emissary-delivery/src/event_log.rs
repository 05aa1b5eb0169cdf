use std::fmt::Debug;

use emissary_spool::MessageId;
use tracing::error;

use crate::DeliveryError;

/// Protocol tag attached to delivery failures.
pub const DELIVERY_PROTOCOL: &str = "SMTPD";

/// An application-level event worth recording alongside an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub protocol: &'static str,
    pub message: String,
    pub message_id: Option<MessageId>,
    pub attempt: Option<u32>,
}

impl LogEvent {
    #[must_use]
    pub fn delivery(message: impl Into<String>, message_id: MessageId, attempt: u32) -> Self {
        Self {
            protocol: DELIVERY_PROTOCOL,
            message: message.into(),
            message_id: Some(message_id),
            attempt: Some(attempt),
        }
    }
}

/// Sink for application-level errors.
pub trait EventLog: Send + Sync + Debug {
    fn record_exception(&self, event: &LogEvent, error: &DeliveryError);
}

/// Writes events to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn record_exception(&self, event: &LogEvent, err: &DeliveryError) {
        error!(
            protocol = event.protocol,
            message_id = event.message_id.map(|id| id.to_string()),
            attempt = event.attempt,
            error = %err,
            "{}",
            event.message
        );
    }
}
