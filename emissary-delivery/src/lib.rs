//! Outbound delivery core for queued mail
//!
//! This crate provides functionality to:
//! - Claim queued messages and run delivery attempts with a bounded retry count
//! - Route recipients to local mailboxes or to remote mail servers
//! - Resolve recipient domains through DNS MX records
//! - Speak SMTP to remote mail servers
//! - Classify per-recipient outcomes and queue delivery failure reports

pub mod bounce;
pub mod classifier;
mod config;
mod dns;
mod error;
mod event_log;
mod handler;
mod mailbox;
mod processor;
pub mod router;
pub mod transport;
mod types;

// Re-export bounce types
pub use bounce::{BounceConfig, BounceGenerator};
pub use classifier::{Classification, Disposition};
pub use config::DeliveryConfig;
// Re-export DNS types
pub use dns::{
    DnsConfig, DnsError, DnsLookup, DnsResolver, HickoryLookup, MxRecord, ResolveMx,
    order_exchanges,
};
// Re-export error types
pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
pub use event_log::{DELIVERY_PROTOCOL, EventLog, LogEvent, TracingEventLog};
pub use handler::{ExternalDelivery, LocalDelivery};
pub use mailbox::{MailboxError, MailboxStore};
// Re-export core types
pub use processor::{AttemptReport, DeliveryProcessor};
pub use transport::{SmtpTransport, Transport, TransportError};
pub use types::{DeliveryResult, Reply, Severity, SmtpTimeouts};
