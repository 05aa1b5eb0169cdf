//! Typed error handling for delivery operations.
//!
//! This module provides structured error types that distinguish between:
//! - Permanent failures (5xx SMTP codes, unroutable addresses) - never retried
//! - Temporary failures (4xx SMTP codes, DNS and network trouble) - retried
//! - System errors - storage and other internal faults that abort an attempt
//!
//! Permanent and temporary errors describe what happened to a recipient and
//! end up as [`DeliveryResult`](crate::DeliveryResult) messages. System errors
//! are propagated to the dispatcher, which logs them and retries the message.

use emissary_spool::SpoolError;
use thiserror::Error;

use crate::{DnsError, MailboxError, TransportError};

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Permanent failure that should not be retried (e.g., 5xx SMTP codes).
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Temporary failure that can be retried (e.g., 4xx SMTP codes).
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    /// System-level error (storage, parsing, internal errors, etc.).
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// Permanent errors that should not be retried.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// Recipient address has no usable domain part.
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    /// The domain resolved to no deliverable addresses.
    #[error("No mail servers available for domain: {0}")]
    NoMailServers(String),

    /// The remote server rejected the transaction with a 5xx reply.
    #[error("Message rejected: {0}")]
    MessageRejected(String),

    /// The recipient's local account does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The recipient's mailbox quota would be exceeded by this message.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
}

/// Temporary errors that should be retried on a later attempt.
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// Failed to establish or keep a connection to the mail server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// DNS lookup failed.
    #[error("DNS lookup failed: {0}")]
    DnsLookupFailed(String),

    /// An operation timed out.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Server returned a temporary failure code.
    #[error("Temporary SMTP error: {0}")]
    SmtpTemporary(String),

    /// Every mail server of a domain was tried without success.
    #[error("All mail servers for {domain} failed, last error: {last}")]
    HostsExhausted { domain: String, last: String },

    /// The local mailbox cannot accept mail right now.
    #[error("Mailbox unavailable: {0}")]
    MailboxUnavailable(String),
}

/// System-level errors that indicate internal problems.
#[derive(Debug, Error)]
pub enum SystemError {
    /// The message store failed.
    #[error("Message store error: {0}")]
    Store(#[from] SpoolError),

    /// The message payload could not be parsed.
    #[error("Payload parse error: {0}")]
    PayloadParse(String),

    /// The mailbox backend failed.
    #[error("Mailbox backend error: {0}")]
    Mailbox(String),

    /// A bounce message could not be built or queued.
    #[error("Bounce error: {0}")]
    Bounce(String),

    /// Delivery processor not initialised.
    #[error("Delivery processor not initialised: {0}")]
    NotInitialised(String),

    /// Other internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Returns `true` if this error is temporary and should be retried.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent and should not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if this is a system error.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    /// The underlying reason, without the category prefix.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Permanent(e) => e.to_string(),
            Self::Temporary(e) => e.to_string(),
            Self::System(e) => e.to_string(),
        }
    }
}

impl From<SpoolError> for DeliveryError {
    fn from(error: SpoolError) -> Self {
        Self::System(SystemError::Store(error))
    }
}

/// All DNS failures, NXDOMAIN included, are temporary.
impl From<DnsError> for DeliveryError {
    fn from(error: DnsError) -> Self {
        match error {
            DnsError::Timeout(name) => Self::Temporary(TemporaryError::Timeout(format!(
                "DNS query for {name}"
            ))),
            other => Self::Temporary(TemporaryError::DnsLookupFailed(other.to_string())),
        }
    }
}

/// Convert a transport failure into a `DeliveryError`.
///
/// - **4xx replies** → Temporary
/// - **5xx replies** → Permanent
/// - **Connection/I/O errors and timeouts** → Temporary
/// - **Protocol violations** → System
impl From<TransportError> for DeliveryError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Rejected { code, message } if (400..500).contains(&code) => {
                Self::Temporary(TemporaryError::SmtpTemporary(format!("{code} {message}")))
            }

            TransportError::Rejected { code, message } if (500..600).contains(&code) => {
                Self::Permanent(PermanentError::MessageRejected(format!("{code} {message}")))
            }

            TransportError::Rejected { code, message } => Self::System(SystemError::Internal(
                format!("Unexpected SMTP response: {code} {message}"),
            )),

            TransportError::Io(e) => {
                Self::Temporary(TemporaryError::ConnectionFailed(format!("I/O error: {e}")))
            }

            TransportError::ConnectionClosed => Self::Temporary(TemporaryError::ConnectionFailed(
                "Connection closed unexpectedly".to_string(),
            )),

            TransportError::Timeout(stage) => Self::Temporary(TemporaryError::Timeout(stage)),

            TransportError::Protocol(msg) => Self::System(SystemError::Internal(format!(
                "SMTP protocol error: {msg}"
            ))),
        }
    }
}

impl From<MailboxError> for DeliveryError {
    fn from(error: MailboxError) -> Self {
        match error {
            MailboxError::AccountNotFound(account) => {
                Self::Permanent(PermanentError::AccountNotFound(account.to_string()))
            }
            MailboxError::QuotaExceeded(account) => {
                Self::Permanent(PermanentError::QuotaExceeded(account.to_string()))
            }
            MailboxError::MailboxFull(account) => Self::Temporary(
                TemporaryError::MailboxUnavailable(format!("mailbox of account {account} is full")),
            ),
            MailboxError::Unavailable(reason) => {
                Self::Temporary(TemporaryError::MailboxUnavailable(reason))
            }
            MailboxError::Backend(reason) => Self::System(SystemError::Mailbox(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_kinds() {
        let error = DeliveryError::Temporary(TemporaryError::ConnectionFailed(
            "Connection refused".to_string(),
        ));
        assert!(error.is_temporary());
        assert!(!error.is_permanent());
        assert!(!error.is_system());

        let error = DeliveryError::Permanent(PermanentError::InvalidRecipient(
            "user".to_string(),
        ));
        assert!(error.is_permanent());

        let error = DeliveryError::System(SystemError::Internal("Internal error".to_string()));
        assert!(error.is_system());
    }

    #[test]
    fn test_dns_errors_are_temporary() {
        let errors = [
            DnsError::DomainNotFound("example.com".to_string()),
            DnsError::Timeout("example.com".to_string()),
            DnsError::LookupFailed {
                name: "mx.example.com".to_string(),
                reason: "SERVFAIL".to_string(),
            },
        ];

        for error in errors {
            let delivery_err: DeliveryError = error.into();
            assert!(delivery_err.is_temporary(), "{delivery_err}");
        }
    }

    #[test]
    fn test_dns_error_names_domain() {
        let delivery_err: DeliveryError =
            DnsError::DomainNotFound("example.com".to_string()).into();
        assert!(delivery_err.to_string().contains("example.com"));
    }

    #[test]
    fn test_error_display() {
        let error = DeliveryError::Permanent(PermanentError::InvalidRecipient(
            "user".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Permanent failure: Invalid recipient address: user"
        );

        let error = DeliveryError::Temporary(TemporaryError::HostsExhausted {
            domain: "example.com".to_string(),
            last: "Connection failed: refused".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "Temporary failure: All mail servers for example.com failed, last error: Connection failed: refused"
        );
    }

    #[test]
    fn test_transport_error_conversion_by_reply_class() {
        let delivery_err: DeliveryError = TransportError::Rejected {
            code: 421,
            message: "Service not available".to_string(),
        }
        .into();
        assert!(delivery_err.is_temporary());
        assert_eq!(
            delivery_err.to_string(),
            "Temporary failure: Temporary SMTP error: 421 Service not available"
        );

        let delivery_err: DeliveryError = TransportError::Rejected {
            code: 554,
            message: "No thanks".to_string(),
        }
        .into();
        assert!(delivery_err.is_permanent());
        assert_eq!(
            delivery_err.to_string(),
            "Permanent failure: Message rejected: 554 No thanks"
        );

        let delivery_err: DeliveryError = TransportError::Rejected {
            code: 999,
            message: "Unknown code".to_string(),
        }
        .into();
        assert!(delivery_err.is_system());
    }

    #[test]
    fn test_transport_error_conversion_connection() {
        let delivery_err: DeliveryError = TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))
        .into();
        assert!(delivery_err.is_temporary());

        let delivery_err: DeliveryError = TransportError::ConnectionClosed.into();
        assert_eq!(
            delivery_err.to_string(),
            "Temporary failure: Connection failed: Connection closed unexpectedly"
        );

        let delivery_err: DeliveryError = TransportError::Timeout("DATA".to_string()).into();
        assert!(delivery_err.is_temporary());

        let delivery_err: DeliveryError = TransportError::Protocol("garbage".to_string()).into();
        assert!(delivery_err.is_system());
    }

    #[test]
    fn test_mailbox_error_conversion() {
        let permanent: [DeliveryError; 2] = [
            MailboxError::AccountNotFound(7).into(),
            MailboxError::QuotaExceeded(7).into(),
        ];
        assert!(permanent.iter().all(DeliveryError::is_permanent));

        let temporary: [DeliveryError; 2] = [
            MailboxError::MailboxFull(7).into(),
            MailboxError::Unavailable("locked".to_string()).into(),
        ];
        assert!(temporary.iter().all(DeliveryError::is_temporary));

        let system: DeliveryError = MailboxError::Backend("disk gone".to_string()).into();
        assert!(system.is_system());
    }

    #[test]
    fn test_spool_error_is_system() {
        let error: DeliveryError = SpoolError::Internal("boom".to_string()).into();
        assert!(error.is_system());
        assert_eq!(
            error.to_string(),
            "System error: Message store error: Internal error: boom"
        );
    }
}
