//! Type definitions shared by the delivery handlers and the dispatcher

use std::fmt;

use emissary_spool::Recipient;
use serde::{Deserialize, Serialize};

use crate::DeliveryError;

/// Outcome class of a single recipient delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Success,
    /// Failed for now; worth another attempt
    TransientNegative,
    /// Failed for good
    PermanentNegative,
}

/// An SMTP reply, or a reply-shaped answer from a local mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

impl Reply {
    #[must_use]
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Severity by reply class: 2xx, 4xx and 5xx.
    ///
    /// Any other class is not a final answer for a recipient and yields `None`.
    #[must_use]
    pub const fn severity(&self) -> Option<Severity> {
        match self.code {
            200..=299 => Some(Severity::Success),
            400..=499 => Some(Severity::TransientNegative),
            500..=599 => Some(Severity::PermanentNegative),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.severity(), Some(Severity::Success))
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.severity(), Some(Severity::TransientNegative))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// The outcome of delivering to one recipient during one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub recipient: Recipient,
    pub severity: Severity,
    /// Human readable explanation, quoted in bounce messages
    pub message: String,
}

impl DeliveryResult {
    #[must_use]
    pub fn new(recipient: Recipient, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            recipient,
            severity,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn success(recipient: Recipient, message: impl Into<String>) -> Self {
        Self::new(recipient, Severity::Success, message)
    }

    /// Classify a remote reply. Replies outside 2xx/4xx/5xx count as transient.
    #[must_use]
    pub fn from_reply(recipient: Recipient, reply: &Reply) -> Self {
        let severity = reply.severity().unwrap_or(Severity::TransientNegative);
        Self::new(recipient, severity, reply.to_string())
    }

    /// Classify a delivery error: permanent stays permanent, everything else
    /// is transient.
    #[must_use]
    pub fn from_error(recipient: Recipient, error: &DeliveryError) -> Self {
        let severity = if error.is_permanent() {
            Severity::PermanentNegative
        } else {
            Severity::TransientNegative
        };
        Self::new(recipient, severity, error.reason())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.severity == Severity::Success
    }
}

/// SMTP operation timeout configuration
///
/// Configures timeout durations for various SMTP operations to prevent
/// hung connections and ensure timely failure detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpTimeouts {
    /// Timeout for initial connection establishment and the greeting
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for EHLO/HELO commands
    ///
    /// Default: 30 seconds
    #[serde(default = "default_ehlo_timeout")]
    pub ehlo_secs: u64,

    /// Timeout for MAIL FROM command
    ///
    /// Default: 30 seconds
    #[serde(default = "default_mail_from_timeout")]
    pub mail_from_secs: u64,

    /// Timeout for each RCPT TO command
    ///
    /// Default: 30 seconds
    #[serde(default = "default_rcpt_to_timeout")]
    pub rcpt_to_secs: u64,

    /// Timeout for DATA command and message transmission
    ///
    /// This is longer than other timeouts to accommodate large messages.
    /// Default: 120 seconds (2 minutes)
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    /// Timeout for QUIT command
    ///
    /// Default: 10 seconds
    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            ehlo_secs: default_ehlo_timeout(),
            mail_from_secs: default_mail_from_timeout(),
            rcpt_to_secs: default_rcpt_to_timeout(),
            data_secs: default_data_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_ehlo_timeout() -> u64 {
    30
}

const fn default_mail_from_timeout() -> u64 {
    30
}

const fn default_rcpt_to_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_quit_timeout() -> u64 {
    10
}
