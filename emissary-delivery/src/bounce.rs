//! Non-delivery notifications
//!
//! When recipients of a message fail for good (or are still failing on the
//! last attempt), the sender gets a plain-text report listing each failed
//! recipient and the reason. The report is queued through the message store
//! like any other message and delivered by the same dispatcher.
//!
//! Reports are never sent to the null reverse-path or to a mailer-daemon
//! address.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use emissary_common::{address, internal};
use emissary_spool::{Message, MessageId, MessageStore, Recipient};
use mailparse::MailHeaderMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DeliveryError, DeliveryResult, MailboxStore, SystemError};

/// Body of every report. The macros are replaced verbatim.
pub const BOUNCE_TEMPLATE: &str =
    "Your message did not reach some or all of the intended recipients.\r\n\
\r\n   Sent: %MACRO_SENT%\r\n   Subject: %MACRO_SUBJECT%\r\n\
\r\nThe following recipient(s) could not be reached:\r\n\
\r\n%MACRO_RECIPIENTS%\r\n\
emissary\r\n";

const SENT: &str = "%MACRO_SENT%";
const SUBJECT: &str = "%MACRO_SUBJECT%";
const RECIPIENTS: &str = "%MACRO_RECIPIENTS%";

/// Configuration for bounce generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BounceConfig {
    /// Enable/disable bounce generation globally (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Host part of the `mailer-daemon@` address reports are sent from
    /// (default: `localhost`)
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

const fn default_enabled() -> bool {
    true
}

fn default_hostname() -> String {
    "localhost".to_string()
}

impl Default for BounceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            hostname: default_hostname(),
        }
    }
}

impl BounceConfig {
    /// The address reports are sent from
    #[must_use]
    pub fn sender(&self) -> String {
        format!("mailer-daemon@{}", self.hostname)
    }
}

/// May a report be sent to `from`?
///
/// Not to the null reverse-path, and not to any mailer-daemon mailbox.
#[must_use]
pub fn should_bounce(from: &str) -> bool {
    !address::is_null_sender(from) && !address::is_mailer_daemon(from)
}

/// What the report says about the original message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalSummary {
    pub sent: String,
    pub subject: String,
}

impl OriginalSummary {
    /// Read the `Date` and `Subject` headers of the original payload.
    ///
    /// A missing date reads `unknown`; a date that cannot be parsed is
    /// quoted as written. A missing subject is empty.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::PayloadParse`] if the header block is malformed.
    pub fn from_payload(payload: &[u8]) -> Result<Self, DeliveryError> {
        let (headers, _) = mailparse::parse_headers(payload)
            .map_err(|e| SystemError::PayloadParse(e.to_string()))?;

        let sent = headers
            .get_first_value("Date")
            .map_or_else(|| "unknown".to_string(), |date| format_sent(&date));

        let subject = headers
            .get_first_value("Subject")
            .map(|subject| subject.replace(['\r', '\n'], " ").trim().to_string())
            .unwrap_or_default();

        Ok(Self { sent, subject })
    }
}

fn format_sent(date: &str) -> String {
    mailparse::dateparse(date)
        .ok()
        .and_then(|timestamp| DateTime::<Utc>::from_timestamp(timestamp, 0))
        .map_or_else(|| date.trim().to_string(), |dt| dt.to_rfc2822())
}

/// Replace each `(macro, value)` in one pass, so a value that happens to
/// contain a macro name is left alone.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        match values.iter().find(|(name, _)| rest.starts_with(name)) {
            Some((name, value)) => {
                out.push_str(value);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('%');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Render the report body for the failed recipients.
#[must_use]
pub fn render_body(summary: &OriginalSummary, failed: &[&DeliveryResult]) -> String {
    let recipients: String = failed
        .iter()
        .map(|result| {
            format!(
                "Recipient: {}\r\nMessage: {}\r\n\r\n",
                result.recipient.display_address(),
                result.message
            )
        })
        .collect();

    fill(
        BOUNCE_TEMPLATE,
        &[
            (SENT, summary.sent.as_str()),
            (SUBJECT, summary.subject.as_str()),
            (RECIPIENTS, recipients.as_str()),
        ],
    )
}

/// Wrap a report body into a complete `text/plain` message.
#[must_use]
pub fn compose(
    config: &BounceConfig,
    to: &str,
    body: &str,
    date: DateTime<Utc>,
    id: &MessageId,
) -> String {
    format!(
        "From: {from}\r\n\
        To: {to}\r\n\
        Subject: Delivery failure\r\n\
        Date: {date}\r\n\
        Message-ID: <{id}@{hostname}>\r\n\
        MIME-Version: 1.0\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        Content-Transfer-Encoding: 8bit\r\n\
        Auto-Submitted: auto-replied\r\n\
        \r\n\
        {body}",
        from = config.sender(),
        date = date.to_rfc2822(),
        hostname = config.hostname,
    )
}

/// Builds reports and queues them for delivery.
#[derive(Debug, Clone)]
pub struct BounceGenerator {
    config: BounceConfig,
    store: Arc<dyn MessageStore>,
    mailboxes: Arc<dyn MailboxStore>,
}

impl BounceGenerator {
    #[must_use]
    pub fn new(
        config: BounceConfig,
        store: Arc<dyn MessageStore>,
        mailboxes: Arc<dyn MailboxStore>,
    ) -> Self {
        Self {
            config,
            store,
            mailboxes,
        }
    }

    /// Queue a report about `failed` to the sender of `original`.
    ///
    /// Returns the id of the queued report, or `None` if no report was due.
    ///
    /// # Errors
    ///
    /// Returns a system error if the payload cannot be parsed, the sender's
    /// account cannot be looked up, or the report cannot be stored.
    pub async fn generate(
        &self,
        original: &Message,
        payload: &[u8],
        failed: &[&DeliveryResult],
    ) -> Result<Option<MessageId>, DeliveryError> {
        if !self.config.enabled || failed.is_empty() {
            return Ok(None);
        }

        if !should_bounce(&original.from) {
            debug!(message_id = %original.id, from = %original.from, "Not bouncing to this sender");
            return Ok(None);
        }

        let summary = OriginalSummary::from_payload(payload)?;
        let body = render_body(&summary, failed);

        let to = address::bare(&original.from);
        let account = self
            .mailboxes
            .find_account(to)
            .await
            .map_err(|e| SystemError::Mailbox(e.to_string()))?;
        let recipient = Recipient {
            account_id: account.unwrap_or_default(),
            ..Recipient::external(to)
        };

        let mut bounce = Message::new(self.config.sender(), vec![recipient]);
        let text = compose(&self.config, to, &body, Utc::now(), &bounce.id);
        bounce.size = u64::try_from(text.len()).unwrap_or(u64::MAX);

        self.store
            .insert(&bounce, Arc::from(text.into_bytes()))
            .await
            .map_err(|e| SystemError::Bounce(format!("report {} not queued: {e}", bounce.id)))?;

        internal!(
            level = INFO,
            message_id = %original.id,
            bounce_id = %bounce.id,
            failed = failed.len(),
            "Queued delivery failure report to {to}"
        );

        Ok(Some(bounce.id))
    }
}
