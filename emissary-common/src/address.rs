//! Helpers for the plain `local-part@domain` addresses carried on envelopes.
//!
//! Envelope addresses reach the delivery core already validated by the
//! receiving side, so these helpers only need to pull them apart. An address
//! may still arrive wrapped in angle brackets (`<user@example.com>`) or with a
//! display name (`User <user@example.com>`); both forms are accepted.

/// The mailbox name reserved for automatically generated notifications.
pub const MAILER_DAEMON: &str = "MAILER-DAEMON";

/// Strip a display name and angle brackets, leaving the bare mailbox.
#[must_use]
pub fn bare(address: &str) -> &str {
    let address = address.trim();

    match (address.rfind('<'), address.rfind('>')) {
        (Some(open), Some(close)) if open < close => address[open + 1..close].trim(),
        _ => address,
    }
}

/// Split an address into its local part and domain.
///
/// Returns `None` if there is no `@`, or either side of it is empty.
#[must_use]
pub fn split(address: &str) -> Option<(&str, &str)> {
    let (local, domain) = bare(address).rsplit_once('@')?;

    if local.is_empty() || domain.is_empty() {
        None
    } else {
        Some((local, domain))
    }
}

/// The mailbox (local part) of an address.
///
/// An address without an `@` is treated as a bare mailbox name.
#[must_use]
pub fn mailbox(address: &str) -> &str {
    let address = bare(address);
    address
        .rsplit_once('@')
        .map_or(address, |(local, _)| local)
}

/// Is this the null reverse-path (`<>` or an empty sender)?
#[must_use]
pub fn is_null_sender(address: &str) -> bool {
    bare(address).is_empty()
}

/// Does this address belong to a mailer-daemon, on any domain?
///
/// Only the mailbox is compared, case-insensitively.
#[must_use]
pub fn is_mailer_daemon(address: &str) -> bool {
    mailbox(address).eq_ignore_ascii_case(MAILER_DAEMON)
}
