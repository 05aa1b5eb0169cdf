//! Splits a message's recipients between local mailboxes and remote hosts.

use emissary_spool::Recipient;

/// Recipients of one message, partitioned by delivery class.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Routes<'a> {
    /// Recipients with a local account
    pub local: Vec<&'a Recipient>,
    /// Recipients without one, delivered over SMTP
    pub external: Vec<&'a Recipient>,
}

/// Partition recipients by account id alone.
///
/// Every recipient lands in exactly one of the two lists, in its original
/// relative order.
#[must_use]
pub fn partition(recipients: &[Recipient]) -> Routes<'_> {
    let (local, external) = recipients.iter().partition(|recipient| recipient.is_local());
    Routes { local, external }
}
