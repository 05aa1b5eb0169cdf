use std::{net::IpAddr, sync::Arc};

use emissary_common::{Domain, address, internal};
use emissary_spool::{Message, Recipient};
use tracing::{debug, warn};

use crate::{
    DeliveryError, DeliveryResult, PermanentError, Reply, ResolveMx, TemporaryError, Transport,
};

/// Recipients of one message that share a destination domain.
#[derive(Debug)]
struct DomainGroup<'a> {
    domain: Domain,
    /// Position of each recipient in the handler's input, with the recipient
    members: Vec<(usize, &'a Recipient)>,
}

/// Group recipients by domain in first-seen order.
///
/// Recipients without a domain part are returned separately.
fn group_by_domain<'a>(
    recipients: &[&'a Recipient],
) -> (Vec<DomainGroup<'a>>, Vec<(usize, &'a Recipient)>) {
    let mut groups: Vec<DomainGroup<'a>> = Vec::new();
    let mut invalid = Vec::new();

    for (index, &recipient) in recipients.iter().enumerate() {
        let Some(domain) = recipient.domain() else {
            invalid.push((index, recipient));
            continue;
        };

        match groups.iter_mut().find(|group| group.domain == domain) {
            Some(group) => group.members.push((index, recipient)),
            None => groups.push(DomainGroup {
                domain,
                members: vec![(index, recipient)],
            }),
        }
    }

    (groups, invalid)
}

/// Delivers to recipients without a local account, over SMTP to the mail
/// servers of their domain.
#[derive(Debug, Clone)]
pub struct ExternalDelivery {
    resolver: Arc<dyn ResolveMx>,
    transport: Arc<dyn Transport>,
}

impl ExternalDelivery {
    #[must_use]
    pub fn new(resolver: Arc<dyn ResolveMx>, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver,
            transport,
        }
    }

    /// Deliver to every recipient, one domain at a time.
    ///
    /// Returns one result per recipient, in input order. A failure in one
    /// domain never affects the results of another.
    pub async fn deliver(
        &self,
        message: &Message,
        recipients: &[&Recipient],
        payload: &[u8],
    ) -> Vec<DeliveryResult> {
        let (groups, invalid) = group_by_domain(recipients);
        let mut results = Vec::with_capacity(recipients.len());

        for (index, recipient) in invalid {
            let error = DeliveryError::from(PermanentError::InvalidRecipient(
                recipient.address.clone(),
            ));
            results.push((index, DeliveryResult::from_error(recipient.clone(), &error)));
        }

        for group in &groups {
            let outcome = self.deliver_domain(message, group, payload).await;
            results.extend(outcome);
        }

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    async fn deliver_domain(
        &self,
        message: &Message,
        group: &DomainGroup<'_>,
        payload: &[u8],
    ) -> Vec<(usize, DeliveryResult)> {
        let domain = &group.domain;

        let hosts = match self.resolver.resolve_mx_addresses(domain).await {
            Ok(hosts) => hosts,
            Err(err) => {
                warn!(message_id = %message.id, %domain, error = %err, "MX resolution failed");
                return Self::fail_all(group, &DeliveryError::from(err));
            }
        };

        if hosts.is_empty() {
            let error = DeliveryError::from(PermanentError::NoMailServers(domain.to_string()));
            return Self::fail_all(group, &error);
        }

        let sender = address::bare(&message.from);
        let addresses: Vec<&str> = group
            .members
            .iter()
            .map(|(_, recipient)| address::bare(&recipient.address))
            .collect();

        let mut last_failure: Option<DeliveryError> = None;
        let mut deferred: Option<Vec<Reply>> = None;
        for &host in hosts.iter() {
            match self.try_host(message, domain, host, sender, &addresses, payload).await {
                Ok(replies) if is_deferral(&replies) => {
                    debug!(
                        message_id = %message.id,
                        %domain,
                        %host,
                        "Host deferred every recipient"
                    );
                    deferred = Some(replies);
                }
                Ok(replies) => return results_for(group, replies),
                Err(error) if error.is_permanent() => return Self::fail_all(group, &error),
                Err(error) => last_failure = Some(error),
            }
        }

        if let Some(replies) = deferred {
            return results_for(group, replies);
        }

        let last = last_failure.map_or_else(String::new, |error| error.reason());
        let error = DeliveryError::from(TemporaryError::HostsExhausted {
            domain: domain.to_string(),
            last,
        });
        Self::fail_all(group, &error)
    }

    async fn try_host(
        &self,
        message: &Message,
        domain: &Domain,
        host: IpAddr,
        sender: &str,
        recipients: &[&str],
        payload: &[u8],
    ) -> Result<Vec<Reply>, DeliveryError> {
        internal!(
            level = DEBUG,
            message_id = %message.id,
            %domain,
            %host,
            "Sending message to {} recipient(s)",
            recipients.len()
        );

        let replies = self
            .transport
            .send(host, sender, recipients, payload)
            .await
            .inspect_err(|err| {
                warn!(
                    message_id = %message.id,
                    %domain,
                    %host,
                    error = %err,
                    "Delivery to host failed"
                );
            })?;

        if replies.len() == recipients.len() {
            debug!(message_id = %message.id, %domain, %host, "Host answered every recipient");
            Ok(replies)
        } else {
            Err(TemporaryError::ConnectionFailed(format!(
                "{host} returned {} replies for {} recipients",
                replies.len(),
                recipients.len()
            ))
            .into())
        }
    }

    fn fail_all(group: &DomainGroup<'_>, error: &DeliveryError) -> Vec<(usize, DeliveryResult)> {
        group
            .members
            .iter()
            .map(|&(index, recipient)| {
                (index, DeliveryResult::from_error(recipient.clone(), error))
            })
            .collect()
    }
}

/// No recipient was accepted and at least one may succeed elsewhere.
fn is_deferral(replies: &[Reply]) -> bool {
    !replies.iter().any(Reply::is_success) && replies.iter().any(Reply::is_transient)
}

fn results_for(group: &DomainGroup<'_>, replies: Vec<Reply>) -> Vec<(usize, DeliveryResult)> {
    group
        .members
        .iter()
        .zip(replies)
        .map(|(&(index, recipient), reply)| {
            (index, DeliveryResult::from_reply(recipient.clone(), &reply))
        })
        .collect()
}
