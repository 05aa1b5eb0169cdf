use std::sync::Arc;

use emissary_common::internal;
use emissary_spool::{Message, Recipient};
use tracing::debug;

use crate::{DeliveryError, DeliveryResult, MailboxStore};

/// Delivers to recipients that have a local account.
#[derive(Debug, Clone)]
pub struct LocalDelivery {
    mailboxes: Arc<dyn MailboxStore>,
}

impl LocalDelivery {
    #[must_use]
    pub fn new(mailboxes: Arc<dyn MailboxStore>) -> Self {
        Self { mailboxes }
    }

    /// Deposit the message into each recipient's mailbox.
    ///
    /// Returns one result per recipient, in order.
    ///
    /// # Errors
    ///
    /// Returns a system error if the mailbox backend itself fails; refusals
    /// by a single mailbox become that recipient's result.
    pub async fn deliver(
        &self,
        message: &Message,
        recipients: &[&Recipient],
        payload: &[u8],
    ) -> Result<Vec<DeliveryResult>, DeliveryError> {
        let mut results = Vec::with_capacity(recipients.len());

        for &recipient in recipients {
            let outcome = self
                .mailboxes
                .deposit(recipient.account_id, message, payload)
                .await;

            let result = match outcome {
                Ok(()) => {
                    internal!(
                        level = DEBUG,
                        message_id = %message.id,
                        account = recipient.account_id,
                        "Delivered to {recipient}"
                    );
                    DeliveryResult::success(recipient.clone(), "Message delivered.")
                }
                Err(refusal) => {
                    let error = DeliveryError::from(refusal);
                    if error.is_system() {
                        return Err(error);
                    }

                    debug!(
                        message_id = %message.id,
                        %recipient,
                        %error,
                        "Mailbox refused message"
                    );
                    DeliveryResult::from_error(recipient.clone(), &error)
                }
            };

            results.push(result);
        }

        Ok(results)
    }
}
