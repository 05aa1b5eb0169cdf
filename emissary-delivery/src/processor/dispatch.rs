//! One delivery attempt for one claimed message

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use emissary_common::internal;
use emissary_spool::{Message, MessageId, MessageStore};
use futures_util::FutureExt;

use crate::{
    BounceGenerator, DeliveryError, EventLog, ExternalDelivery, LocalDelivery, LogEvent,
    SystemError,
    classifier::{Disposition, classify},
    router,
};

const GIVING_UP: &str = "Failed delivering message due to an error. Giving up.";
const WILL_RETRY: &str = "Failed delivering message due to an error. Will retry later.";

/// What one dispatch did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub message_id: MessageId,
    /// The attempt number, starting at 1
    pub attempt: u32,
    pub disposition: Disposition,
    /// The delivery failure report queued during this attempt, if any
    pub bounce: Option<MessageId>,
}

/// Everything needed to run an attempt, detached from the processor so it can
/// move into a worker task.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) event_log: Arc<dyn EventLog>,
    pub(crate) local: LocalDelivery,
    pub(crate) external: ExternalDelivery,
    pub(crate) bounce: BounceGenerator,
    pub(crate) max_attempts: u32,
}

impl Dispatcher {
    /// Run one attempt on a claimed message and release it back to the store.
    ///
    /// Never fails: errors during the attempt go to the event log, and the
    /// message is kept for a retry unless this was its last attempt. A panic
    /// inside a handler counts as such an error, so the claim is always
    /// released.
    pub(crate) async fn dispatch(&self, mut message: Message) -> AttemptReport {
        message.delivery_attempts = message.delivery_attempts.saturating_add(1);
        let attempt = message.delivery_attempts;
        let is_last_attempt = attempt >= self.max_attempts;

        let outcome = AssertUnwindSafe(self.attempt(&message, is_last_attempt))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panicked(panic.as_ref())));

        let (disposition, bounce) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let text = if is_last_attempt { GIVING_UP } else { WILL_RETRY };
                self.event_log
                    .record_exception(&LogEvent::delivery(text, message.id, attempt), &e);
                (Disposition::decide(is_last_attempt, false), None)
            }
        };

        self.settle(&message, disposition).await;

        AttemptReport {
            message_id: message.id,
            attempt,
            disposition,
            bounce,
        }
    }

    async fn attempt(
        &self,
        message: &Message,
        is_last_attempt: bool,
    ) -> Result<(Disposition, Option<MessageId>), DeliveryError> {
        let routes = router::partition(&message.recipients);
        let payload = self.store.read_payload(&message.id).await?;

        let mut results = Vec::with_capacity(message.recipients.len());
        if !routes.local.is_empty() {
            results.extend(self.local.deliver(message, &routes.local, &payload).await?);
        }
        if !routes.external.is_empty() {
            results.extend(
                self.external
                    .deliver(message, &routes.external, &payload)
                    .await,
            );
        }

        let classification = classify(&results, is_last_attempt);

        let bounce = if classification.failed.is_empty() {
            None
        } else {
            self.bounce
                .generate(message, &payload, &classification.failed)
                .await?
        };

        internal!(
            level = INFO,
            message_id = %message.id,
            attempt = message.delivery_attempts,
            recipients = results.len(),
            failed = classification.failed.len(),
            completed = classification.completed,
            "Delivery attempt finished"
        );

        Ok((classification.disposition, bounce))
    }

    async fn settle(&self, message: &Message, disposition: Disposition) {
        let outcome = match disposition {
            Disposition::Delete => self.store.delete(message).await,
            Disposition::Retry => self.store.update(message).await,
        };

        match outcome {
            Ok(()) => internal!(
                level = DEBUG,
                message_id = %message.id,
                attempt = message.delivery_attempts,
                "Message record settled: {disposition:?}"
            ),
            Err(e) => self.event_log.record_exception(
                &LogEvent::delivery(
                    format!("Failed to settle message record: {disposition:?}"),
                    message.id,
                    message.delivery_attempts,
                ),
                &e.into(),
            ),
        }
    }
}

fn panicked(payload: &(dyn Any + Send)) -> DeliveryError {
    let reason = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    SystemError::Internal(format!("delivery attempt panicked: {reason}")).into()
}
