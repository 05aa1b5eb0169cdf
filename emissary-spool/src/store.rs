use std::sync::Arc;

use async_trait::async_trait;

use crate::{Message, MessageId};

/// Persistent storage for queued messages, as seen by the delivery core.
///
/// Implementations are shared services: every method may be called from
/// several dispatch tasks at once, and implementations provide their own
/// synchronisation.
///
/// # Claim semantics
///
/// [`claim_next`](Self::claim_next) hands a message to exactly one caller.
/// Until that caller releases it with [`update`](Self::update) or
/// [`delete`](Self::delete), no other `claim_next` call, in this process or
/// any other sharing the store, may return the same message.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Claim the next message that is due for delivery.
    ///
    /// # Errors
    /// If the backend cannot be queried
    async fn claim_next(&self) -> crate::Result<Option<Message>>;

    /// Persist a claimed message (typically with a bumped attempt counter)
    /// and release the claim so it can be retried later.
    ///
    /// # Errors
    /// If the message does not exist or cannot be written
    async fn update(&self, message: &Message) -> crate::Result<()>;

    /// Remove a message and its payload from the store.
    ///
    /// # Errors
    /// If the message does not exist or cannot be removed
    async fn delete(&self, message: &Message) -> crate::Result<()>;

    /// Queue a new message together with its serialized payload.
    ///
    /// # Errors
    /// If a message with the same id exists or the write fails
    async fn insert(&self, message: &Message, payload: Arc<[u8]>) -> crate::Result<()>;

    /// Load the raw MIME payload of a message.
    ///
    /// # Errors
    /// If the payload does not exist or cannot be read
    async fn read_payload(&self, id: &MessageId) -> crate::Result<Arc<[u8]>>;
}
