use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use tracing::trace;

use crate::{Message, MessageId, MessageState, SpoolError, store::MessageStore};

#[derive(Debug, Clone)]
struct Entry {
    message: Message,
    payload: Arc<[u8]>,
    claimed: bool,
}

/// In-memory message store
///
/// Messages live in a `HashMap` behind an `RwLock`. Claims are taken under the
/// write lock, so two concurrent `claim_next` calls can never observe the same
/// unclaimed entry. Messages are handed out oldest first (ULID order).
///
/// # Capacity Management
/// An optional capacity bounds the number of stored messages; inserts beyond
/// it fail with [`SpoolError::CapacityExceeded`].
#[derive(Debug, Clone, Default)]
pub struct MemoryMessageStore {
    messages: Arc<RwLock<HashMap<MessageId, Entry>>>,
    capacity: Option<usize>,
}

impl MemoryMessageStore {
    /// Create a new empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store holding at most `capacity` messages
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Number of stored messages, claimed or not
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// A snapshot of a stored message record
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.messages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .map(|entry| entry.message.clone())
    }

    /// Snapshots of every stored message, oldest first
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        let mut messages: Vec<_> = self
            .messages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .map(|entry| entry.message.clone())
            .collect();
        messages.sort_by_key(|message| message.id);
        messages
    }

    /// Is the message currently held by a dispatcher?
    #[must_use]
    pub fn is_claimed(&self, id: &MessageId) -> bool {
        self.messages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .is_some_and(|entry| entry.claimed)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn claim_next(&self) -> crate::Result<Option<Message>> {
        let mut messages = self.messages.write()?;

        let next = messages
            .iter_mut()
            .filter(|(_, entry)| !entry.claimed && entry.message.state == MessageState::Delivering)
            .min_by_key(|(id, _)| **id)
            .map(|(_, entry)| {
                entry.claimed = true;
                entry.message.clone()
            });

        if let Some(message) = &next {
            trace!(message_id = %message.id, "Claimed message");
        }

        Ok(next)
    }

    async fn update(&self, message: &Message) -> crate::Result<()> {
        let mut messages = self.messages.write()?;
        let entry = messages
            .get_mut(&message.id)
            .ok_or(SpoolError::NotFound(message.id))?;

        if !entry.claimed {
            return Err(SpoolError::NotClaimed(message.id));
        }

        entry.message = message.clone();
        entry.claimed = false;
        Ok(())
    }

    async fn delete(&self, message: &Message) -> crate::Result<()> {
        self.messages
            .write()?
            .remove(&message.id)
            .ok_or(SpoolError::NotFound(message.id))?;
        Ok(())
    }

    async fn insert(&self, message: &Message, payload: Arc<[u8]>) -> crate::Result<()> {
        let mut messages = self.messages.write()?;

        if messages.contains_key(&message.id) {
            return Err(SpoolError::AlreadyExists(message.id));
        }

        if let Some(capacity) = self.capacity
            && messages.len() >= capacity
        {
            return Err(SpoolError::CapacityExceeded {
                used: messages.len(),
                capacity,
            });
        }

        messages.insert(
            message.id,
            Entry {
                message: message.clone(),
                payload,
                claimed: false,
            },
        );
        Ok(())
    }

    async fn read_payload(&self, id: &MessageId) -> crate::Result<Arc<[u8]>> {
        self.messages
            .read()?
            .get(id)
            .map(|entry| Arc::clone(&entry.payload))
            .ok_or(SpoolError::NotFound(*id))
    }
}
