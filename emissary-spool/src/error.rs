//! Error types for the emissary-spool crate.

use thiserror::Error;

use crate::MessageId;

/// Errors raised by a [`crate::MessageStore`].
#[derive(Debug, Error)]
pub enum SpoolError {
    /// Message not found in the store.
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    /// Message already exists in the store.
    #[error("Message already exists: {0}")]
    AlreadyExists(MessageId),

    /// The message is not held by the caller (it was never claimed, or the
    /// claim was already released).
    #[error("Message is not claimed: {0}")]
    NotClaimed(MessageId),

    /// The store has reached its configured capacity.
    #[error("Spool capacity exceeded: {used}/{capacity} messages")]
    CapacityExceeded { used: usize, capacity: usize },

    /// I/O error from a persistent backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (lock poisoning, backend failures, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for SpoolError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {err}"))
    }
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;
