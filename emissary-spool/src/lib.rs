//! Queued message model and the storage capability the delivery core uses.

pub mod backends;
pub mod error;
pub mod store;
pub mod types;

pub use backends::MemoryMessageStore;
pub use error::{Result, SpoolError};
pub use store::MessageStore;
pub use types::{AccountId, Message, MessageId, MessageState, Recipient};
