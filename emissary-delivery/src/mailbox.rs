use std::fmt::Debug;

use async_trait::async_trait;
use emissary_spool::{AccountId, Message};
use thiserror::Error;

/// Reasons a local mailbox refused a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailboxError {
    #[error("account {0} does not exist")]
    AccountNotFound(AccountId),

    #[error("account {0} is over quota")]
    QuotaExceeded(AccountId),

    #[error("mailbox of account {0} is full")]
    MailboxFull(AccountId),

    /// The mailbox exists but cannot take mail right now (locked, offline).
    #[error("mailbox temporarily unavailable: {0}")]
    Unavailable(String),

    /// The account store itself failed.
    #[error("{0}")]
    Backend(String),
}

/// Local accounts and their mailboxes.
#[async_trait]
pub trait MailboxStore: Send + Sync + Debug {
    /// Look up the local account that receives mail for `address`.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Backend`] if the account store cannot be queried.
    async fn find_account(&self, address: &str) -> Result<Option<AccountId>, MailboxError>;

    /// File `payload` into the inbox of `account`.
    ///
    /// # Errors
    ///
    /// Returns a [`MailboxError`] describing why the message was not stored.
    async fn deposit(
        &self,
        account: AccountId,
        message: &Message,
        payload: &[u8],
    ) -> Result<(), MailboxError>;
}
