//! Wire-level delivery to remote mail servers

mod client;
mod response;
mod smtp;

use std::{fmt::Debug, io, net::IpAddr};

use async_trait::async_trait;
use thiserror::Error;

pub use client::SmtpClient;
pub use response::Response;
pub use smtp::SmtpTransport;

use crate::Reply;

/// Session-level transport failures.
///
/// Rejections of individual recipients are not errors; they are returned as
/// per-recipient [`Reply`] values.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// A stage of the session did not complete in time.
    #[error("{0} timed out")]
    Timeout(String),

    /// The server refused the session (greeting, EHLO/HELO or MAIL FROM).
    #[error("Server replied {code} {message}")]
    Rejected { code: u16, message: String },

    /// The server spoke something other than SMTP.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<std::str::Utf8Error> for TransportError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Protocol(format!("Reply is not valid UTF-8: {err}"))
    }
}

/// Hands a message to one remote host.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Deliver `payload` from `sender` to `recipients` through `host`.
    ///
    /// On success the result holds exactly one reply per recipient, in the
    /// same order: the `RCPT TO` reply for a refused recipient, the final
    /// reply to the message data for an accepted one.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the session as a whole failed.
    async fn send(
        &self,
        host: IpAddr,
        sender: &str,
        recipients: &[&str],
        payload: &[u8],
    ) -> Result<Vec<Reply>, TransportError>;
}
