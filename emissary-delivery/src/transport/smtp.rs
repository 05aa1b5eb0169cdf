use std::{
    future::Future,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Response, SmtpClient, Transport, TransportError};
use crate::{Reply, SmtpTimeouts};

/// Plain SMTP delivery to port `port` of each host.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    port: u16,
    helo_name: String,
    timeouts: SmtpTimeouts,
}

/// Bound one step of the session.
async fn step<T>(
    stage: &str,
    secs: u64,
    fut: impl Future<Output = Result<T, TransportError>> + Send,
) -> Result<T, TransportError> {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| TransportError::Timeout(stage.to_string()))?
}

/// A session-level reply that must be positive to carry on.
fn expect_success(response: Response) -> Result<Response, TransportError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(TransportError::Rejected {
            code: response.code,
            message: response.message(),
        })
    }
}

impl SmtpTransport {
    #[must_use]
    pub fn new(port: u16, helo_name: impl Into<String>, timeouts: SmtpTimeouts) -> Self {
        Self {
            port,
            helo_name: helo_name.into(),
            timeouts,
        }
    }

    /// Greeting, EHLO (or HELO) and MAIL FROM.
    async fn open(&self, addr: SocketAddr, sender: &str) -> Result<SmtpClient, TransportError> {
        let connect_secs = self.timeouts.connect_secs;
        let mut client = step("connect", connect_secs, SmtpClient::connect(addr)).await?;

        expect_success(step("greeting", connect_secs, client.read_greeting()).await?)?;

        let ehlo = step("EHLO", self.timeouts.ehlo_secs, client.ehlo(&self.helo_name)).await?;
        if !ehlo.is_success() {
            debug!(%addr, code = ehlo.code, "EHLO refused, falling back to HELO");
            expect_success(
                step("HELO", self.timeouts.ehlo_secs, client.helo(&self.helo_name)).await?,
            )?;
        }

        expect_success(
            step("MAIL FROM", self.timeouts.mail_from_secs, client.mail_from(sender)).await?,
        )?;

        Ok(client)
    }

    /// RCPT TO for every recipient, then the message itself if anyone was
    /// accepted.
    async fn transfer(
        &self,
        client: &mut SmtpClient,
        recipients: &[&str],
        payload: &[u8],
    ) -> Result<Vec<Reply>, TransportError> {
        let mut replies = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let response =
                step("RCPT TO", self.timeouts.rcpt_to_secs, client.rcpt_to(recipient)).await?;
            replies.push(Reply::from(response));
        }

        let accepted: Vec<usize> = replies
            .iter()
            .enumerate()
            .filter(|(_, reply)| reply.is_success())
            .map(|(index, _)| index)
            .collect();

        if accepted.is_empty() {
            if let Err(err) = step("RSET", self.timeouts.quit_secs, client.rset()).await {
                debug!(error = %err, "RSET failed after every recipient was refused");
            }
            return Ok(replies);
        }

        let data = step("DATA", self.timeouts.data_secs, client.data()).await?;
        let outcome = if data.is_intermediate() {
            step("message data", self.timeouts.data_secs, client.send_data(payload)).await?
        } else if data.is_success() {
            return Err(TransportError::Protocol(format!(
                "DATA answered with {} instead of an intermediate reply",
                data.code
            )));
        } else {
            data
        };

        let outcome = Reply::from(outcome);
        for index in accepted {
            replies[index] = outcome.clone();
        }

        Ok(replies)
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(
        &self,
        host: IpAddr,
        sender: &str,
        recipients: &[&str],
        payload: &[u8],
    ) -> Result<Vec<Reply>, TransportError> {
        let addr = SocketAddr::new(host, self.port);
        debug!(%addr, recipients = recipients.len(), "Opening SMTP session");

        let mut client = self.open(addr, sender).await?;
        let replies = self.transfer(&mut client, recipients, payload).await?;

        if let Err(err) = step("QUIT", self.timeouts.quit_secs, client.quit()).await {
            warn!(%addr, error = %err, "QUIT failed after the transaction completed");
        }

        Ok(replies)
    }
}
