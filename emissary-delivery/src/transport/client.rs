//! A minimal plain-TCP SMTP client.

use std::net::SocketAddr;

use emissary_common::{incoming, outgoing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use super::{Response, TransportError};

/// Initial size of the read buffer for SMTP replies.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client session over a single TCP connection.
#[derive(Debug)]
pub struct SmtpClient {
    stream: TcpStream,
    buffer: Vec<u8>,
    buffer_pos: usize,
}

impl SmtpClient {
    /// Connect to `addr`. The greeting is not read.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: SocketAddr) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            stream,
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
        })
    }

    /// Read the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response, TransportError> {
        self.read_response().await
    }

    /// Send a command line and read the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response, TransportError> {
        outgoing!("{command}");
        self.stream.write_all(format!("{command}\r\n").as_bytes()).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response, TransportError> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn helo(&mut self, domain: &str) -> Result<Response, TransportError> {
        self.command(&format!("HELO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response, TransportError> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response, TransportError> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response, TransportError> {
        self.command("DATA").await
    }

    /// Send the message content, dot-stuffed and terminated with
    /// `<CRLF>.<CRLF>`, and read the final reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn send_data(&mut self, payload: &[u8]) -> Result<Response, TransportError> {
        outgoing!("<{} bytes of message data>", payload.len());
        self.stream.write_all(&dot_stuff(payload)).await?;
        self.stream.write_all(b".\r\n").await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rset(&mut self) -> Result<Response, TransportError> {
        self.command("RSET").await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response, TransportError> {
        self.command("QUIT").await
    }

    async fn read_response(&mut self) -> Result<Response, TransportError> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(TransportError::Protocol(format!(
                        "Reply too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let n = self.stream.read(&mut self.buffer[self.buffer_pos..]).await?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            self.buffer_pos += n;
        }
    }
}

/// Prepare message content for the DATA phase.
///
/// Every line ends in CRLF (bare LFs are converted) and a line starting with
/// `.` gets an extra leading `.` (RFC 5321 section 4.5.2). The result always
/// ends in CRLF so the terminating `.` sits on its own line.
#[must_use]
pub fn dot_stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 64 + 2);
    let mut at_line_start = true;

    for (i, &byte) in payload.iter().enumerate() {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }

        if byte == b'\n' && (i == 0 || payload[i - 1] != b'\r') {
            out.push(b'\r');
        }

        out.push(byte);
        at_line_start = byte == b'\n';
    }

    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }

    out
}
