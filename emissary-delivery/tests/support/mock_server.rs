//! Scripted SMTP server for exercising the client transport
//!
//! The server answers every command from a [`Script`], records what it
//! received, and can misbehave on request (hang on a command, drop the
//! connection).
#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// A command as the server saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    /// Argument of MAIL, e.g. `FROM:<a@example.com>`
    MailFrom(String),
    /// Argument of RCPT, e.g. `TO:<b@example.com>`
    RcptTo(String),
    Data,
    /// Everything between DATA and the lone dot, still dot-stuffed
    MessageContent(Vec<u8>),
    Rset,
    Quit,
    Other(String),
}

type Line = (u16, String);

fn line(code: u16, text: impl Into<String>) -> Line {
    (code, text.into())
}

/// How the server answers
#[derive(Debug, Clone)]
pub struct Script {
    greeting: Line,
    /// EHLO keywords; `None` refuses EHLO so the client has to use HELO
    ehlo: Option<Vec<String>>,
    replies: HashMap<&'static str, Line>,
    recipients: Vec<(String, Line)>,
    data_end: Line,
    hang_on: Option<usize>,
    drop_after: Option<usize>,
}

impl Default for Script {
    fn default() -> Self {
        let replies = HashMap::from([
            ("HELO", line(250, "Hello")),
            ("MAIL", line(250, "OK")),
            ("RCPT", line(250, "OK")),
            ("DATA", line(354, "Start mail input; end with <CRLF>.<CRLF>")),
            ("RSET", line(250, "Reset")),
            ("QUIT", line(221, "Bye")),
        ]);

        Self {
            greeting: line(220, "mock.example ESMTP"),
            ehlo: Some(vec!["mock.example".to_string(), "SIZE 10000".to_string()]),
            replies,
            recipients: Vec::new(),
            data_end: line(250, "OK: Message accepted"),
            hang_on: None,
            drop_after: None,
        }
    }
}

impl Script {
    #[must_use]
    pub fn greeting(mut self, code: u16, text: &str) -> Self {
        self.greeting = line(code, text);
        self
    }

    #[must_use]
    pub fn without_ehlo(mut self) -> Self {
        self.ehlo = None;
        self
    }

    /// Answer `verb` (HELO, MAIL, RCPT, DATA, RSET, QUIT) with `code text`
    #[must_use]
    pub fn reply(mut self, verb: &'static str, code: u16, text: &str) -> Self {
        self.replies.insert(verb, line(code, text));
        self
    }

    /// Answer RCPT for `address` differently from the others
    #[must_use]
    pub fn recipient(mut self, address: &str, code: u16, text: &str) -> Self {
        self.recipients.push((format!("<{address}>"), line(code, text)));
        self
    }

    /// The reply after the message data
    #[must_use]
    pub fn data_end(mut self, code: u16, text: &str) -> Self {
        self.data_end = line(code, text);
        self
    }

    /// Never answer the Nth command (0-indexed)
    #[must_use]
    pub const fn hang_on(mut self, index: usize) -> Self {
        self.hang_on = Some(index);
        self
    }

    /// Close the connection once N commands have been answered
    #[must_use]
    pub const fn drop_after(mut self, count: usize) -> Self {
        self.drop_after = Some(count);
        self
    }

    fn answer(&self, verb: &str, argument: &str) -> Vec<u8> {
        let (code, text) = match verb {
            "EHLO" => return self.ehlo_reply(),
            "RCPT" => self
                .recipients
                .iter()
                .find(|(address, _)| argument.ends_with(address.as_str()))
                .map(|(_, reply)| reply)
                .or_else(|| self.replies.get("RCPT")),
            verb => self.replies.get(verb),
        }
        .cloned()
        .unwrap_or_else(|| line(500, "Command not recognised"));

        format!("{code} {text}\r\n").into_bytes()
    }

    fn ehlo_reply(&self) -> Vec<u8> {
        let Some(keywords) = &self.ehlo else {
            return b"500 Command not recognised\r\n".to_vec();
        };

        let last = keywords.len().saturating_sub(1);
        keywords
            .iter()
            .enumerate()
            .map(|(i, keyword)| {
                let separator = if i == last { ' ' } else { '-' };
                format!("250{separator}{keyword}\r\n")
            })
            .collect::<String>()
            .into_bytes()
    }
}

/// A running mock server; stops accepting connections when dropped
pub struct MockSmtpServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<SmtpCommand>>>,
    accept_loop: JoinHandle<()>,
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

impl MockSmtpServer {
    /// Bind to a free local port and start serving `script`
    pub async fn start(script: Script) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let script = Arc::new(script);
        let received = Arc::new(Mutex::new(Vec::new()));

        let accept_loop = tokio::spawn({
            let received = Arc::clone(&received);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let script = Arc::clone(&script);
                    let received = Arc::clone(&received);
                    tokio::spawn(async move {
                        if let Err(e) = serve_client(stream, &script, &received).await {
                            tracing::debug!("Mock server client error: {e}");
                        }
                    });
                }
            }
        });

        Ok(Self {
            addr,
            received,
            accept_loop,
        })
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every command received so far, across connections
    #[must_use]
    pub fn commands(&self) -> Vec<SmtpCommand> {
        self.received.lock().unwrap().clone()
    }

    /// The message data of the first completed transaction
    #[must_use]
    pub fn first_message(&self) -> Option<Vec<u8>> {
        self.commands().into_iter().find_map(|command| match command {
            SmtpCommand::MessageContent(content) => Some(content),
            _ => None,
        })
    }
}

async fn serve_client(
    mut stream: TcpStream,
    script: &Script,
    received: &Mutex<Vec<SmtpCommand>>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let record = |command: SmtpCommand| received.lock().unwrap().push(command);

    writer
        .write_all(format!("{} {}\r\n", script.greeting.0, script.greeting.1).as_bytes())
        .await?;

    let mut buffer = String::new();
    for index in 0.. {
        if script.drop_after.is_some_and(|count| index >= count) {
            return Ok(());
        }

        buffer.clear();
        if reader.read_line(&mut buffer).await? == 0 {
            return Ok(());
        }

        if script.hang_on == Some(index) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        }

        let command = buffer.trim_end();
        let (verb, argument) = command.split_once(' ').unwrap_or((command, ""));
        let verb = verb.to_ascii_uppercase();

        record(match verb.as_str() {
            "EHLO" => SmtpCommand::Ehlo(argument.to_string()),
            "HELO" => SmtpCommand::Helo(argument.to_string()),
            "MAIL" => SmtpCommand::MailFrom(argument.to_string()),
            "RCPT" => SmtpCommand::RcptTo(argument.to_string()),
            "DATA" => SmtpCommand::Data,
            "RSET" => SmtpCommand::Rset,
            "QUIT" => SmtpCommand::Quit,
            _ => SmtpCommand::Other(command.to_string()),
        });

        let answer = script.answer(&verb, argument);
        writer.write_all(&answer).await?;

        if verb == "QUIT" {
            return Ok(());
        }

        if verb == "DATA" && answer.starts_with(b"354") {
            let mut content = Vec::new();
            loop {
                buffer.clear();
                if reader.read_line(&mut buffer).await? == 0 {
                    return Ok(());
                }
                if buffer.trim_end_matches(['\r', '\n']) == "." {
                    break;
                }
                content.extend_from_slice(buffer.as_bytes());
            }

            record(SmtpCommand::MessageContent(content));
            writer
                .write_all(format!("{} {}\r\n", script.data_end.0, script.data_end.1).as_bytes())
                .await?;
        }
    }

    Ok(())
}
