//! Shared fixtures for the delivery integration tests
#![allow(dead_code)] // Not every test binary uses every fixture

pub mod mock_server;

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use emissary_common::Domain;
use emissary_delivery::{
    DeliveryError, DnsError, EventLog, LogEvent, MailboxError, MailboxStore, Reply, ResolveMx,
    Transport, TransportError,
};
use emissary_spool::{
    AccountId, MemoryMessageStore, Message, MessageId, MessageStore, Recipient, SpoolError,
};

pub const REMOTE_HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));
pub const BACKUP_HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 20));

/// A small message with the headers a bounce quotes
pub fn payload(subject: &str) -> Arc<[u8]> {
    Arc::from(
        format!(
            "From: sender@example.org\r\n\
             To: someone@remote.example\r\n\
             Subject: {subject}\r\n\
             Date: Thu, 10 Jul 2003 10:52:37 +0200\r\n\
             \r\n\
             Hello there.\r\n"
        )
        .into_bytes(),
    )
}

/// Queue a message from `from` to `recipients`
pub async fn queue(
    store: &MemoryMessageStore,
    from: &str,
    recipients: Vec<Recipient>,
    previous_attempts: u32,
) -> Message {
    let body = payload("Quarterly report");
    let size = u64::try_from(body.len()).unwrap();
    let mut message = Message::new(from, recipients).with_size(size);
    message.delivery_attempts = previous_attempts;
    store
        .insert(&message, body)
        .await
        .expect("Failed to queue message");
    message
}

/// Resolver answering from a fixed table
#[derive(Debug, Default)]
pub struct StaticResolver {
    answers: HashMap<String, Result<Vec<IpAddr>, DnsError>>,
}

impl StaticResolver {
    #[must_use]
    pub fn with_hosts(mut self, domain: &str, hosts: &[IpAddr]) -> Self {
        self.answers.insert(domain.to_string(), Ok(hosts.to_vec()));
        self
    }

    #[must_use]
    pub fn with_error(mut self, domain: &str, error: DnsError) -> Self {
        self.answers.insert(domain.to_string(), Err(error));
        self
    }
}

#[async_trait]
impl ResolveMx for StaticResolver {
    async fn resolve_mx_addresses(&self, domain: &Domain) -> Result<Arc<[IpAddr]>, DnsError> {
        match self.answers.get(domain.as_str()) {
            Some(Ok(hosts)) => Ok(Arc::from(hosts.as_slice())),
            Some(Err(error)) => Err(error.clone()),
            None => Err(DnsError::DomainNotFound(domain.to_string())),
        }
    }
}

/// One `Transport::send` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub host: IpAddr,
    pub sender: String,
    pub recipients: Vec<String>,
}

/// Transport that answers each recipient from a script
///
/// Unlisted recipients get `250 2.0.0 OK`; hosts marked unreachable fail the
/// whole session.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: HashMap<String, Reply>,
    unreachable: Vec<IpAddr>,
    sessions: Mutex<Vec<Session>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn with_reply(mut self, recipient: &str, code: u16, message: &str) -> Self {
        self.replies
            .insert(recipient.to_string(), Reply::new(code, message));
        self
    }

    #[must_use]
    pub fn with_unreachable(mut self, host: IpAddr) -> Self {
        self.unreachable.push(host);
        self
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        host: IpAddr,
        sender: &str,
        recipients: &[&str],
        _payload: &[u8],
    ) -> Result<Vec<Reply>, TransportError> {
        self.sessions.lock().unwrap().push(Session {
            host,
            sender: sender.to_string(),
            recipients: recipients.iter().map(ToString::to_string).collect(),
        });

        if self.unreachable.contains(&host) {
            return Err(TransportError::ConnectionClosed);
        }

        Ok(recipients
            .iter()
            .map(|recipient| {
                self.replies
                    .get(*recipient)
                    .cloned()
                    .unwrap_or_else(|| Reply::new(250, "2.0.0 OK"))
            })
            .collect())
    }
}

/// Mailbox store keeping deposits in memory
#[derive(Debug, Default)]
pub struct Mailboxes {
    accounts: HashMap<String, AccountId>,
    refusals: HashMap<AccountId, MailboxError>,
    deposits: Mutex<Vec<(AccountId, Vec<u8>)>>,
}

impl Mailboxes {
    #[must_use]
    pub fn with_account(mut self, address: &str, account: AccountId) -> Self {
        self.accounts.insert(address.to_string(), account);
        self
    }

    #[must_use]
    pub fn with_refusal(mut self, account: AccountId, error: MailboxError) -> Self {
        self.refusals.insert(account, error);
        self
    }

    pub fn deposits(&self) -> Vec<(AccountId, Vec<u8>)> {
        self.deposits.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailboxStore for Mailboxes {
    async fn find_account(&self, address: &str) -> Result<Option<AccountId>, MailboxError> {
        Ok(self.accounts.get(address).copied())
    }

    async fn deposit(
        &self,
        account: AccountId,
        _message: &Message,
        payload: &[u8],
    ) -> Result<(), MailboxError> {
        if let Some(error) = self.refusals.get(&account) {
            return Err(error.clone());
        }

        self.deposits.lock().unwrap().push((account, payload.to_vec()));
        Ok(())
    }
}

/// Event log that remembers what it was told
#[derive(Debug, Default)]
pub struct RecordingEventLog {
    events: Mutex<Vec<(LogEvent, String)>>,
}

impl RecordingEventLog {
    pub fn events(&self) -> Vec<(LogEvent, String)> {
        self.events.lock().unwrap().clone()
    }
}

impl EventLog for RecordingEventLog {
    fn record_exception(&self, event: &LogEvent, error: &DeliveryError) {
        self.events
            .lock()
            .unwrap()
            .push((event.clone(), error.to_string()));
    }
}

/// A memory store whose next claim or next update can be made to fail once
#[derive(Debug)]
pub struct FlakyStore {
    pub inner: MemoryMessageStore,
    fail_claim: AtomicBool,
    fail_update: AtomicBool,
    claims: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryMessageStore) -> Self {
        Self {
            inner,
            fail_claim: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            claims: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing_next_claim(self) -> Self {
        self.fail_claim.store(true, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn failing_next_update(self) -> Self {
        self.fail_update.store(true, Ordering::SeqCst);
        self
    }

    /// Number of `claim_next` calls, failed ones included
    pub fn claims(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn claim_next(&self) -> emissary_spool::Result<Option<Message>> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        if self.fail_claim.swap(false, Ordering::SeqCst) {
            return Err(SpoolError::Internal("claim query failed".to_string()));
        }
        self.inner.claim_next().await
    }

    async fn update(&self, message: &Message) -> emissary_spool::Result<()> {
        if self.fail_update.swap(false, Ordering::SeqCst) {
            return Err(SpoolError::Internal("record write failed".to_string()));
        }
        self.inner.update(message).await
    }

    async fn delete(&self, message: &Message) -> emissary_spool::Result<()> {
        self.inner.delete(message).await
    }

    async fn insert(&self, message: &Message, payload: Arc<[u8]>) -> emissary_spool::Result<()> {
        self.inner.insert(message, payload).await
    }

    async fn read_payload(&self, id: &MessageId) -> emissary_spool::Result<Arc<[u8]>> {
        self.inner.read_payload(id).await
    }
}
