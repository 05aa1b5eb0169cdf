use emissary_common::Domain;
use serde::{Deserialize, Serialize};

/// Identifier for a queued message
///
/// A ULID, so identifiers are unique without coordination and sort by the
/// time the message was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    id: ulid::Ulid,
}

impl MessageId {
    /// Create a message ID from a ULID
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a new unique message ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }

    /// Milliseconds since the Unix epoch at which this ID was generated
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl serde::Serialize for MessageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Where a message is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageState {
    /// Still being received; not yet eligible for delivery
    Receiving,
    /// Queued for (another) delivery attempt
    #[default]
    Delivering,
}

/// Identifier of a local account; zero means "no local account"
pub type AccountId = u64;

/// One envelope recipient of a queued message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// The address mail is delivered to, after alias expansion
    pub address: String,
    /// The address as the sender wrote it
    pub original_address: String,
    /// Local account this recipient maps to, or `0` for remote recipients
    #[serde(default)]
    pub account_id: AccountId,
}

impl Recipient {
    /// A recipient with no local account
    #[must_use]
    pub fn external(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            original_address: address.clone(),
            address,
            account_id: 0,
        }
    }

    /// A recipient that maps to the local account `account_id`
    #[must_use]
    pub fn local(address: impl Into<String>, account_id: AccountId) -> Self {
        Self {
            account_id,
            ..Self::external(address)
        }
    }

    /// Does this recipient map to a local account?
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.account_id != 0
    }

    /// The destination domain of the delivery address
    #[must_use]
    pub fn domain(&self) -> Option<Domain> {
        Domain::of_address(&self.address)
    }

    /// The address to show a human: the original spelling when known
    #[must_use]
    pub fn display_address(&self) -> &str {
        if self.original_address.is_empty() {
            &self.address
        } else {
            &self.original_address
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}

/// A queued message record
///
/// The raw MIME payload is not held here; it is loaded through the store
/// with [`crate::MessageStore::read_payload`] when a handler needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Envelope sender; empty for the null reverse-path
    pub from: String,
    pub recipients: Vec<Recipient>,
    /// Number of dispatch attempts made so far
    pub delivery_attempts: u32,
    /// Size of the payload in bytes
    pub size: u64,
    pub state: MessageState,
}

impl Message {
    /// A fresh message ready for its first delivery attempt
    #[must_use]
    pub fn new(from: impl Into<String>, recipients: Vec<Recipient>) -> Self {
        Self {
            id: MessageId::generate(),
            from: from.into(),
            recipients,
            delivery_attempts: 0,
            size: 0,
            state: MessageState::Delivering,
        }
    }

    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}
