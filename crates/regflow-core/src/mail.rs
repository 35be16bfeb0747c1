//! Mailbox model and collaborator traits.
//!
//! The mailbox side is split in two: a [`MailboxConnector`] opens a blocking
//! [`MailSession`], and a [`CodeRetriever`] turns an identity into an
//! [`ExtractedCode`]. The application layer wires them together.

use crate::error::Result;
use crate::identity::{Identity, MailboxCredentials};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(60);
pub const DEFAULT_FOLDER: &str = "INBOX";

const GMAIL_SERVER: &str = "imap.gmail.com";
const OUTLOOK_SERVER: &str = "outlook.office365.com";

/// Host and port of an IMAP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailServer {
    pub host: String,
    pub port: u16,
}

impl MailServer {
    /// Picks the server for a mailbox.
    ///
    /// An explicit server always wins. Otherwise the username's domain
    /// decides: Microsoft consumer domains go to Outlook, everything else to
    /// Gmail.
    pub fn resolve(credentials: &MailboxCredentials, port: Option<u16>) -> Self {
        let port = port.unwrap_or(DEFAULT_IMAP_PORT);
        if let Some(server) = credentials
            .server
            .as_deref()
            .map(str::trim)
            .filter(|server| !server.is_empty())
        {
            return Self {
                host: server.to_string(),
                port,
            };
        }

        let domain = credentials
            .username
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_ascii_lowercase())
            .unwrap_or_default();
        let host = match domain.as_str() {
            "hotmail.com" | "outlook.com" | "live.com" | "msn.com" => OUTLOOK_SERVER,
            _ => GMAIL_SERVER,
        };
        Self {
            host: host.to_string(),
            port,
        }
    }
}

/// One retrieval attempt: who to look for, where, and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSearchQuery {
    pub target: String,
    pub folder: String,
    pub deadline: Duration,
    pub interval: Duration,
}

impl MailSearchQuery {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            folder: DEFAULT_FOLDER.to_string(),
            deadline: DEFAULT_POLL_DEADLINE,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Mailbox-local message identifier (IMAP sequence number).
pub type MessageId = u32;

/// A fetched message, still in RFC 822 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: MessageId,
    pub bytes: Vec<u8>,
}

/// Which heuristic produced a code. The discriminant is the chain position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Heuristic {
    PrimaryMarker = 1,
    FallbackMarker = 2,
    LabelProximity = 3,
    Emphasis = 4,
    StyledContainer = 5,
    GenericScan = 6,
}

impl Heuristic {
    pub fn index(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Heuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Heuristic::PrimaryMarker => "primary-marker",
            Heuristic::FallbackMarker => "fallback-marker",
            Heuristic::LabelProximity => "label-proximity",
            Heuristic::Emphasis => "emphasis",
            Heuristic::StyledContainer => "styled-container",
            Heuristic::GenericScan => "generic-scan",
        };
        write!(f, "{}#{}", name, self.index())
    }
}

/// A 4-digit verification code and the heuristic that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCode {
    pub value: String,
    pub heuristic: Heuristic,
}

impl ExtractedCode {
    pub fn new(value: impl Into<String>, heuristic: Heuristic) -> Self {
        Self {
            value: value.into(),
            heuristic,
        }
    }
}

/// A logged-in mailbox connection. All calls block.
pub trait MailSession: Send {
    /// Sequence numbers of messages in `query.folder` addressed to
    /// `query.target`.
    fn search(&mut self, query: &MailSearchQuery) -> Result<Vec<MessageId>>;

    /// Fetches one message. `Ok(None)` when it vanished in between.
    fn fetch(&mut self, id: MessageId) -> Result<Option<RawMessage>>;

    /// Ends the session. Must be safe to call on a broken connection.
    fn logout(&mut self);
}

/// Opens mailbox sessions.
pub trait MailboxConnector: Send + Sync {
    /// Connects and authenticates. Failures are `MailboxConnect` errors.
    fn connect(&self, credentials: &MailboxCredentials) -> Result<Box<dyn MailSession>>;
}

/// Supplies the out-of-band code for an identity.
#[async_trait]
pub trait CodeRetriever: Send + Sync {
    /// Blocks (asynchronously) until a code arrives or the deadline passes.
    ///
    /// # Returns
    ///
    /// - `Ok(ExtractedCode)`: code found
    /// - `Err(ExtractionTimeout)`: deadline elapsed
    /// - `Err(MailboxConnect)`: mailbox unreachable or login refused
    async fn retrieve(&self, identity: &Identity) -> Result<ExtractedCode>;
}
