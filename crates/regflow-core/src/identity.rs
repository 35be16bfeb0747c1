//! Identity domain model.
//!
//! An identity is the subject of one registration flow: the address the
//! remote service will mail a code to, the display name submitted in the
//! profile steps, and optionally the credentials of its own mailbox.

use crate::error::{RegflowError, Result};
use crate::mail::ExtractedCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Login credentials for a mailbox.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxCredentials {
    pub username: String,
    pub password: String,
    /// Explicit IMAP host. When absent the host is derived from the
    /// username's domain.
    #[serde(default)]
    pub server: Option<String>,
}

impl MailboxCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            server: None,
        }
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }
}

// Never print the password.
impl fmt::Debug for MailboxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("server", &self.server)
            .finish()
    }
}

/// The subject of a single registration flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub display_name: String,
    /// Domain the address was generated on (or parsed from).
    pub domain: String,
    /// Per-identity mailbox. `None` means the shared mailbox from
    /// configuration receives the code.
    #[serde(default)]
    pub mailbox: Option<MailboxCredentials>,
    code: Option<String>,
}

impl Identity {
    /// Creates an identity; the domain is taken from the address.
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        let email = email.into();
        let domain = email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_string())
            .unwrap_or_default();
        Self {
            email,
            display_name: display_name.into(),
            domain,
            mailbox: None,
            code: None,
        }
    }

    pub fn with_mailbox(mut self, mailbox: MailboxCredentials) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    /// First token of the display name.
    pub fn first_name(&self) -> &str {
        self.split_name().0
    }

    /// Everything after the first space, or empty.
    pub fn last_name(&self) -> &str {
        self.split_name().1
    }

    fn split_name(&self) -> (&str, &str) {
        let trimmed = self.display_name.trim();
        match trimmed.split_once(' ') {
            Some((first, last)) => (first, last.trim()),
            None => (trimmed, ""),
        }
    }

    /// The verification code, once retrieved.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Records the retrieved code. A code can only be recorded once.
    pub fn record_code(&mut self, code: &ExtractedCode) -> Result<()> {
        if self.code.is_some() {
            return Err(RegflowError::sequence(
                "code",
                format!("verification code already recorded for {}", self.email),
            ));
        }
        self.code = Some(code.value.clone());
        Ok(())
    }
}
