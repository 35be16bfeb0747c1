//! Error types for regflow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A shared error type for every regflow crate.
///
/// Each variant maps onto one [`ErrorKind`] so the batch runner can tally
/// failures without inspecting messages.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum RegflowError {
    /// Missing credentials, invalid endpoints, empty required relay pool.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-200 response, network failure or malformed body.
    #[error("Transport error in step '{step}'{}: {message}", status_suffix(.status))]
    Transport {
        step: String,
        status: Option<u16>,
        message: String,
    },

    /// Authentication or connection failure against the mail server.
    #[error("Mailbox connection error: {0}")]
    MailboxConnect(String),

    /// The retrieval deadline elapsed before a code was found.
    #[error("No verification code for {target} after {}s", .waited.as_secs())]
    ExtractionTimeout { target: String, waited: Duration },

    /// Missing or invalid token between steps.
    #[error("Step sequence error in step '{step}': {message}")]
    StepSequence { step: String, message: String },

    /// IO error (result output, relay and identity files)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

/// Coarse classification used for batch summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    Transport,
    MailboxConnect,
    ExtractionTimeout,
    StepSequence,
    Io,
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transport => "transport",
            ErrorKind::MailboxConnect => "mailbox-connect",
            ErrorKind::ExtractionTimeout => "extraction-timeout",
            ErrorKind::StepSequence => "step-sequence",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

impl RegflowError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a Transport error
    pub fn transport(step: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            step: step.into(),
            status,
            message: message.into(),
        }
    }

    /// Creates a MailboxConnect error
    pub fn mailbox(message: impl Into<String>) -> Self {
        Self::MailboxConnect(message.into())
    }

    /// Creates a StepSequence error
    pub fn sequence(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepSequence {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    // ============================================================================
    // Classification
    // ============================================================================

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::MailboxConnect(_) => ErrorKind::MailboxConnect,
            Self::ExtractionTimeout { .. } => ErrorKind::ExtractionTimeout,
            Self::StepSequence { .. } => ErrorKind::StepSequence,
            Self::Io { .. } => ErrorKind::Io,
            Self::Serialization { .. } => ErrorKind::Serialization,
        }
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Whether re-running the whole flow may succeed.
    ///
    /// Configuration problems never go away on their own; everything else
    /// depends on the remote side or the mailbox.
    pub fn is_flow_retryable(&self) -> bool {
        !matches!(self, Self::Configuration(_) | Self::Serialization { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for RegflowError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for RegflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for RegflowError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for RegflowError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, RegflowError>`.
pub type Result<T> = std::result::Result<T, RegflowError>;
