//! Domain model and collaborator traits for regflow.
//!
//! Nothing in this crate performs I/O; the infrastructure, interaction and
//! application crates provide the implementations.

pub mod config;
pub mod error;
pub mod identity;
pub mod mail;
pub mod relay;
pub mod session;
pub mod sink;
pub mod transport;
pub mod workflow;

// Re-export common types
pub use error::{ErrorKind, RegflowError, Result};
pub use identity::{Identity, MailboxCredentials};
pub use session::{Session, SessionStatus, SessionToken};
