//! Network-facing implementations of the regflow collaborator traits.

pub mod http_transport;
pub mod imap_mailbox;

pub use http_transport::HttpTransport;
pub use imap_mailbox::ImapConnector;
