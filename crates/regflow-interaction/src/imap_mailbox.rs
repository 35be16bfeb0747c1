//! IMAP-over-TLS mailbox access.

use native_tls::{TlsConnector, TlsStream};
use regflow_core::error::{RegflowError, Result};
use regflow_core::identity::MailboxCredentials;
use regflow_core::mail::{
    MailSearchQuery, MailServer, MailSession, MailboxConnector, MessageId, RawMessage,
};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens IMAP sessions. Sockets carry read and write timeouts so a stalled
/// server cannot hang a poll.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    port: Option<u16>,
    timeout: Duration,
}

impl ImapConnector {
    pub fn new(port: Option<u16>) -> Self {
        Self {
            port,
            timeout: DEFAULT_SOCKET_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn open_stream(&self, server: &MailServer) -> Result<TlsStream<TcpStream>> {
        let addr = (server.host.as_str(), server.port)
            .to_socket_addrs()
            .map_err(|e| RegflowError::mailbox(format!("cannot resolve {}: {e}", server.host)))?
            .next()
            .ok_or_else(|| RegflowError::mailbox(format!("no address for {}", server.host)))?;

        let tcp = TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| {
            RegflowError::mailbox(format!("connect to {}:{} failed: {e}", server.host, server.port))
        })?;
        tcp.set_read_timeout(Some(self.timeout))?;
        tcp.set_write_timeout(Some(self.timeout))?;

        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| RegflowError::mailbox(format!("TLS setup failed: {e}")))?;
        tls.connect(&server.host, tcp)
            .map_err(|e| RegflowError::mailbox(format!("TLS handshake with {} failed: {e}", server.host)))
    }
}

impl MailboxConnector for ImapConnector {
    fn connect(&self, credentials: &MailboxCredentials) -> Result<Box<dyn MailSession>> {
        let server = MailServer::resolve(credentials, self.port);
        tracing::debug!(host = %server.host, port = server.port, user = %credentials.username, "Connecting to mailbox");

        let stream = self.open_stream(&server)?;
        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|e| RegflowError::mailbox(format!("no greeting from {}: {e}", server.host)))?;

        let session = client
            .login(&credentials.username, &credentials.password)
            .map_err(|(e, _)| {
                RegflowError::mailbox(format!("login as {} failed: {e}", credentials.username))
            })?;

        tracing::info!(host = %server.host, user = %credentials.username, "Mailbox connected");
        Ok(Box::new(ImapSession {
            session,
            selected: None,
        }))
    }
}

struct ImapSession {
    session: imap::Session<TlsStream<TcpStream>>,
    selected: Option<String>,
}

impl ImapSession {
    fn ensure_selected(&mut self, folder: &str) -> Result<()> {
        if self.selected.as_deref() == Some(folder) {
            return Ok(());
        }
        self.session
            .select(folder)
            .map_err(|e| RegflowError::mailbox(format!("cannot select {folder}: {e}")))?;
        self.selected = Some(folder.to_string());
        Ok(())
    }
}

impl MailSession for ImapSession {
    fn search(&mut self, query: &MailSearchQuery) -> Result<Vec<MessageId>> {
        // Re-select each round so newly arrived messages are visible.
        self.selected = None;
        self.ensure_selected(&query.folder)?;

        let criterion = to_criterion(&query.target);
        let ids = self
            .session
            .search(&criterion)
            .map_err(|e| RegflowError::mailbox(format!("search failed: {e}")))?;

        let mut ids: Vec<MessageId> = ids.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch(&mut self, id: MessageId) -> Result<Option<RawMessage>> {
        let messages = self
            .session
            .fetch(id.to_string(), "RFC822")
            .map_err(|e| RegflowError::mailbox(format!("fetch {id} failed: {e}")))?;

        Ok(messages.iter().find_map(|message| {
            message.body().map(|bytes| RawMessage {
                id,
                bytes: bytes.to_vec(),
            })
        }))
    }

    fn logout(&mut self) {
        if let Err(e) = self.session.logout() {
            tracing::debug!("Mailbox logout failed: {}", e);
        }
    }
}

/// `TO "<address>"` with quotes and backslashes escaped.
fn to_criterion(target: &str) -> String {
    let escaped = target.replace('\\', "\\\\").replace('"', "\\\"");
    format!("TO \"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_criterion() {
        assert_eq!(to_criterion("a@example.com"), "TO \"a@example.com\"");
        assert_eq!(to_criterion("we\"ird@x"), "TO \"we\\\"ird@x\"");
    }

    #[test]
    fn test_refused_connection_is_mailbox_error() {
        let creds = MailboxCredentials::new("me@example.com", "pw").with_server("127.0.0.1");
        let connector = ImapConnector::new(Some(1)).with_timeout(Duration::from_secs(2));

        let err = match connector.connect(&creds) {
            Ok(_) => panic!("port 1 should refuse"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), regflow_core::ErrorKind::MailboxConnect);
    }
}
