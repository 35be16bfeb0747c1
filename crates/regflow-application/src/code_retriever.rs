//! Mailbox-backed code retrieval.

use crate::code_extractor::CodeExtractor;
use crate::mailbox_poller::{MailboxPoller, PollOutcome};
use async_trait::async_trait;
use regflow_core::error::{RegflowError, Result};
use regflow_core::identity::{Identity, MailboxCredentials};
use regflow_core::mail::{CodeRetriever, ExtractedCode, MailSearchQuery};
use std::sync::Arc;
use std::time::Duration;

/// Polls the identity's mailbox (or the shared one) and runs every fetched
/// message through the extractor.
pub struct MailboxCodeRetriever {
    poller: MailboxPoller,
    extractor: Arc<CodeExtractor>,
    shared: Option<MailboxCredentials>,
    /// Folder, deadline and interval; the target is filled per identity.
    template: MailSearchQuery,
    initial_delay: Duration,
}

impl MailboxCodeRetriever {
    pub fn new(
        poller: MailboxPoller,
        extractor: Arc<CodeExtractor>,
        shared: Option<MailboxCredentials>,
        template: MailSearchQuery,
    ) -> Self {
        Self {
            poller,
            extractor,
            shared,
            template,
            initial_delay: Duration::ZERO,
        }
    }

    /// Waits this long before the first search.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    fn credentials_for(&self, identity: &Identity) -> Result<MailboxCredentials> {
        identity
            .mailbox
            .clone()
            .or_else(|| self.shared.clone())
            .ok_or_else(|| {
                RegflowError::config(format!(
                    "no mailbox configured to receive the code for {}",
                    identity.email
                ))
            })
    }
}

#[async_trait]
impl CodeRetriever for MailboxCodeRetriever {
    async fn retrieve(&self, identity: &Identity) -> Result<ExtractedCode> {
        let credentials = self.credentials_for(identity)?;

        if !self.initial_delay.is_zero() {
            tracing::debug!(
                email = %identity.email,
                delay_secs = self.initial_delay.as_secs(),
                "Waiting before first mailbox search"
            );
            tokio::time::sleep(self.initial_delay).await;
        }

        let query = MailSearchQuery {
            target: identity.email.clone(),
            ..self.template.clone()
        };
        let extractor = self.extractor.clone();

        let outcome = self
            .poller
            .poll_with(&credentials, &query, move |message| {
                extractor.extract_message(&message.bytes)
            })
            .await?;

        match outcome {
            PollOutcome::Found(code) => {
                tracing::info!(email = %identity.email, heuristic = %code.heuristic, "Verification code retrieved");
                Ok(code)
            }
            PollOutcome::NotFound { waited } => Err(RegflowError::ExtractionTimeout {
                target: identity.email.clone(),
                waited,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox_poller::ManualClock;
    use regflow_core::config::ExtractorConfig;
    use regflow_core::mail::{Heuristic, MailSession, MailboxConnector, MessageId, RawMessage};
    use std::sync::Mutex;

    struct OneMessage {
        body: Option<&'static str>,
    }

    impl MailSession for OneMessage {
        fn search(&mut self, _query: &MailSearchQuery) -> Result<Vec<MessageId>> {
            Ok(self.body.map(|_| vec![1]).unwrap_or_default())
        }

        fn fetch(&mut self, id: MessageId) -> Result<Option<RawMessage>> {
            Ok(self.body.map(|body| RawMessage {
                id,
                bytes: body.as_bytes().to_vec(),
            }))
        }

        fn logout(&mut self) {}
    }

    /// Records which mailbox was opened.
    struct RecordingConnector {
        body: Option<&'static str>,
        users: Mutex<Vec<String>>,
    }

    impl MailboxConnector for RecordingConnector {
        fn connect(&self, credentials: &MailboxCredentials) -> Result<Box<dyn MailSession>> {
            self.users.lock().unwrap().push(credentials.username.clone());
            Ok(Box::new(OneMessage { body: self.body }))
        }
    }

    fn retriever(
        body: Option<&'static str>,
        shared: Option<MailboxCredentials>,
    ) -> (MailboxCodeRetriever, Arc<RecordingConnector>) {
        let connector = Arc::new(RecordingConnector {
            body,
            users: Mutex::new(Vec::new()),
        });
        let poller =
            MailboxPoller::new(connector.clone()).with_clock(Arc::new(ManualClock::new()));
        let extractor = Arc::new(CodeExtractor::new(&ExtractorConfig::default()).unwrap());
        let template = MailSearchQuery::new("")
            .with_deadline(Duration::from_secs(6))
            .with_interval(Duration::from_secs(2));
        (
            MailboxCodeRetriever::new(poller, extractor, shared, template),
            connector,
        )
    }

    const MESSAGE: &str = "Content-Type: text/html\r\n\r\n<p>Your code is <b>4821</b></p>\r\n";

    #[tokio::test]
    async fn test_code_from_shared_mailbox() {
        let shared = MailboxCredentials::new("catchall@example.com", "pw");
        let (retriever, connector) = retriever(Some(MESSAGE), Some(shared));

        let identity = regflow_core::Identity::new("johnsmith1234@example.com", "John Smith");
        let code = retriever.retrieve(&identity).await.unwrap();

        assert_eq!(code.value, "4821");
        assert_eq!(code.heuristic, Heuristic::Emphasis);
        assert_eq!(*connector.users.lock().unwrap(), vec!["catchall@example.com"]);
    }

    #[tokio::test]
    async fn test_identity_mailbox_preferred() {
        let shared = MailboxCredentials::new("catchall@example.com", "pw");
        let (retriever, connector) = retriever(Some(MESSAGE), Some(shared));

        let identity = regflow_core::Identity::new("alice@outlook.com", "Alice B")
            .with_mailbox(MailboxCredentials::new("alice@outlook.com", "own"));
        retriever.retrieve(&identity).await.unwrap();

        assert_eq!(*connector.users.lock().unwrap(), vec!["alice@outlook.com"]);
    }

    #[tokio::test]
    async fn test_timeout_when_nothing_arrives() {
        let shared = MailboxCredentials::new("catchall@example.com", "pw");
        let (retriever, _) = retriever(None, Some(shared));

        let identity = regflow_core::Identity::new("x@example.com", "X Y");
        let err = retriever.retrieve(&identity).await.unwrap_err();

        match err {
            RegflowError::ExtractionTimeout { target, waited } => {
                assert_eq!(target, "x@example.com");
                assert!(waited >= Duration::from_secs(6));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_mailbox_at_all() {
        let (retriever, _) = retriever(Some(MESSAGE), None);
        let identity = regflow_core::Identity::new("x@example.com", "X Y");
        assert!(retriever.retrieve(&identity).await.unwrap_err().is_config());
    }
}
