//! End-to-end flows against scripted collaborators.

use async_trait::async_trait;
use regflow_application::mailbox_poller::ManualClock;
use regflow_application::{
    CodeExtractor, MailboxCodeRetriever, MailboxPoller, SessionOrchestrator, StepExecutor,
    build_workflow,
};
use regflow_core::config::{AppConfig, ExtractorConfig};
use regflow_core::error::{RegflowError, Result};
use regflow_core::mail::{
    MailSearchQuery, MailSession, MailboxConnector, MessageId, RawMessage,
};
use regflow_core::transport::{StepRequest, StepResponse, Transport};
use regflow_core::{ErrorKind, Identity, MailboxCredentials, SessionStatus};
use regflow_infrastructure::FileResultSink;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const EMAIL: &str = "johnsmith1234@example.com";

/// Answers each step with a fresh token and remembers every request.
struct ScriptedRemote {
    requests: Mutex<Vec<StepRequest>>,
    /// Step whose response leaves out the session token.
    drop_token_at: Option<&'static str>,
    /// Step that answers with HTTP 500.
    fail_at: Option<&'static str>,
}

impl ScriptedRemote {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            drop_token_at: None,
            fail_at: None,
        }
    }

    fn steps(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.step.clone())
            .collect()
    }

    fn body_of(&self, step: &str) -> Value {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.body.clone())
            .unwrap()
    }
}

#[async_trait]
impl Transport for ScriptedRemote {
    async fn submit(&self, request: StepRequest) -> Result<StepResponse> {
        let step = request.step.clone();
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        if self.fail_at == Some(step.as_str()) {
            return Err(RegflowError::transport(&step, Some(500), "upstream exploded"));
        }
        let body = if self.drop_token_at == Some(step.as_str()) {
            json!({ "ok": true })
        } else {
            json!({ "sessionToken": format!("tok-{n}"), "authCode": "AUTH-42" })
        };
        Ok(StepResponse { status: 200, body })
    }
}

struct Inbox {
    html: Option<&'static str>,
    fetches: Arc<AtomicUsize>,
}

impl MailSession for Inbox {
    fn search(&mut self, query: &MailSearchQuery) -> Result<Vec<MessageId>> {
        assert_eq!(query.target, EMAIL);
        Ok(self.html.map(|_| vec![1, 2]).unwrap_or_default())
    }

    fn fetch(&mut self, id: MessageId) -> Result<Option<RawMessage>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.html.map(|html| RawMessage {
            id,
            bytes: format!("Content-Type: text/html; charset=utf-8\r\n\r\n{html}\r\n").into_bytes(),
        }))
    }

    fn logout(&mut self) {}
}

struct InboxConnector {
    html: Option<&'static str>,
    fetches: Arc<AtomicUsize>,
}

impl MailboxConnector for InboxConnector {
    fn connect(&self, _credentials: &MailboxCredentials) -> Result<Box<dyn MailSession>> {
        Ok(Box::new(Inbox {
            html: self.html,
            fetches: self.fetches.clone(),
        }))
    }
}

struct Harness {
    orchestrator: SessionOrchestrator,
    remote: Arc<ScriptedRemote>,
    fetches: Arc<AtomicUsize>,
    output: std::path::PathBuf,
    _dir: TempDir,
}

fn harness(remote: ScriptedRemote, html: Option<&'static str>) -> Harness {
    let mut config = AppConfig::default();
    config.endpoints.form_submit = "https://auth.example.test/submit".into();
    config.endpoints.form_submit_geo = "https://geo.example.test/submit".into();

    let remote = Arc::new(remote);
    let fetches = Arc::new(AtomicUsize::new(0));
    let connector = Arc::new(InboxConnector {
        html,
        fetches: fetches.clone(),
    });
    let poller = MailboxPoller::new(connector).with_clock(Arc::new(ManualClock::new()));
    let extractor = Arc::new(CodeExtractor::new(&ExtractorConfig::default()).unwrap());
    let retriever = MailboxCodeRetriever::new(
        poller,
        extractor,
        Some(MailboxCredentials::new("catchall@example.com", "pw")),
        MailSearchQuery::new("")
            .with_deadline(Duration::from_secs(6))
            .with_interval(Duration::from_secs(2)),
    );

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("accounts.txt");

    let orchestrator = SessionOrchestrator::new(
        Arc::new(build_workflow(&config).unwrap()),
        StepExecutor::new(remote.clone(), config.endpoints.clone()),
        Arc::new(retriever),
        Arc::new(FileResultSink::new(output.clone())),
    );

    Harness {
        orchestrator,
        remote,
        fetches,
        output,
        _dir: dir,
    }
}

fn identity() -> Identity {
    Identity::new(EMAIL, "John Smith")
}

fn recorded(harness: &Harness) -> Vec<String> {
    std::fs::read_to_string(&harness.output)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_full_flow_records_identity_once() {
    let harness = harness(
        ScriptedRemote::new(),
        Some("<html><body><p>Copyright 2024</p><p>Your code: <b>4821</b></p></body></html>"),
    );

    let report = harness.orchestrator.run(identity()).await;

    assert!(report.is_complete(), "flow failed: {:?}", report.error);
    assert_eq!(report.status, SessionStatus::Complete);
    assert_eq!(report.code.as_deref(), Some("4821"));
    assert_eq!(report.steps_completed, 6);
    assert_eq!(
        harness.remote.steps(),
        vec![
            "signup",
            "submit_code",
            "skip_prompt",
            "submit_name",
            "legal_confirmation",
            "submit_auth_code"
        ]
    );

    // Each step carries the token of the one before it.
    assert_eq!(harness.remote.body_of("submit_code")["sessionToken"], "tok-1");
    assert_eq!(harness.remote.body_of("submit_code")["answers"]["code"], "4821");
    assert_eq!(harness.remote.body_of("submit_name")["sessionToken"], "tok-3");
    assert_eq!(harness.remote.body_of("submit_name")["answers"]["firstName"], "John");
    assert_eq!(
        harness.remote.body_of("submit_auth_code")["answers"]["authCode"],
        "AUTH-42"
    );

    assert_eq!(harness.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(recorded(&harness), vec![EMAIL]);
}

#[tokio::test]
async fn test_missing_token_stops_before_next_step() {
    let mut remote = ScriptedRemote::new();
    remote.drop_token_at = Some("signup");
    let harness = harness(remote, Some("<b>4821</b>"));

    let report = harness.orchestrator.run(identity()).await;

    assert_eq!(report.status, SessionStatus::Failed);
    assert_eq!(report.error.unwrap().kind(), ErrorKind::StepSequence);
    assert_eq!(report.steps_completed, 0);
    assert_eq!(harness.remote.steps(), vec!["signup"]);
    // Never got as far as the mailbox.
    assert_eq!(harness.fetches.load(Ordering::SeqCst), 0);
    assert!(recorded(&harness).is_empty());
}

#[tokio::test]
async fn test_no_code_before_deadline() {
    let harness = harness(ScriptedRemote::new(), None);

    let report = harness.orchestrator.run(identity()).await;

    assert_eq!(report.status, SessionStatus::Failed);
    assert_eq!(report.error.unwrap().kind(), ErrorKind::ExtractionTimeout);
    assert_eq!(report.steps_completed, 1);
    assert_eq!(harness.remote.steps(), vec!["signup"]);
    assert!(report.code.is_none());
    assert!(recorded(&harness).is_empty());
}

#[tokio::test]
async fn test_transport_failure_mid_flow() {
    let mut remote = ScriptedRemote::new();
    remote.fail_at = Some("submit_name");
    let harness = harness(remote, Some("<b>4821</b>"));

    let report = harness.orchestrator.run(identity()).await;

    assert_eq!(report.status, SessionStatus::Failed);
    match report.error.unwrap() {
        RegflowError::Transport { step, status, .. } => {
            assert_eq!(step, "submit_name");
            assert_eq!(status, Some(500));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(report.steps_completed, 3);
    assert_eq!(report.code.as_deref(), Some("4821"));
    assert!(recorded(&harness).is_empty());
}
