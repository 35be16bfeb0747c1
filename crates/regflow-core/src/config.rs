//! Application configuration model (`regflow.toml`).

use crate::identity::MailboxCredentials;
use crate::mail::{DEFAULT_FOLDER, DEFAULT_IMAP_PORT, MailSearchQuery};
use crate::relay::{DEFAULT_RELAY_SCHEME, SelectionPolicy};
use crate::workflow::EndpointRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    /// Header profiles by name. Merged over the built-in profiles.
    #[serde(default)]
    pub headers: BTreeMap<String, BTreeMap<String, String>>,
    /// Per-step overrides of the built-in workflow.
    #[serde(default)]
    pub steps: BTreeMap<String, StepOverride>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub form_submit: String,
    #[serde(default)]
    pub form_submit_geo: String,
}

impl EndpointsConfig {
    pub fn url_for(&self, role: EndpointRole) -> &str {
        match role {
            EndpointRole::FormSubmit => &self.form_submit,
            EndpointRole::FormSubmitGeo => &self.form_submit_geo,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Refuse to start without at least one relay.
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub policy: SelectionPolicy,
    /// Scheme for specs that do not name one.
    #[serde(default = "default_relay_scheme")]
    pub scheme: String,
    /// Relay list file, one spec per line.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            required: false,
            policy: SelectionPolicy::default(),
            scheme: default_relay_scheme(),
            file: None,
        }
    }
}

/// Shared mailbox plus polling parameters.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MailboxConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Grace period before the first search, giving the message time to land.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
}

impl MailboxConfig {
    /// Shared credentials, if configured.
    pub fn credentials(&self) -> Option<MailboxCredentials> {
        if self.username.trim().is_empty() {
            return None;
        }
        let credentials = MailboxCredentials::new(self.username.trim(), self.password.clone());
        Some(match &self.server {
            Some(server) => credentials.with_server(server.clone()),
            None => credentials,
        })
    }

    pub fn query_for(&self, target: &str) -> MailSearchQuery {
        MailSearchQuery::new(target)
            .with_folder(self.folder.clone())
            .with_interval(Duration::from_secs(self.poll_interval_secs))
            .with_deadline(Duration::from_secs(self.deadline_secs))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            server: None,
            port: default_imap_port(),
            folder: default_folder(),
            poll_interval_secs: default_poll_interval_secs(),
            deadline_secs: default_deadline_secs(),
            initial_delay_secs: default_initial_delay_secs(),
        }
    }
}

impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("folder", &self.folder)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("deadline_secs", &self.deadline_secs)
            .field("initial_delay_secs", &self.initial_delay_secs)
            .finish()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Domains generated addresses are drawn from.
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default = "default_first_names")]
    pub first_names: Vec<String>,
    #[serde(default = "default_last_names")]
    pub last_names: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            first_names: default_first_names(),
            last_names: default_last_names(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Flows running at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Whole-flow attempts per identity (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Completed identities are appended here.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Attempts allowed per identity inside one cooldown window. 0 disables
    /// the tracker.
    #[serde(default = "default_attempt_limit")]
    pub attempt_limit: u32,
    #[serde(default = "default_attempt_cooldown_secs")]
    pub attempt_cooldown_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            output: default_output(),
            attempt_limit: default_attempt_limit(),
            attempt_cooldown_secs: default_attempt_cooldown_secs(),
        }
    }
}

/// CSS selectors for the two structural-marker heuristics.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    #[serde(default = "default_primary_selector")]
    pub primary_selector: String,
    #[serde(default = "default_fallback_selector")]
    pub fallback_selector: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            primary_selector: default_primary_selector(),
            fallback_selector: default_fallback_selector(),
        }
    }
}

/// Replaces parts of a built-in step.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct StepOverride {
    /// JSON payload template; string leaves are rendered.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub header_profile: Option<String>,
    #[serde(default)]
    pub token_pointer: Option<String>,
    #[serde(default)]
    pub captures: Option<BTreeMap<String, String>>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_relay_scheme() -> String {
    DEFAULT_RELAY_SCHEME.to_string()
}

fn default_imap_port() -> u16 {
    DEFAULT_IMAP_PORT
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_deadline_secs() -> u64 {
    60
}

fn default_initial_delay_secs() -> u64 {
    5
}

fn default_first_names() -> Vec<String> {
    ["James", "Mary", "John", "Patricia"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn default_last_names() -> Vec<String> {
    ["Smith", "Johnson", "Williams", "Brown"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn default_concurrency() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    1
}

fn default_output() -> PathBuf {
    PathBuf::from("accounts.txt")
}

fn default_attempt_limit() -> u32 {
    3
}

fn default_attempt_cooldown_secs() -> u64 {
    300
}

fn default_primary_selector() -> String {
    "td.p2b".to_string()
}

fn default_fallback_selector() -> String {
    "td.p1b".to_string()
}
