//! Step definitions for the workflow table.

use crate::error::Result;
use crate::session::SessionStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Which logical endpoint a step posts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRole {
    /// Initiates a flow.
    FormSubmit,
    /// Every subsequent step.
    FormSubmitGeo,
}

/// A named, immutable set of request headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderProfile {
    pub name: String,
    pub headers: BTreeMap<String, String>,
}

impl HeaderProfile {
    pub fn new(name: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            headers,
        }
    }
}

/// How the next token (and any auxiliary values) are read from a step's
/// JSON response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRule {
    /// JSON pointer to the next session token. `None` marks an
    /// acknowledge-only step that keeps the current token.
    pub token_pointer: Option<String>,
    /// Required auxiliary values: capture name to JSON pointer.
    #[serde(default)]
    pub captures: BTreeMap<String, String>,
}

impl TokenRule {
    pub fn token_at(pointer: impl Into<String>) -> Self {
        Self {
            token_pointer: Some(pointer.into()),
            captures: BTreeMap::new(),
        }
    }

    pub fn acknowledge() -> Self {
        Self {
            token_pointer: None,
            captures: BTreeMap::new(),
        }
    }

    pub fn with_capture(mut self, name: impl Into<String>, pointer: impl Into<String>) -> Self {
        self.captures.insert(name.into(), pointer.into());
        self
    }
}

/// Everything a payload builder may draw on for one step invocation.
#[derive(Debug, Clone, Serialize)]
pub struct StepInput {
    pub step: String,
    /// Empty for the first step only.
    pub token: String,
    pub email: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
    pub code: String,
    /// Values captured by earlier steps, flattened into the template context.
    #[serde(flatten)]
    pub captures: BTreeMap<String, String>,
}

/// Builds the JSON body for one step.
///
/// Builders are opaque to the orchestrator: it hands over a [`StepInput`]
/// and posts whatever comes back.
pub trait PayloadBuilder: Send + Sync {
    fn build(&self, input: &StepInput) -> Result<serde_json::Value>;
}

impl<F> PayloadBuilder for F
where
    F: Fn(&StepInput) -> Result<serde_json::Value> + Send + Sync,
{
    fn build(&self, input: &StepInput) -> Result<serde_json::Value> {
        self(input)
    }
}

/// One row of the workflow table.
#[derive(Clone)]
pub struct StepDefinition {
    pub name: String,
    pub role: EndpointRole,
    pub payload: Arc<dyn PayloadBuilder>,
    pub headers: Arc<HeaderProfile>,
    pub token_rule: TokenRule,
    /// Status the session reaches once this step succeeds.
    pub reaches: SessionStatus,
    /// The orchestrator retrieves the out-of-band code before this step.
    pub awaits_code: bool,
}

impl StepDefinition {
    pub fn new(
        name: impl Into<String>,
        role: EndpointRole,
        payload: Arc<dyn PayloadBuilder>,
        headers: Arc<HeaderProfile>,
        token_rule: TokenRule,
        reaches: SessionStatus,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            payload,
            headers,
            token_rule,
            reaches,
            awaits_code: false,
        }
    }

    pub fn awaiting_code(mut self) -> Self {
        self.awaits_code = true;
        self
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("headers", &self.headers.name)
            .field("token_rule", &self.token_rule)
            .field("reaches", &self.reaches)
            .field("awaits_code", &self.awaits_code)
            .finish()
    }
}
