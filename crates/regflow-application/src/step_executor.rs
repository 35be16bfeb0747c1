//! Executes a single workflow step.

use regflow_core::config::EndpointsConfig;
use regflow_core::error::{RegflowError, Result};
use regflow_core::identity::Identity;
use regflow_core::session::{Session, SessionToken};
use regflow_core::transport::{StepRequest, Transport};
use regflow_core::workflow::{StepDefinition, StepInput};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a successful step hands back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// `None` when the step only acknowledges.
    pub token: Option<SessionToken>,
    pub captures: BTreeMap<String, String>,
}

/// Builds a step's request, sends it and applies the step's token rule.
/// Nothing is retried here.
pub struct StepExecutor {
    transport: Arc<dyn Transport>,
    endpoints: EndpointsConfig,
}

impl StepExecutor {
    pub fn new(transport: Arc<dyn Transport>, endpoints: EndpointsConfig) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    /// # Returns
    ///
    /// - `Ok(StepOutcome)`: HTTP 200, JSON body, token and captures present
    /// - `Err(StepSequence)`: no token to send, or none in the response
    /// - `Err(Transport)`: anything the transport rejected
    pub async fn execute(
        &self,
        session: &Session,
        identity: &Identity,
        step: &StepDefinition,
    ) -> Result<StepOutcome> {
        if session.step_index() > 0 && session.token().is_none() {
            return Err(RegflowError::sequence(
                &step.name,
                "no session token from the previous step",
            ));
        }

        let input = StepInput {
            step: step.name.clone(),
            token: session
                .token()
                .map(|token| token.as_str().to_string())
                .unwrap_or_default(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            first_name: identity.first_name().to_string(),
            last_name: identity.last_name().to_string(),
            domain: identity.domain.clone(),
            code: identity.code().unwrap_or_default().to_string(),
            captures: session.captures().clone(),
        };
        let body = step.payload.build(&input)?;

        let url = self.endpoints.url_for(step.role);
        if url.trim().is_empty() {
            return Err(RegflowError::config(format!(
                "no endpoint configured for step '{}' ({:?})",
                step.name, step.role
            )));
        }

        let request = StepRequest {
            step: step.name.clone(),
            url: url.to_string(),
            headers: step.headers.headers.clone(),
            body,
        };
        let response = self.transport.submit(request).await?;

        let token = match &step.token_rule.token_pointer {
            Some(pointer) => {
                let raw = string_at(&response.body, pointer).ok_or_else(|| {
                    RegflowError::sequence(
                        &step.name,
                        format!("response has no session token at '{pointer}'"),
                    )
                })?;
                Some(SessionToken::parse(&step.name, &raw)?)
            }
            None => None,
        };

        let mut captures = BTreeMap::new();
        for (name, pointer) in &step.token_rule.captures {
            let value = string_at(&response.body, pointer)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| {
                    RegflowError::sequence(
                        &step.name,
                        format!("response has no '{name}' at '{pointer}'"),
                    )
                })?;
            captures.insert(name.clone(), value);
        }

        Ok(StepOutcome { token, captures })
    }
}

/// Strings as-is, numbers rendered; anything else counts as missing.
fn string_at(body: &Value, pointer: &str) -> Option<String> {
    match body.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
