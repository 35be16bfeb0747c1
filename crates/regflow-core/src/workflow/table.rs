//! The ordered, validated workflow table.

use super::step::{EndpointRole, StepDefinition};
use crate::error::{RegflowError, Result};
use crate::session::SessionStatus;
use std::collections::HashSet;

/// Fixed, ordered list of steps shared read-only by every flow.
#[derive(Debug, Clone)]
pub struct WorkflowTable {
    steps: Vec<StepDefinition>,
}

impl WorkflowTable {
    /// Validates and wraps a step list.
    ///
    /// Rejected tables:
    /// - empty, or with duplicate step names
    /// - first step not a `FormSubmit` step that yields a token
    /// - first step awaiting the code, or more than one code step
    /// - reached statuses that move backwards or name `AwaitingCode`,
    ///   `Complete`, `Failed`
    /// - last step not reaching `Verified`
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self> {
        let first = steps
            .first()
            .ok_or_else(|| RegflowError::config("workflow table is empty"))?;

        if first.role != EndpointRole::FormSubmit {
            return Err(RegflowError::config(format!(
                "first step '{}' must use the form_submit endpoint",
                first.name
            )));
        }
        if first.token_rule.token_pointer.is_none() {
            return Err(RegflowError::config(format!(
                "first step '{}' must extract a session token",
                first.name
            )));
        }
        if first.awaits_code {
            return Err(RegflowError::config(
                "the code cannot be awaited before the flow has started",
            ));
        }

        let mut names = HashSet::new();
        let mut previous_rank = SessionStatus::Init.rank();
        let mut code_steps = 0;

        for step in &steps {
            if !names.insert(step.name.as_str()) {
                return Err(RegflowError::config(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
            if matches!(
                step.reaches,
                SessionStatus::AwaitingCode | SessionStatus::Complete | SessionStatus::Failed
            ) {
                return Err(RegflowError::config(format!(
                    "step '{}' cannot reach {}",
                    step.name, step.reaches
                )));
            }
            let rank = step.reaches.rank();
            if rank < previous_rank {
                return Err(RegflowError::config(format!(
                    "step '{}' moves the session back to {}",
                    step.name, step.reaches
                )));
            }
            previous_rank = rank;
            if step.awaits_code {
                code_steps += 1;
            }
        }

        if code_steps > 1 {
            return Err(RegflowError::config(
                "at most one step may await the verification code",
            ));
        }

        if steps.last().map(|step| step.reaches) != Some(SessionStatus::Verified) {
            return Err(RegflowError::config("last step must reach VERIFIED"));
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::{HeaderProfile, PayloadBuilder, StepInput, TokenRule};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn payload() -> Arc<dyn PayloadBuilder> {
        Arc::new(|_: &StepInput| -> crate::error::Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        })
    }

    fn step(name: &str, role: EndpointRole, reaches: SessionStatus) -> StepDefinition {
        StepDefinition::new(
            name,
            role,
            payload(),
            Arc::new(HeaderProfile::new("standard", BTreeMap::new())),
            TokenRule::token_at("/token"),
            reaches,
        )
    }

    #[test]
    fn test_valid_table() {
        let table = WorkflowTable::new(vec![
            step("signup", EndpointRole::FormSubmit, SessionStatus::SignupStarted),
            step("code", EndpointRole::FormSubmitGeo, SessionStatus::CodeSubmitted)
                .awaiting_code(),
            step("name", EndpointRole::FormSubmitGeo, SessionStatus::ProfileSteps),
            step("skip", EndpointRole::FormSubmitGeo, SessionStatus::ProfileSteps),
            step("finish", EndpointRole::FormSubmitGeo, SessionStatus::Verified),
        ])
        .unwrap();

        assert_eq!(table.len(), 5);
        assert!(table.step("code").unwrap().awaits_code);
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(WorkflowTable::new(Vec::new()).unwrap_err().is_config());
    }

    #[test]
    fn test_first_step_must_be_form_submit() {
        let result = WorkflowTable::new(vec![step(
            "signup",
            EndpointRole::FormSubmitGeo,
            SessionStatus::Verified,
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn test_backwards_status_rejected() {
        let result = WorkflowTable::new(vec![
            step("signup", EndpointRole::FormSubmit, SessionStatus::SignupStarted),
            step("legal", EndpointRole::FormSubmitGeo, SessionStatus::LegalConfirmed),
            step("name", EndpointRole::FormSubmitGeo, SessionStatus::ProfileSteps),
            step("finish", EndpointRole::FormSubmitGeo, SessionStatus::Verified),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = WorkflowTable::new(vec![
            step("signup", EndpointRole::FormSubmit, SessionStatus::SignupStarted),
            step("signup", EndpointRole::FormSubmitGeo, SessionStatus::Verified),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_two_code_steps_rejected() {
        let result = WorkflowTable::new(vec![
            step("signup", EndpointRole::FormSubmit, SessionStatus::SignupStarted),
            step("code", EndpointRole::FormSubmitGeo, SessionStatus::CodeSubmitted)
                .awaiting_code(),
            step("again", EndpointRole::FormSubmitGeo, SessionStatus::Verified)
                .awaiting_code(),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_must_end_verified() {
        let result = WorkflowTable::new(vec![step(
            "signup",
            EndpointRole::FormSubmit,
            SessionStatus::SignupStarted,
        )]);
        assert!(result.is_err());
    }
}
