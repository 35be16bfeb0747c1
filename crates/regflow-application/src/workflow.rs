//! The built-in registration workflow and its configuration overrides.
//!
//! | # | step               | endpoint        | reaches         | notes            |
//! |---|--------------------|-----------------|-----------------|------------------|
//! | 1 | signup             | form_submit     | SIGNUP_STARTED  | first token      |
//! | 2 | submit_code        | form_submit_geo | CODE_SUBMITTED  | awaits the code  |
//! | 3 | skip_prompt        | form_submit_geo | PROFILE_STEPS   |                  |
//! | 4 | submit_name        | form_submit_geo | PROFILE_STEPS   |                  |
//! | 5 | legal_confirmation | form_submit_geo | LEGAL_CONFIRMED | captures auth_code |
//! | 6 | submit_auth_code   | form_submit_geo | VERIFIED        | acknowledge only |

use crate::template_payload::TemplatePayload;
use regflow_core::SessionStatus;
use regflow_core::config::{AppConfig, StepOverride};
use regflow_core::error::{RegflowError, Result};
use regflow_core::workflow::{
    EndpointRole, HeaderProfile, StepDefinition, TokenRule, WorkflowTable,
};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub const STANDARD_PROFILE: &str = "standard";
pub const GEO_PROFILE: &str = "geo";
pub const DEFAULT_TOKEN_POINTER: &str = "/sessionToken";

struct BuiltinStep {
    name: &'static str,
    role: EndpointRole,
    profile: &'static str,
    token_pointer: Option<&'static str>,
    captures: &'static [(&'static str, &'static str)],
    reaches: SessionStatus,
    awaits_code: bool,
    payload: fn() -> Value,
}

const DEFAULT_STEPS: &[BuiltinStep] = &[
    BuiltinStep {
        name: "signup",
        role: EndpointRole::FormSubmit,
        profile: STANDARD_PROFILE,
        token_pointer: Some(DEFAULT_TOKEN_POINTER),
        captures: &[],
        reaches: SessionStatus::SignupStarted,
        awaits_code: false,
        payload: signup_payload,
    },
    BuiltinStep {
        name: "submit_code",
        role: EndpointRole::FormSubmitGeo,
        profile: GEO_PROFILE,
        token_pointer: Some(DEFAULT_TOKEN_POINTER),
        captures: &[],
        reaches: SessionStatus::CodeSubmitted,
        awaits_code: true,
        payload: submit_code_payload,
    },
    BuiltinStep {
        name: "skip_prompt",
        role: EndpointRole::FormSubmitGeo,
        profile: GEO_PROFILE,
        token_pointer: Some(DEFAULT_TOKEN_POINTER),
        captures: &[],
        reaches: SessionStatus::ProfileSteps,
        awaits_code: false,
        payload: skip_prompt_payload,
    },
    BuiltinStep {
        name: "submit_name",
        role: EndpointRole::FormSubmitGeo,
        profile: GEO_PROFILE,
        token_pointer: Some(DEFAULT_TOKEN_POINTER),
        captures: &[],
        reaches: SessionStatus::ProfileSteps,
        awaits_code: false,
        payload: submit_name_payload,
    },
    BuiltinStep {
        name: "legal_confirmation",
        role: EndpointRole::FormSubmitGeo,
        profile: GEO_PROFILE,
        token_pointer: Some(DEFAULT_TOKEN_POINTER),
        captures: &[("auth_code", "/authCode")],
        reaches: SessionStatus::LegalConfirmed,
        awaits_code: false,
        payload: legal_confirmation_payload,
    },
    BuiltinStep {
        name: "submit_auth_code",
        role: EndpointRole::FormSubmitGeo,
        profile: GEO_PROFILE,
        token_pointer: None,
        captures: &[],
        reaches: SessionStatus::Verified,
        awaits_code: false,
        payload: submit_auth_code_payload,
    },
];

fn answers(answers: Value) -> Value {
    json!({ "sessionToken": "{{ token }}", "step": "{{ step }}", "answers": answers })
}

fn signup_payload() -> Value {
    json!({ "step": "{{ step }}", "answers": { "email": "{{ email }}" } })
}

fn submit_code_payload() -> Value {
    answers(json!({ "code": "{{ code }}" }))
}

fn skip_prompt_payload() -> Value {
    answers(json!({ "skip": true }))
}

fn submit_name_payload() -> Value {
    answers(json!({ "firstName": "{{ first_name }}", "lastName": "{{ last_name }}" }))
}

fn legal_confirmation_payload() -> Value {
    answers(json!({ "accepted": true }))
}

fn submit_auth_code_payload() -> Value {
    answers(json!({ "authCode": "{{ auth_code }}" }))
}

fn default_profiles() -> BTreeMap<String, BTreeMap<String, String>> {
    let base = [
        ("Accept", "application/json"),
        ("Accept-Language", "en-US,en;q=0.9"),
    ];
    let mut standard: BTreeMap<String, String> = base
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let geo = standard.clone();
    standard.insert("Cache-Control".to_string(), "no-cache".to_string());

    let mut profiles = BTreeMap::new();
    profiles.insert(STANDARD_PROFILE.to_string(), standard);
    profiles.insert(GEO_PROFILE.to_string(), geo);
    profiles
}

/// Built-in profiles with configured ones merged over them.
pub fn header_profiles(config: &AppConfig) -> BTreeMap<String, Arc<HeaderProfile>> {
    let mut merged = default_profiles();
    for (name, headers) in &config.headers {
        merged
            .entry(name.clone())
            .or_default()
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
        .into_iter()
        .map(|(name, headers)| {
            let profile = Arc::new(HeaderProfile::new(name.clone(), headers));
            (name, profile)
        })
        .collect()
}

/// Builds and validates the workflow table.
///
/// # Returns
///
/// - `Err(Configuration)`: an override names an unknown step or header
///   profile, or the resulting table is invalid
pub fn build_workflow(config: &AppConfig) -> Result<WorkflowTable> {
    let known: HashSet<&str> = DEFAULT_STEPS.iter().map(|builtin| builtin.name).collect();
    if let Some(unknown) = config.steps.keys().find(|name| !known.contains(name.as_str())) {
        return Err(RegflowError::config(format!(
            "[steps.{unknown}] does not match any workflow step"
        )));
    }

    let profiles = header_profiles(config);
    let no_override = StepOverride::default();

    let steps = DEFAULT_STEPS
        .iter()
        .map(|builtin| {
            let overrides = config.steps.get(builtin.name).unwrap_or(&no_override);
            build_step(builtin, overrides, &profiles)
        })
        .collect::<Result<Vec<_>>>()?;

    WorkflowTable::new(steps)
}

fn build_step(
    builtin: &BuiltinStep,
    overrides: &StepOverride,
    profiles: &BTreeMap<String, Arc<HeaderProfile>>,
) -> Result<StepDefinition> {
    let profile_name = overrides.header_profile.as_deref().unwrap_or(builtin.profile);
    let headers = profiles.get(profile_name).cloned().ok_or_else(|| {
        RegflowError::config(format!(
            "step '{}' uses unknown header profile '{}'",
            builtin.name, profile_name
        ))
    })?;

    let payload = overrides.payload.clone().unwrap_or_else(builtin.payload);

    // An empty pointer turns the step into an acknowledgement.
    let token_pointer = match overrides.token_pointer.as_deref() {
        Some("") => None,
        Some(pointer) => Some(pointer.to_string()),
        None => builtin.token_pointer.map(str::to_string),
    };
    let captures = match &overrides.captures {
        Some(captures) => captures.clone(),
        None => builtin
            .captures
            .iter()
            .map(|(name, pointer)| (name.to_string(), pointer.to_string()))
            .collect(),
    };

    let step = StepDefinition::new(
        builtin.name,
        builtin.role,
        Arc::new(TemplatePayload::new(payload)),
        headers,
        TokenRule {
            token_pointer,
            captures,
        },
        builtin.reaches,
    );
    Ok(if builtin.awaits_code {
        step.awaiting_code()
    } else {
        step
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use regflow_core::workflow::StepInput;

    #[test]
    fn test_default_table() {
        let table = build_workflow(&AppConfig::default()).unwrap();
        let names: Vec<&str> = table.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "signup",
                "submit_code",
                "skip_prompt",
                "submit_name",
                "legal_confirmation",
                "submit_auth_code"
            ]
        );

        let code_steps: Vec<&str> = table
            .steps()
            .iter()
            .filter(|s| s.awaits_code)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(code_steps, vec!["submit_code"]);

        let last = table.step("submit_auth_code").unwrap();
        assert!(last.token_rule.token_pointer.is_none());
        assert_eq!(last.reaches, SessionStatus::Verified);
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = AppConfig::default();
        let mut mobile = BTreeMap::new();
        mobile.insert("User-Agent".to_string(), "regflow/1".to_string());
        config.headers.insert("mobile".to_string(), mobile);
        config.steps.insert(
            "submit_name".to_string(),
            StepOverride {
                payload: Some(json!({ "t": "{{ token }}", "n": "{{ display_name }}" })),
                header_profile: Some("mobile".to_string()),
                token_pointer: Some("/data/next".to_string()),
                captures: None,
            },
        );

        let table = build_workflow(&config).unwrap();
        let step = table.step("submit_name").unwrap();
        assert_eq!(step.headers.name, "mobile");
        assert_eq!(step.headers.headers["User-Agent"], "regflow/1");
        assert_eq!(step.token_rule.token_pointer.as_deref(), Some("/data/next"));

        let body = step
            .payload
            .build(&StepInput {
                step: "submit_name".into(),
                token: "tok".into(),
                email: "a@example.com".into(),
                display_name: "A B".into(),
                first_name: "A".into(),
                last_name: "B".into(),
                domain: "example.com".into(),
                code: String::new(),
                captures: BTreeMap::new(),
            })
            .unwrap();
        assert_eq!(body, json!({ "t": "tok", "n": "A B" }));
    }

    #[test]
    fn test_configured_headers_extend_builtin_profile() {
        let mut config = AppConfig::default();
        let mut extra = BTreeMap::new();
        extra.insert("X-Tenant".to_string(), "acme".to_string());
        config.headers.insert(STANDARD_PROFILE.to_string(), extra);

        let profiles = header_profiles(&config);
        let standard = &profiles[STANDARD_PROFILE];
        assert_eq!(standard.headers["X-Tenant"], "acme");
        assert_eq!(standard.headers["Accept"], "application/json");
    }

    #[test]
    fn test_unknown_step_override_rejected() {
        let mut config = AppConfig::default();
        config
            .steps
            .insert("sumbit_name".to_string(), StepOverride::default());
        assert!(build_workflow(&config).unwrap_err().is_config());
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let mut config = AppConfig::default();
        config.steps.insert(
            "signup".to_string(),
            StepOverride {
                header_profile: Some("nope".to_string()),
                ..StepOverride::default()
            },
        );
        assert!(build_workflow(&config).unwrap_err().is_config());
    }

    #[test]
    fn test_first_step_cannot_acknowledge() {
        let mut config = AppConfig::default();
        config.steps.insert(
            "signup".to_string(),
            StepOverride {
                token_pointer: Some(String::new()),
                ..StepOverride::default()
            },
        );
        assert!(build_workflow(&config).unwrap_err().is_config());
    }
}
