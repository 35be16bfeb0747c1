//! JSON payload templates rendered with minijinja.

use minijinja::Environment;
use regflow_core::error::{RegflowError, Result};
use regflow_core::workflow::{PayloadBuilder, StepInput};
use serde_json::{Map, Value};

/// A JSON value whose string leaves are templates.
///
/// Every string (keys excluded) is rendered against the [`StepInput`]:
/// `{{ token }}`, `{{ email }}`, `{{ first_name }}`, `{{ code }}` and every
/// capture by name. Numbers, booleans and nulls pass through unchanged.
pub struct TemplatePayload {
    template: Value,
    env: Environment<'static>,
}

impl TemplatePayload {
    pub fn new(template: Value) -> Self {
        Self {
            template,
            env: Environment::new(),
        }
    }

    pub fn template(&self) -> &Value {
        &self.template
    }

    fn render(&self, value: &Value, input: &StepInput) -> Result<Value> {
        match value {
            Value::String(source) => self
                .env
                .render_str(source, input)
                .map(Value::String)
                .map_err(|e| {
                    RegflowError::config(format!(
                        "payload template for step '{}' failed: {e}",
                        input.step
                    ))
                }),
            Value::Array(items) => items
                .iter()
                .map(|item| self.render(item, input))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(fields) => {
                let mut rendered = Map::with_capacity(fields.len());
                for (key, field) in fields {
                    rendered.insert(key.clone(), self.render(field, input)?);
                }
                Ok(Value::Object(rendered))
            }
            other => Ok(other.clone()),
        }
    }
}

impl PayloadBuilder for TemplatePayload {
    fn build(&self, input: &StepInput) -> Result<Value> {
        self.render(&self.template, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn input() -> StepInput {
        let mut captures = BTreeMap::new();
        captures.insert("auth_code".to_string(), "AC-77".to_string());
        StepInput {
            step: "submit_name".into(),
            token: "tok-1".into(),
            email: "johnsmith1234@example.com".into(),
            display_name: "John Smith".into(),
            first_name: "John".into(),
            last_name: "Smith".into(),
            domain: "example.com".into(),
            code: "4821".into(),
            captures,
        }
    }

    #[test]
    fn test_renders_nested_string_leaves() {
        let payload = TemplatePayload::new(json!({
            "sessionToken": "{{ token }}",
            "step": "{{ step }}",
            "answers": {
                "name": "{{ first_name }} {{ last_name }}",
                "codes": ["{{ code }}", "{{ auth_code }}"],
                "optIn": false,
                "count": 3
            }
        }));

        let body = payload.build(&input()).unwrap();
        assert_eq!(
            body,
            json!({
                "sessionToken": "tok-1",
                "step": "submit_name",
                "answers": {
                    "name": "John Smith",
                    "codes": ["4821", "AC-77"],
                    "optIn": false,
                    "count": 3
                }
            })
        );
    }

    #[test]
    fn test_unknown_variable_renders_empty() {
        let payload = TemplatePayload::new(json!({ "x": "[{{ nothing_here }}]" }));
        assert_eq!(payload.build(&input()).unwrap(), json!({ "x": "[]" }));
    }

    #[test]
    fn test_syntax_error_is_config_error() {
        let payload = TemplatePayload::new(json!({ "x": "{{ token " }));
        assert!(payload.build(&input()).unwrap_err().is_config());
    }
}
