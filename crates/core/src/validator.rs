// Argument validation against a capability's declared parameters

use crate::error::CapabilityError;
use crate::types::{Arguments, ParameterSpec};
use serde::{Deserialize, Serialize};

/// What to do with arguments that are not in the declared schema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownArgumentPolicy {
    /// Log a warning and continue
    #[default]
    Warn,
    /// Fail validation
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator {
    unknown_arguments: UnknownArgumentPolicy,
}

impl SchemaValidator {
    pub fn new(unknown_arguments: UnknownArgumentPolicy) -> Self {
        Self { unknown_arguments }
    }

    /// Validate arguments, reporting the first violation.
    ///
    /// Parameters are checked in declaration order, then unknown argument names
    /// in sorted order, so a given input always yields the same error.
    pub fn validate(&self, parameters: &[ParameterSpec], arguments: &Arguments) -> Result<(), CapabilityError> {
        for param in parameters {
            match arguments.get(&param.name) {
                None if param.required => {
                    return Err(CapabilityError::validation(&param.name, "missing required argument"));
                }
                None => {}
                Some(value) if !param.param_type.matches(value) => {
                    return Err(CapabilityError::validation(
                        &param.name,
                        format!("expected {}, got {}", param.param_type, json_type_name(value)),
                    ));
                }
                Some(_) => {}
            }
        }

        let mut unknown: Vec<&String> = arguments
            .keys()
            .filter(|name| !parameters.iter().any(|p| &p.name == *name))
            .collect();
        unknown.sort();

        if let Some(first) = unknown.first() {
            match self.unknown_arguments {
                UnknownArgumentPolicy::Reject => {
                    return Err(CapabilityError::validation(first.as_str(), "unknown argument"));
                }
                UnknownArgumentPolicy::Warn => {
                    tracing::warn!("Ignoring unknown argument(s): {:?}", unknown);
                }
            }
        }

        Ok(())
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
