use crate::error::{CapabilityError, RegistryError};
use crate::registry::UriTemplate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Arguments passed to a capability, keyed by parameter name
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// The three kinds of capability a server can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityKind::Tool => write!(f, "tool"),
            CapabilityKind::Resource => write!(f, "resource"),
            CapabilityKind::Prompt => write!(f, "prompt"),
        }
    }
}

/// Runtime type a parameter must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Boolean,
}

impl ParamType {
    /// Check whether a JSON value has this type
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
        }
    }

    /// JSON Schema type name
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter of a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: String::new(),
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Handler invoked when a capability is dispatched.
///
/// Handlers receive validated arguments. For resources the values captured from
/// the URI template are merged into the arguments under their placeholder names.
#[async_trait::async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn invoke(&self, arguments: Arguments) -> Result<String, CapabilityError>;
}

/// A named, invocable unit of server functionality
#[derive(Clone)]
pub struct Capability {
    pub kind: CapabilityKind,
    pub name: String,
    pub description: String,
    /// Set for resources only; the registry key for a resource is its template
    pub uri_template: Option<UriTemplate>,
    pub mime_type: Option<String>,
    pub parameters: Vec<ParameterSpec>,
    pub handler: Arc<dyn CapabilityHandler>,
}

impl Capability {
    pub fn tool(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self::named(CapabilityKind::Tool, name, description, handler)
    }

    pub fn prompt(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self::named(CapabilityKind::Prompt, name, description, handler)
    }

    /// Create a resource addressed by a URI template such as `weather://{city}`.
    ///
    /// Every placeholder becomes a required string parameter.
    pub fn resource(
        template: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<Self, RegistryError> {
        let template = UriTemplate::parse(template)?;
        let parameters = template
            .placeholders()
            .iter()
            .map(|p| ParameterSpec::required(p.clone(), ParamType::String))
            .collect();

        Ok(Self {
            kind: CapabilityKind::Resource,
            name: name.into(),
            description: description.into(),
            uri_template: Some(template),
            mime_type: Some("text/plain".to_string()),
            parameters,
            handler,
        })
    }

    fn named(
        kind: CapabilityKind,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            uri_template: None,
            mime_type: None,
            parameters: Vec::new(),
            handler,
        }
    }

    /// Append a declared parameter
    pub fn with_param(mut self, param: ParameterSpec) -> Self {
        self.parameters.push(param);
        self
    }

    /// Key under which the registry stores this capability
    pub fn key(&self) -> &str {
        match &self.uri_template {
            Some(template) => template.as_str(),
            None => &self.name,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("uri_template", &self.uri_template.as_ref().map(|t| t.as_str()))
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// A single inbound invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub kind: CapabilityKind,
    /// Capability name, or the concrete URI for resources
    pub target: String,
    #[serde(default)]
    pub arguments: Arguments,
}

impl InvocationRequest {
    pub fn tool(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            kind: CapabilityKind::Tool,
            target: name.into(),
            arguments,
        }
    }

    pub fn resource(uri: impl Into<String>) -> Self {
        Self {
            kind: CapabilityKind::Resource,
            target: uri.into(),
            arguments: Arguments::new(),
        }
    }

    pub fn prompt(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            kind: CapabilityKind::Prompt,
            target: name.into(),
            arguments,
        }
    }
}

/// Category of a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    SandboxRejected,
    HandlerFailure,
}

/// Outcome of a dispatched invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationResult {
    Ok { payload: String },
    Error { kind: ErrorKind, message: String },
}

impl InvocationResult {
    pub fn ok(payload: impl Into<String>) -> Self {
        Self::Ok {
            payload: payload.into(),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Payload on success, message on failure
    pub fn text(&self) -> &str {
        match self {
            Self::Ok { payload } => payload,
            Self::Error { message, .. } => message,
        }
    }
}
