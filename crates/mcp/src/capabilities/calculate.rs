// calculate: arithmetic through the sandboxed evaluator

use async_trait::async_trait;
use std::sync::Arc;
use waypost_core::{
    Arguments, Capability, CapabilityError, CapabilityHandler, ParamType, ParameterSpec, Sandbox,
};

pub struct CalculateTool {
    sandbox: Sandbox,
}

impl CalculateTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn capability(sandbox: Sandbox) -> Capability {
        Capability::tool(
            "calculate",
            "Safely evaluate a mathematical expression.",
            Arc::new(Self::new(sandbox)),
        )
        .with_param(
            ParameterSpec::required("expression", ParamType::String)
                .with_description("A mathematical expression (e.g., \"2 + 3 * 4\")"),
        )
    }
}

#[async_trait]
impl CapabilityHandler for CalculateTool {
    async fn invoke(&self, arguments: Arguments) -> Result<String, CapabilityError> {
        let expression = arguments
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CapabilityError::validation("expression", "missing required argument"))?;

        match self.sandbox.evaluate(expression) {
            Ok(value) => Ok(value.to_string()),
            Err(e) if e.is_rejection() => Err(CapabilityError::SandboxRejected(e.to_string())),
            Err(e) => Err(CapabilityError::HandlerFailure(e.to_string())),
        }
    }
}
