// echo: return the input text unchanged

use async_trait::async_trait;
use std::sync::Arc;
use waypost_core::{Arguments, Capability, CapabilityError, CapabilityHandler, ParamType, ParameterSpec};

pub struct EchoTool;

impl EchoTool {
    pub fn capability() -> Capability {
        Capability::tool("echo", "Return whatever text you pass in.", Arc::new(EchoTool))
            .with_param(ParameterSpec::required("text", ParamType::String).with_description("Text to echo back"))
    }
}

#[async_trait]
impl CapabilityHandler for EchoTool {
    async fn invoke(&self, arguments: Arguments) -> Result<String, CapabilityError> {
        let text = arguments
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CapabilityError::validation("text", "missing required argument"))?;
        Ok(text.to_string())
    }
}
