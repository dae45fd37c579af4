// analyze_text prompt

use async_trait::async_trait;
use std::sync::Arc;
use waypost_core::{Arguments, Capability, CapabilityError, CapabilityHandler, ParamType, ParameterSpec};

pub struct AnalyzeTextPrompt;

impl AnalyzeTextPrompt {
    pub fn capability() -> Capability {
        Capability::prompt(
            "analyze_text",
            "Create a prompt to analyze text content.",
            Arc::new(AnalyzeTextPrompt),
        )
        .with_param(ParameterSpec::required("text", ParamType::String).with_description("Text to analyze"))
    }

    pub fn render(text: &str) -> String {
        format!(
            "Please analyze the following text and provide insights:\n\
             \n\
             {}\n\
             \n\
             In your analysis, consider:\n\
             - Main themes or topics\n\
             - Tone and sentiment\n\
             - Key insights or takeaways\n\
             - Any notable patterns or structures\n",
            text
        )
    }
}

#[async_trait]
impl CapabilityHandler for AnalyzeTextPrompt {
    async fn invoke(&self, arguments: Arguments) -> Result<String, CapabilityError> {
        let text = arguments
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CapabilityError::validation("text", "missing required argument"))?;
        Ok(Self::render(text))
    }
}
