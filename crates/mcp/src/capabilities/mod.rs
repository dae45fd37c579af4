// Built-in capabilities and the deployment profiles that register them

pub mod analyze;
pub mod calculate;
pub mod echo;
pub mod schema;
pub mod weather;
pub mod web;

pub use analyze::AnalyzeTextPrompt;
pub use calculate::CalculateTool;
pub use echo::EchoTool;
pub use schema::{input_schema, json_schema_object, json_schema_property};
pub use weather::WeatherResource;
pub use web::{FetchConfig, FetchWebpageTool};

use crate::protocol::ServerInfo;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use waypost_core::{CapabilityRegistry, Sandbox, SandboxLimits};

/// Which capability set a server exposes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// echo, calculate, fetch_webpage, weather://{city}, analyze_text
    #[default]
    Demo,
    /// Only the echo tool
    Echo,
}

impl Profile {
    pub fn server_info(&self) -> ServerInfo {
        match self {
            Profile::Demo => ServerInfo::new("Remote Demo Server", env!("CARGO_PKG_VERSION")),
            Profile::Echo => ServerInfo::new("echo-server", "0.0.1"),
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "demo" => Ok(Profile::Demo),
            "echo" => Ok(Profile::Echo),
            other => Err(format!("unknown profile '{}' (expected 'demo' or 'echo')", other)),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Profile::Demo => write!(f, "demo"),
            Profile::Echo => write!(f, "echo"),
        }
    }
}

/// Settings consumed by the built-in capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub sandbox: SandboxLimits,
}

/// Register every capability of a profile
pub fn build_registry(profile: Profile, config: &CapabilityConfig) -> Result<CapabilityRegistry> {
    let registry = CapabilityRegistry::new();
    registry.register(EchoTool::capability())?;

    if profile == Profile::Demo {
        registry.register(CalculateTool::capability(Sandbox::new(config.sandbox)))?;
        registry.register(FetchWebpageTool::capability(&config.fetch)?)?;
        registry.register(WeatherResource::capability().context("Invalid weather resource template")?)?;
        registry.register(AnalyzeTextPrompt::capability())?;
    }

    tracing::info!("Registered {} capabilities for profile '{}'", registry.len(), profile);
    Ok(registry)
}
