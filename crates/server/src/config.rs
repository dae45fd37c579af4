use crate::api::sse::SessionStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use waypost_core::{Dispatcher, SandboxLimits, SchemaValidator, UnknownArgumentPolicy};
use waypost_mcp::capabilities::FetchConfig;
use waypost_mcp::protocol::ServerInfo;
use waypost_mcp::{build_registry, CapabilityConfig, McpServer, Profile};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub sandbox: SandboxLimits,
}

/// Overrides for the name and version reported by `initialize`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub unknown_arguments: UnknownArgumentPolicy,
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if !config_path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration file")
    }

    pub fn capability_config(&self) -> CapabilityConfig {
        CapabilityConfig {
            fetch: self.fetch.clone(),
            sandbox: self.sandbox,
        }
    }

    /// Server identity for a profile, with any configured overrides applied
    pub fn server_info(&self, profile: Profile) -> ServerInfo {
        let mut info = profile.server_info();
        if let Some(name) = &self.server.name {
            info.name = name.clone();
        }
        if let Some(version) = &self.server.version {
            info.version = version.clone();
        }
        info
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub mcp: Arc<McpServer>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: &ServerConfig, profile: Profile) -> Result<Self> {
        let registry = build_registry(profile, &config.capability_config())
            .context("Failed to build capability registry")?;

        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            SchemaValidator::new(config.validation.unknown_arguments),
        );

        Ok(Self {
            mcp: Arc::new(McpServer::new(config.server_info(profile), dispatcher)),
            sessions: SessionStore::default(),
        })
    }
}
