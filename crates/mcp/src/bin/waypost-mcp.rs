// Standalone MCP server binary (stdio transport)

use anyhow::Result;
use std::sync::Arc;
use waypost_core::{Dispatcher, SchemaValidator, UnknownArgumentPolicy};
use waypost_mcp::{build_registry, CapabilityConfig, McpServer, Profile};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypost=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let profile = match std::env::var("WAYPOST_PROFILE") {
        Ok(value) => value.parse::<Profile>().map_err(anyhow::Error::msg)?,
        Err(_) => Profile::default(),
    };

    tracing::info!("Waypost MCP server starting (profile: {})", profile);

    let registry = build_registry(profile, &CapabilityConfig::default())?;
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        SchemaValidator::new(UnknownArgumentPolicy::default()),
    );

    let server = Arc::new(McpServer::new(profile.server_info(), dispatcher));
    server.run_stdio().await?;

    Ok(())
}
