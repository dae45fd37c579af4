use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use waypost_mcp::Profile;

mod api;
mod config;

use config::{AppState, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "waypost")]
#[command(about = "MCP server exposing tools, resources and prompts over SSE", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "waypost.toml")]
    config: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Capability set to expose (demo or echo)
    #[arg(long, env = "WAYPOST_PROFILE", default_value = "demo")]
    profile: Profile,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypost=info,tower_http=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    tracing::info!("Starting Waypost MCP server (profile: {})", args.profile);

    // Load configuration
    let config = ServerConfig::load(&args.config)?;
    let state = AppState::new(&config, args.profile)?;

    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Starting HTTP server on {}", addr);

    api::serve(&addr, state).await?;

    Ok(())
}
